//! Named typing profiles
//!
//! A profile bundles typing settings with a list of saved texts. Each one is
//! a pretty-printed JSON file in the profiles directory, named after the
//! profile with unsafe filename characters removed.

use crate::config::{app_dir, ConfigError, TypingSettings};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for profile operations
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Failed to determine config directory
    #[error("Could not determine profiles directory")]
    NoConfigDir,
    /// IO error reading, writing or listing profiles
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Profile file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for ProfileError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Io(e) => ProfileError::Io(e),
            _ => ProfileError::NoConfigDir,
        }
    }
}

/// A saved profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub name: String,
    pub created: DateTime<Local>,
    pub last_modified: DateTime<Local>,
    #[serde(default)]
    pub settings: TypingSettings,
    #[serde(default)]
    pub texts: Vec<String>,
}

/// Keep alphanumerics and `._- `, drop everything else.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|&c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect()
}

/// Loads, saves and lists profiles in one directory
#[derive(Debug)]
pub struct ProfileManager {
    dir: PathBuf,
    current: Option<Profile>,
    current_name: Option<String>,
}

impl ProfileManager {
    /// Manager over the default profiles directory, created if missing.
    pub fn open_default() -> Result<Self, ProfileError> {
        Self::open(app_dir()?.join("profiles"))
    }

    /// Manager over `dir`, created if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            current: None,
            current_name: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_name(name)))
    }

    /// Fresh profile with default settings and no texts
    pub fn create_new_profile(&self, name: &str) -> Profile {
        let now = Local::now();
        Profile {
            name: name.to_string(),
            created: now,
            last_modified: now,
            settings: TypingSettings::default(),
            texts: Vec::new(),
        }
    }

    /// Write `profile` under `name` and make it current.
    pub fn save_profile(&mut self, name: &str, mut profile: Profile) -> Result<(), ProfileError> {
        profile.name = name.to_string();
        profile.last_modified = Local::now();

        let path = self.path_for(name);
        let json = serde_json::to_string_pretty(&profile)?;
        fs::write(&path, json)?;
        log::debug!("Saved profile '{}' to {}", name, path.display());

        self.current = Some(profile);
        self.current_name = Some(name.to_string());
        Ok(())
    }

    /// Read a profile. `Ok(None)` if no such profile exists.
    pub fn load_profile(&mut self, name: &str) -> Result<Option<Profile>, ProfileError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        let profile: Profile = serde_json::from_str(&contents)?;

        self.current = Some(profile.clone());
        self.current_name = Some(name.to_string());
        Ok(Some(profile))
    }

    /// Remove a profile. Returns `false` if it did not exist.
    pub fn delete_profile(&mut self, name: &str) -> Result<bool, ProfileError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path)?;
        if self.current_name.as_deref() == Some(name) {
            self.current = None;
            self.current_name = None;
        }
        Ok(true)
    }

    /// Names of all saved profiles, sorted
    pub fn list_profiles(&self) -> Result<Vec<String>, ProfileError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn current_profile(&self) -> Option<&Profile> {
        self.current.as_ref()
    }

    pub fn current_profile_name(&self) -> Option<&str> {
        self.current_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ProfileManager) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let manager = ProfileManager::open(dir.path().join("profiles")).unwrap();
        (dir, manager)
    }

    #[test]
    fn sanitize_strips_path_characters() {
        assert_eq!(sanitize_name("../etc/passwd"), "..etcpasswd");
        assert_eq!(sanitize_name("My Profile_1.v2"), "My Profile_1.v2");
        assert_eq!(sanitize_name("a*b?c:d"), "abcd");
    }

    #[test]
    fn new_profile_has_defaults() {
        let (_dir, manager) = manager();
        let profile = manager.create_new_profile("essay");
        assert_eq!(profile.name, "essay");
        assert_eq!(profile.settings, TypingSettings::default());
        assert!(profile.texts.is_empty());
        assert_eq!(profile.created, profile.last_modified);
    }

    #[test]
    fn save_then_load() {
        let (_dir, mut manager) = manager();
        let mut profile = manager.create_new_profile("work");
        profile.settings.wpm = 85;
        profile.texts.push("สวัสดี".to_string());

        manager.save_profile("work", profile).unwrap();
        assert_eq!(manager.current_profile_name(), Some("work"));

        let loaded = manager.load_profile("work").unwrap().expect("profile exists");
        assert_eq!(loaded.settings.wpm, 85);
        assert_eq!(loaded.texts, vec!["สวัสดี".to_string()]);
        assert!(loaded.last_modified >= loaded.created);
    }

    #[test]
    fn load_missing_is_none() {
        let (_dir, mut manager) = manager();
        assert!(manager.load_profile("ghost").unwrap().is_none());
        assert!(manager.current_profile().is_none());
    }

    #[test]
    fn load_corrupt_is_error() {
        let (_dir, mut manager) = manager();
        fs::write(manager.dir().join("broken.json"), "{not json").unwrap();
        let err = manager.load_profile("broken").unwrap_err();
        assert!(matches!(err, ProfileError::Json(_)));
    }

    #[test]
    fn list_is_sorted_and_json_only() {
        let (_dir, mut manager) = manager();
        for name in ["zeta", "alpha", "mid"] {
            let profile = manager.create_new_profile(name);
            manager.save_profile(name, profile).unwrap();
        }
        fs::write(manager.dir().join("notes.txt"), "ignored").unwrap();
        assert_eq!(manager.list_profiles().unwrap(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn delete_clears_current() {
        let (_dir, mut manager) = manager();
        let profile = manager.create_new_profile("temp");
        manager.save_profile("temp", profile).unwrap();

        assert!(manager.delete_profile("temp").unwrap());
        assert!(manager.current_profile().is_none());
        assert!(!manager.delete_profile("temp").unwrap());
        assert!(manager.list_profiles().unwrap().is_empty());
    }
}
