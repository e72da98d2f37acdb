//! Auto Typer - terminal front-end
//!
//! Types text into whichever window has focus once the countdown ends.
//! While the terminal keeps focus, the pause and stop keys from the config
//! control the session; `q` and Ctrl+C always stop it.

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use clap::Parser;
use crossterm::{
    cursor::MoveToColumn,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    style::Print,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use auto_typer::{
    config::{Config, HotkeyConfig, TypingSettings},
    delay::JitterConfig,
    emitter::{self, EmitMethod, InputEmitter, WriterEmitter},
    engine::POLL_INTERVAL,
    profile::ProfileManager,
    queue::Granularity,
    EngineState, TypingEngine,
};

#[derive(Debug, Parser)]
#[command(name = "auto-typer", version, about = "Types text into the focused window at a human-like pace")]
struct Cli {
    /// Text to type
    #[arg(short, long, conflicts_with = "file")]
    text: Option<String>,
    /// Read the text from a file
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Typing speed in words per minute
    #[arg(short, long)]
    wpm: Option<u32>,
    /// Random extra delay per keystroke, as MIN,MAX milliseconds
    #[arg(long, value_parser = parse_jitter)]
    jitter: Option<JitterConfig>,
    /// Seconds to wait before typing the text again (0 = once)
    #[arg(long)]
    interval: Option<f64>,
    /// Local time to start typing (HH:MM or HH:MM:SS)
    #[arg(long, value_parser = parse_time)]
    at: Option<NaiveTime>,
    /// Emit this many characters per keystroke call
    #[arg(long)]
    chunk: Option<usize>,
    /// Type at a flat rate, ignoring punctuation and letter pairs
    #[arg(long)]
    no_context: bool,
    /// Countdown seconds before the first keystroke
    #[arg(long)]
    countdown: Option<u32>,
    /// Load settings (and text, if none given) from a saved profile
    #[arg(short, long)]
    profile: Option<String>,
    /// Paste through the clipboard instead of synthesising keys
    #[arg(long)]
    clipboard: bool,
    /// Print the text to stdout instead of typing it
    #[arg(long)]
    dry_run: bool,
    /// Save the effective settings and text as a profile
    #[arg(long)]
    save_profile: Option<String>,
    /// List saved profiles and exit
    #[arg(long)]
    list_profiles: bool,
}

fn parse_jitter(s: &str) -> Result<JitterConfig, String> {
    let (min, max) = s
        .split_once(',')
        .ok_or_else(|| "expected MIN,MAX".to_string())?;
    let min: f64 = min.trim().parse().map_err(|e| format!("bad minimum: {}", e))?;
    let max: f64 = max.trim().parse().map_err(|e| format!("bad maximum: {}", e))?;
    Ok(JitterConfig::new(true, min, max))
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| format!("expected HH:MM[:SS]: {}", e))
}

impl Cli {
    fn apply(&self, settings: &mut TypingSettings) {
        if let Some(wpm) = self.wpm {
            settings.wpm = wpm;
        }
        if let Some(jitter) = self.jitter {
            settings.random_delay = jitter;
        }
        if let Some(interval) = self.interval {
            settings.interval_secs = interval;
        }
        if self.at.is_some() {
            settings.scheduled_start = self.at;
        }
        if let Some(chunk) = self.chunk {
            settings.chunk_size = chunk;
        }
        if self.no_context {
            settings.context_rules = false;
        }
        if let Some(countdown) = self.countdown {
            settings.countdown_secs = countdown;
        }
        if self.clipboard {
            settings.method = EmitMethod::Clipboard;
        }
    }
}

/// Latest status and progress, redrawn on one stderr line
#[derive(Default)]
struct StatusLine {
    status: String,
    progress: (usize, usize),
}

impl StatusLine {
    fn render(&self) {
        let (done, total) = self.progress;
        let pct = if total > 0 { done * 100 / total } else { 0 };
        let line = format!("[{:>3}%] {}/{} {}", pct, done, total, self.status);
        let _ = execute!(
            io::stderr(),
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(line)
        );
    }
}

fn key_matches(binding: &str, code: KeyCode) -> bool {
    let binding = binding.trim().to_lowercase();
    match code {
        KeyCode::Char(' ') => binding == "space",
        KeyCode::Char(c) => binding.chars().eq(c.to_lowercase()),
        KeyCode::Esc => binding == "esc" || binding == "escape",
        KeyCode::Enter => binding == "enter",
        KeyCode::Tab => binding == "tab",
        KeyCode::F(n) => binding == format!("f{}", n),
        _ => false,
    }
}

fn read_text(cli: &Cli, profile_text: Option<String>) -> Result<String> {
    if let Some(text) = &cli.text {
        return Ok(text.clone());
    }
    if let Some(path) = &cli.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    if let Some(text) = profile_text {
        return Ok(text);
    }
    if !io::stdin().is_terminal() {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read text from stdin")?;
        return Ok(text);
    }
    Ok(String::new())
}

fn build_emitter(cli: &Cli, method: EmitMethod) -> Result<Box<dyn InputEmitter>> {
    if cli.dry_run {
        return Ok(Box::new(WriterEmitter::new(io::stdout())));
    }
    emitter::system_emitter(method).context("Failed to set up keystroke input")
}

/// Forward pause/stop keys to the engine until the session ends.
fn watch_keys(engine: &TypingEngine, hotkeys: &HotkeyConfig) -> Result<()> {
    while engine.is_active() {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let ctrl_c =
            key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
        let quit = key.code == KeyCode::Char('q') || key.code == KeyCode::Char('Q');
        if ctrl_c || quit || key_matches(&hotkeys.emergency_stop, key.code) {
            engine.stop();
        } else if key_matches(&hotkeys.pause, key.code) {
            engine.toggle_pause();
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Could not load config, using defaults: {}", e);
        Config::default()
    });
    let mut settings = config.typing.clone();

    let mut profiles = ProfileManager::open_default().context("Failed to open profiles")?;
    if cli.list_profiles {
        for name in profiles.list_profiles()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut profile_text = None;
    if let Some(name) = &cli.profile {
        let profile = profiles
            .load_profile(name)?
            .with_context(|| format!("No profile named '{}'", name))?;
        settings = profile.settings;
        profile_text = profile.texts.into_iter().next();
    }
    cli.apply(&mut settings);

    let text = read_text(&cli, profile_text)?;
    if text.is_empty() {
        bail!("No text to type!");
    }

    if let Some(name) = &cli.save_profile {
        let mut profile = profiles
            .load_profile(name)?
            .unwrap_or_else(|| profiles.create_new_profile(name));
        profile.settings = settings.clone();
        if !profile.texts.contains(&text) {
            profile.texts.push(text.clone());
        }
        profiles.save_profile(name, profile)?;
        log::info!("Saved profile '{}'", name);
    }

    let session = settings.session(text);
    let granularity = match session.granularity {
        Granularity::Character => "per character".to_string(),
        Granularity::Chunked(n) => format!("{} characters per emission", n),
    };
    log::info!("{} wpm, {}", session.speed, granularity);

    let mut engine = TypingEngine::with_boxed_emitter(build_emitter(&cli, settings.method)?);
    engine.configure(session);

    let line = Arc::new(Mutex::new(StatusLine::default()));
    let status_line = Arc::clone(&line);
    engine.set_status_observer(Some(move |status: &str| {
        let mut line = status_line.lock().unwrap_or_else(PoisonError::into_inner);
        line.status = status.to_string();
        line.render();
    }));
    let progress_line = Arc::clone(&line);
    engine.set_progress_observer(Some(move |done: usize, total: usize| {
        let mut line = progress_line.lock().unwrap_or_else(PoisonError::into_inner);
        line.progress = (done, total);
        line.render();
    }));

    let handle = engine.handle();
    ctrlc::set_handler(move || handle.stop()).context("Failed to install Ctrl+C handler")?;

    engine.start();

    // Without a terminal only Ctrl+C can stop the session
    if io::stdin().is_terminal() {
        enable_raw_mode()?;
        let watched = watch_keys(&engine, &config.hotkeys);
        disable_raw_mode()?;
        watched?;
    }

    let state = engine.wait();
    eprintln!();
    if state == EngineState::Failed {
        bail!("Typing failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_argument_parses() {
        let j = parse_jitter("50, 150").unwrap();
        assert!(j.enabled);
        assert_eq!(j.min_ms, 50.0);
        assert_eq!(j.max_ms, 150.0);
        assert!(parse_jitter("50").is_err());
        assert!(parse_jitter("a,b").is_err());
    }

    #[test]
    fn time_argument_parses_with_and_without_seconds() {
        assert_eq!(parse_time("09:30"), Ok(NaiveTime::from_hms_opt(9, 30, 0).unwrap()));
        assert_eq!(parse_time("23:59:30"), Ok(NaiveTime::from_hms_opt(23, 59, 30).unwrap()));
        assert!(parse_time("25:00").is_err());
    }

    #[test]
    fn hotkey_bindings_match() {
        assert!(key_matches("space", KeyCode::Char(' ')));
        assert!(key_matches("esc", KeyCode::Esc));
        assert!(key_matches("F6", KeyCode::F(6)));
        assert!(key_matches("q", KeyCode::Char('Q')));
        assert!(!key_matches("q", KeyCode::Char('w')));
    }
}
