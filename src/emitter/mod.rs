//! Input emission capability
//!
//! The engine never touches the OS directly. It hands each emission unit to
//! an [`InputEmitter`], which performs the keystroke or paste. OS-backed
//! emitters live in [`native`] behind the `virtual-send` feature.

#[cfg(feature = "virtual-send")]
pub mod native;

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[cfg(feature = "virtual-send")]
pub use native::{ClipboardEmitter, EnigoEmitter};

/// Failure while emitting input
#[derive(Debug, Error)]
pub enum EmitError {
    /// The backend could not be initialised
    #[error("failed to initialise input backend: {0}")]
    Init(String),
    /// A key press or text injection was rejected
    #[error("keystroke failed: {0}")]
    Keystroke(String),
    /// Reading or writing the clipboard failed
    #[error("clipboard error: {0}")]
    Clipboard(String),
    /// The output sink went away
    #[error("output closed: {0}")]
    Closed(#[from] std::io::Error),
}

/// Something that can type text into the focused application.
pub trait InputEmitter: Send {
    /// Emit one unit of text.
    fn emit(&mut self, unit: &str) -> Result<(), EmitError>;

    /// Called once before the first emission of a session.
    ///
    /// Emitters that mutate process-wide state (the clipboard) capture its
    /// current value here.
    fn begin_session(&mut self) -> Result<(), EmitError> {
        Ok(())
    }

    /// Called exactly once when a session ends, however it ended.
    fn end_session(&mut self) {}
}

impl<T: InputEmitter + ?Sized> InputEmitter for Box<T> {
    fn emit(&mut self, unit: &str) -> Result<(), EmitError> {
        (**self).emit(unit)
    }

    fn begin_session(&mut self) -> Result<(), EmitError> {
        (**self).begin_session()
    }

    fn end_session(&mut self) {
        (**self).end_session()
    }
}

/// How text reaches the target application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmitMethod {
    /// Synthesised key events for each character
    #[default]
    Direct,
    /// Put the unit on the clipboard and send the paste shortcut
    Clipboard,
}

impl EmitMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Clipboard => "clipboard",
        }
    }
}

/// Emitter that records every unit in memory.
///
/// Clones share the same log, so a test can keep one handle and give the
/// other to the engine.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmitter {
    log: Arc<Mutex<Vec<String>>>,
    fail_after: Option<usize>,
    sessions: Arc<Mutex<SessionLog>>,
}

/// Count of session hooks seen by a [`RecordingEmitter`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionLog {
    pub begun: usize,
    pub ended: usize,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every emission after `count` successful ones.
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::default()
        }
    }

    /// Units emitted so far, in order
    pub fn units(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Emitted units joined back into text
    pub fn text(&self) -> String {
        self.units().concat()
    }

    pub fn count(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn sessions(&self) -> SessionLog {
        *self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InputEmitter for RecordingEmitter {
    fn emit(&mut self, unit: &str) -> Result<(), EmitError> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if self.fail_after.is_some_and(|limit| log.len() >= limit) {
            return Err(EmitError::Keystroke(format!("rejected {unit:?}")));
        }
        log.push(unit.to_string());
        Ok(())
    }

    fn begin_session(&mut self) -> Result<(), EmitError> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).begun += 1;
        Ok(())
    }

    fn end_session(&mut self) {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).ended += 1;
    }
}

/// Emitter that writes units to any output stream (dry runs)
pub struct WriterEmitter<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> WriterEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> InputEmitter for WriterEmitter<W> {
    fn emit(&mut self, unit: &str) -> Result<(), EmitError> {
        self.out.write_all(unit.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    fn end_session(&mut self) {
        if let Err(e) = self.out.flush() {
            log::warn!("Failed to flush dry-run output: {}", e);
        }
    }
}

/// Build the OS-backed emitter for `method`.
#[cfg(feature = "virtual-send")]
pub fn system_emitter(method: EmitMethod) -> Result<Box<dyn InputEmitter>, EmitError> {
    Ok(match method {
        EmitMethod::Direct => Box::new(EnigoEmitter::new()?),
        EmitMethod::Clipboard => Box::new(ClipboardEmitter::new()?),
    })
}

/// Stub when the crate is built without `virtual-send`
#[cfg(not(feature = "virtual-send"))]
pub fn system_emitter(method: EmitMethod) -> Result<Box<dyn InputEmitter>, EmitError> {
    Err(EmitError::Init(format!(
        "{} input not available - build with --features virtual-send",
        method.as_str()
    )))
}

/// Whether OS-backed emission was compiled in
pub fn is_available() -> bool {
    cfg!(feature = "virtual-send")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_emitter_shares_log_between_clones() {
        let handle = RecordingEmitter::new();
        let mut emitter = handle.clone();
        emitter.emit("a").unwrap();
        emitter.emit("b").unwrap();
        assert_eq!(handle.units(), vec!["a", "b"]);
        assert_eq!(handle.text(), "ab");
    }

    #[test]
    fn recording_emitter_fails_after_limit() {
        let mut emitter = RecordingEmitter::failing_after(2);
        assert!(emitter.emit("x").is_ok());
        assert!(emitter.emit("y").is_ok());
        let err = emitter.emit("z").unwrap_err();
        assert!(matches!(err, EmitError::Keystroke(_)));
        assert_eq!(emitter.count(), 2);
    }

    #[test]
    fn recording_emitter_counts_session_hooks() {
        let handle = RecordingEmitter::new();
        let mut boxed: Box<dyn InputEmitter> = Box::new(handle.clone());
        boxed.begin_session().unwrap();
        boxed.end_session();
        assert_eq!(handle.sessions(), SessionLog { begun: 1, ended: 1 });
    }

    #[test]
    fn writer_emitter_writes_units_verbatim() {
        let mut emitter = WriterEmitter::new(Vec::new());
        emitter.emit("héllo").unwrap();
        emitter.emit(" ").unwrap();
        emitter.emit("wörld").unwrap();
        assert_eq!(String::from_utf8(emitter.into_inner()).unwrap(), "héllo wörld");
    }

    #[test]
    fn emit_error_display() {
        let err = EmitError::Clipboard("busy".to_string());
        assert_eq!(err.to_string(), "clipboard error: busy");
    }

    #[cfg(not(feature = "virtual-send"))]
    #[test]
    fn system_emitter_unavailable_without_feature() {
        assert!(!is_available());
        let err = system_emitter(EmitMethod::Direct).err().unwrap();
        assert!(err.to_string().contains("virtual-send"));
    }
}
