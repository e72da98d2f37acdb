//! Auto Typer - types a block of text into the focused window
//!
//! The core is the typing engine: it turns a words-per-minute target into a
//! per-keystroke delay schedule, drives a cancellable background typing loop
//! with pause and resume, and reports status and progress to observers.
//! Actual keystroke injection is an [`emitter::InputEmitter`] supplied by the
//! caller.

pub mod config;
pub mod delay;
pub mod emitter;
pub mod engine;
pub mod profile;
pub mod queue;

pub use config::{Config, SessionConfig};
pub use engine::{EngineHandle, EngineState, TypingEngine};
