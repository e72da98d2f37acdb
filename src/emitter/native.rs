//! OS-backed emitters using enigo and arboard
//!
//! Requires the `virtual-send` feature and the platform libraries enigo
//! links against (libxdo on Linux, etc.)

use super::{EmitError, InputEmitter};
use arboard::Clipboard;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::thread;
use std::time::Duration;

/// Settle time between putting text on the clipboard and pasting it
const CLIPBOARD_SETTLE: Duration = Duration::from_millis(20);
/// Hold time for the paste shortcut modifier
const MODIFIER_HOLD: Duration = Duration::from_millis(10);

fn connect() -> Result<Enigo, EmitError> {
    Enigo::new(&Settings::default()).map_err(|e| EmitError::Init(e.to_string()))
}

/// Platform paste modifier (Cmd on macOS, Ctrl elsewhere)
fn paste_modifier() -> Key {
    #[cfg(target_os = "macos")]
    {
        Key::Meta
    }
    #[cfg(not(target_os = "macos"))]
    {
        Key::Control
    }
}

/// Types each unit with synthesised key events
#[derive(Debug, Default)]
pub struct EnigoEmitter;

impl EnigoEmitter {
    /// Checks that an input connection can be opened.
    pub fn new() -> Result<Self, EmitError> {
        connect()?;
        Ok(Self)
    }
}

impl InputEmitter for EnigoEmitter {
    fn emit(&mut self, unit: &str) -> Result<(), EmitError> {
        let mut enigo = connect()?;
        if unit == " " {
            return enigo
                .key(Key::Space, Direction::Click)
                .map_err(|e| EmitError::Keystroke(e.to_string()));
        }
        enigo
            .text(unit)
            .map_err(|e| EmitError::Keystroke(e.to_string()))
    }
}

/// Pastes each unit through the clipboard.
///
/// Works for scripts the keyboard layout cannot produce directly. The
/// clipboard text present when the session begins is put back when it ends.
#[derive(Default)]
pub struct ClipboardEmitter {
    clipboard: Option<Clipboard>,
    saved: Option<String>,
}

impl ClipboardEmitter {
    pub fn new() -> Result<Self, EmitError> {
        let clipboard = Clipboard::new().map_err(|e| EmitError::Clipboard(e.to_string()))?;
        Ok(Self {
            clipboard: Some(clipboard),
            saved: None,
        })
    }

    fn clipboard(&mut self) -> Result<&mut Clipboard, EmitError> {
        if self.clipboard.is_none() {
            let clipboard = Clipboard::new().map_err(|e| EmitError::Clipboard(e.to_string()))?;
            self.clipboard = Some(clipboard);
        }
        self.clipboard
            .as_mut()
            .ok_or_else(|| EmitError::Clipboard("clipboard unavailable".to_string()))
    }

    fn paste(&mut self) -> Result<(), EmitError> {
        let mut enigo = connect()?;
        let modifier = paste_modifier();
        let keystroke = |e: enigo::InputError| EmitError::Keystroke(e.to_string());

        enigo.key(modifier, Direction::Press).map_err(keystroke)?;
        thread::sleep(MODIFIER_HOLD);
        let clicked = enigo.key(Key::Unicode('v'), Direction::Click);
        // Always release the modifier, even if the click failed
        let released = enigo.key(modifier, Direction::Release);
        clicked.map_err(keystroke)?;
        released.map_err(keystroke)
    }
}

impl InputEmitter for ClipboardEmitter {
    fn emit(&mut self, unit: &str) -> Result<(), EmitError> {
        if unit == " " {
            return connect()?
                .key(Key::Space, Direction::Click)
                .map_err(|e| EmitError::Keystroke(e.to_string()));
        }
        self.clipboard()?
            .set_text(unit)
            .map_err(|e| EmitError::Clipboard(e.to_string()))?;
        thread::sleep(CLIPBOARD_SETTLE);
        self.paste()
    }

    fn begin_session(&mut self) -> Result<(), EmitError> {
        // Non-text contents (images, files) are left in place, not saved
        self.saved = self.clipboard()?.get_text().ok();
        if self.saved.is_none() {
            log::debug!("Clipboard holds no text, it will not be restored");
        }
        Ok(())
    }

    fn end_session(&mut self) {
        let Some(saved) = self.saved.take() else {
            return;
        };
        match self.clipboard() {
            Ok(clipboard) => {
                if let Err(e) = clipboard.set_text(saved) {
                    log::warn!("Failed to restore clipboard: {}", e);
                }
            }
            Err(e) => log::warn!("Failed to restore clipboard: {}", e),
        }
    }
}
