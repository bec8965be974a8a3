//! Terminal clipboard over OSC 52.
//!
//! Most terminal emulators (and tmux with `set-clipboard on`) put the payload
//! of an OSC 52 escape sequence on the system clipboard. There is no way to
//! learn whether the terminal honored it.

use std::io::{self, IsTerminal, Write};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bside_verify::{Clipboard, ClipboardError};

/// Writes to the clipboard of the attached terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Osc52Clipboard;

impl Osc52Clipboard {
    /// The escape sequence that sets the clipboard to `text`.
    #[must_use]
    pub fn sequence(text: &str) -> String {
        format!("\x1b]52;c;{}\x07", STANDARD.encode(text))
    }
}

#[async_trait]
impl Clipboard for Osc52Clipboard {
    /// A terminal on stdout is the closest thing to input focus here.
    fn has_focus(&self) -> bool {
        io::stdout().is_terminal()
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut stdout = io::stdout().lock();
        if !stdout.is_terminal() {
            return Err(ClipboardError::unavailable("stdout is not a terminal"));
        }
        stdout
            .write_all(Self::sequence(text).as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|e| ClipboardError::unavailable(e.to_string()))
    }
}
