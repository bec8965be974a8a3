//! Clipboard side effect.
//!
//! When the flow reaches [`Phase::Signed`](crate::Phase::Signed) the
//! signature is copied to the clipboard once, and only if the context has
//! input focus. A failed copy is logged at warn level and never touches the
//! verification phase; the manual copy action stays available regardless.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::ClipboardError;

/// A write-only system clipboard.
#[async_trait]
pub trait Clipboard: Send + Sync {
    /// Whether the context currently has user-input focus.
    fn has_focus(&self) -> bool;

    /// Replace the clipboard contents with `text`.
    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Outcome of the automatic copy attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum CopyOutcome {
    /// The signature is on the clipboard.
    Copied,
    /// Automatic copy is turned off.
    Disabled,
    /// The context had no input focus, nothing was attempted.
    NoFocus,
    /// The write failed.
    Failed(String),
}

impl CopyOutcome {
    /// Whether the user has to copy the signature by hand.
    #[must_use]
    pub const fn needs_manual_copy(&self) -> bool {
        !matches!(self, Self::Copied)
    }
}

/// Performs the clipboard writes for the verification flow.
#[derive(Clone)]
pub struct ClipboardController {
    clipboard: Arc<dyn Clipboard>,
    auto_copy: bool,
}

impl std::fmt::Debug for ClipboardController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardController")
            .field("auto_copy", &self.auto_copy)
            .finish_non_exhaustive()
    }
}

impl ClipboardController {
    /// Create a controller over `clipboard`.
    #[must_use]
    pub fn new(clipboard: Arc<dyn Clipboard>, auto_copy: bool) -> Self {
        Self {
            clipboard,
            auto_copy,
        }
    }

    /// Automatic copy on entering the signed phase. Exactly one attempt.
    pub async fn on_signed(&self, signature: &str) -> CopyOutcome {
        if !self.auto_copy {
            return CopyOutcome::Disabled;
        }
        if !self.clipboard.has_focus() {
            debug!("skipping automatic copy: no input focus");
            return CopyOutcome::NoFocus;
        }
        match self.clipboard.write_text(signature).await {
            Ok(()) => {
                debug!("signature copied to clipboard");
                CopyOutcome::Copied
            }
            Err(err) => {
                warn!(error = %err, "clipboard copy failed");
                CopyOutcome::Failed(err.to_string())
            }
        }
    }

    /// Manual copy requested by the user. The request itself is the user
    /// gesture, so focus is not checked.
    pub async fn copy(&self, signature: &str) -> Result<(), ClipboardError> {
        if signature.is_empty() {
            return Err(ClipboardError::Empty);
        }
        self.clipboard.write_text(signature).await.inspect_err(|err| {
            warn!(error = %err, "manual clipboard copy failed");
        })
    }
}

/// Clipboard kept in memory. Useful for tests and headless front ends.
#[derive(Debug)]
pub struct MemoryClipboard {
    contents: RwLock<Option<String>>,
    focused: AtomicBool,
    writes: AtomicUsize,
    failure: Option<ClipboardError>,
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClipboard {
    /// An empty, focused clipboard.
    #[must_use]
    pub fn new() -> Self {
        Self {
            contents: RwLock::new(None),
            focused: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
            failure: None,
        }
    }

    /// A clipboard whose writes always fail with `error`.
    #[must_use]
    pub fn failing(error: ClipboardError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    /// Set whether the context has focus.
    pub fn set_focus(&self, focused: bool) {
        self.focused.store(focused, Ordering::Release);
    }

    /// Current contents.
    pub async fn contents(&self) -> Option<String> {
        self.contents.read().await.clone()
    }

    /// Number of write attempts so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    fn has_focus(&self) -> bool {
        self.focused.load(Ordering::Acquire)
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.writes.fetch_add(1, Ordering::AcqRel);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        *self.contents.write().await = Some(text.to_owned());
        Ok(())
    }
}

/// A context without clipboard access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClipboard;

#[async_trait]
impl Clipboard for NoClipboard {
    fn has_focus(&self) -> bool {
        false
    }

    async fn write_text(&self, _text: &str) -> Result<(), ClipboardError> {
        Err(ClipboardError::unavailable("no clipboard in this context"))
    }
}
