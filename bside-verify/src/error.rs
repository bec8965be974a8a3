//! Unified error types for bside-verify.
//!
//! Every module reports failures through its own error enum; all of them
//! convert into the top-level [`Error`] so callers outside the verification
//! flow can use a single `Result` type.

// ============================================================================
// Main Error Type
// ============================================================================

/// Result type alias for bside-verify operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for bside-verify.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Wallet provider or session error.
    #[error("wallet: {0}")]
    Wallet(#[from] WalletError),

    /// Clipboard error.
    #[error("clipboard: {0}")]
    Clipboard(#[from] ClipboardError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Wallet Errors
// ============================================================================

/// Failures reported by the wallet provider or the session adapter.
///
/// None of these are fatal to the process: the user can always retry the
/// action or reload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WalletError {
    /// No wallet provider was found. The user has to install one.
    #[error("no wallet provider available")]
    ProviderUnavailable,

    /// The user declined the request or closed the wallet prompt.
    #[error("request rejected in wallet")]
    UserRejected,

    /// Provider-internal failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// A signature was requested without an active session.
    #[error("wallet not connected")]
    NotConnected,

    /// A signature request is already waiting on the provider.
    #[error("a signature request is already pending")]
    Busy,
}

impl WalletError {
    /// Create a provider error from a message.
    #[inline]
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Whether the user can simply try the same action again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::UserRejected | Self::Provider(_) | Self::Busy)
    }

    /// Short message suitable for display next to the failed action.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "No wallet found. Install a browser wallet and try again.",
            Self::UserRejected => "Request was rejected in your wallet.",
            Self::Provider(_) => "Your wallet reported an error. Please try again.",
            Self::NotConnected => "Connect your wallet first.",
            Self::Busy => "Check your wallet, a signature request is already open.",
        }
    }
}

// ============================================================================
// Clipboard Errors
// ============================================================================

/// Clipboard write failures. Always non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ClipboardError {
    /// No clipboard is reachable from this context.
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    /// The context does not have input focus.
    #[error("no input focus")]
    NoFocus,

    /// The platform refused the write.
    #[error("clipboard permission denied")]
    PermissionDenied,

    /// There is no signature to copy yet.
    #[error("nothing to copy")]
    Empty,
}

impl ClipboardError {
    /// Create an unavailable error from a message.
    #[inline]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Generic invalid value.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The challenge template has no service name.
    #[error("template service name must not be empty")]
    EmptyServiceName,

    /// The challenge template does not embed the verification code.
    #[error("template fields must include `code`")]
    MissingCodeField,

    /// A template field is listed more than once.
    #[error("template field `{0}` is listed more than once")]
    DuplicateField(String),

    /// The inbound URL could not be parsed.
    #[error("invalid url: {0}")]
    Url(String),
}

impl ConfigError {
    /// Create an invalid configuration error from a message.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

impl From<url::ParseError> for ConfigError {
    fn from(err: url::ParseError) -> Self {
        Self::Url(err.to_string())
    }
}
