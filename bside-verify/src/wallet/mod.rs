//! Wallet provider abstraction and session adapter.
//!
//! The wallet provider is an external agent (browser extension, hardware
//! bridge) that holds the keys and asks the user to approve every request.
//! This module only mirrors its session and forwards requests to it.
//!
//! # Architecture
//!
//! ```text
//! WalletProvider (trait, external collaborator)
//!   ├── connect()        → user approves in the wallet, Connected event follows
//!   ├── disconnect()
//!   ├── sign_message()   → EIP-191 personal sign over the challenge bytes
//!   └── subscribe()      → ProviderEvent stream (account / disconnect changes)
//!
//! WalletSessionAdapter (mirror of the provider session)
//!   ├── connect() / disconnect() / sign_message()
//!   └── observe_session() → live WalletSession stream
//! ```

mod adapter;
mod approval;
mod local;

use std::fmt;

use alloy::primitives::{Address, Signature, hex};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::challenge::Challenge;
use crate::error::WalletError;

pub use adapter::WalletSessionAdapter;
pub use approval::{AlwaysReject, ApprovalHandler, ApprovalRequest, ApprovalResponse, AutoApprove};
pub use local::LocalWalletProvider;

/// Connection status of a wallet session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStatus {
    /// No session.
    #[default]
    Disconnected,
    /// A connect request is waiting on the user.
    Connecting,
    /// The provider exposes an account.
    Connected,
}

impl SessionStatus {
    /// Lowercase name for logs and display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the provider's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WalletSession {
    /// Connection status.
    pub status: SessionStatus,
    /// Active account while connected.
    pub account: Option<Address>,
}

impl WalletSession {
    /// A disconnected session.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            account: None,
        }
    }

    /// A session waiting on a connect approval.
    #[must_use]
    pub const fn connecting() -> Self {
        Self {
            status: SessionStatus::Connecting,
            account: None,
        }
    }

    /// A connected session for `account`.
    #[must_use]
    pub const fn connected(account: Address) -> Self {
        Self {
            status: SessionStatus::Connected,
            account: Some(account),
        }
    }

    /// Whether the session has an active account.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.status, SessionStatus::Connected) && self.account.is_some()
    }

    /// Checksummed address of the active account.
    #[must_use]
    pub fn address_string(&self) -> Option<String> {
        self.account.map(|account| account.to_checksum(None))
    }
}

/// A session change pushed by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderEvent {
    /// Monotonic sequence number, when the provider has one.
    pub seq: Option<u64>,
    /// The provider's session after the change.
    pub session: WalletSession,
}

impl ProviderEvent {
    /// An event without ordering information.
    #[must_use]
    pub const fn unsequenced(session: WalletSession) -> Self {
        Self { seq: None, session }
    }

    /// An event carrying the provider's sequence number.
    #[must_use]
    pub const fn sequenced(seq: u64, session: WalletSession) -> Self {
        Self {
            seq: Some(seq),
            session,
        }
    }
}

/// Stream of provider session changes.
pub type ProviderEventStream = BoxStream<'static, ProviderEvent>;

/// An injected wallet provider.
///
/// Implementations talk to an out-of-process wallet. None of the calls time
/// out: they stay pending until the user answers the wallet prompt, and a
/// closed prompt must come back as [`WalletError::UserRejected`].
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Whether the provider can currently be used.
    fn is_available(&self) -> bool {
        true
    }

    /// Ask the user to connect. The account arrives later as an event.
    async fn connect(&self) -> Result<(), WalletError>;

    /// Drop the provider-side session, if the provider supports it.
    async fn disconnect(&self);

    /// Sign `message` with `account`, returning a `0x`-prefixed hex signature.
    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<String, WalletError>;

    /// Subscribe to session changes.
    ///
    /// The subscription starts at the time of the call; earlier changes are
    /// not replayed.
    fn subscribe(&self) -> ProviderEventStream;
}

/// Recover the address that produced `signature` over `challenge`.
///
/// Display aid only. Whether the signature proves anything is decided by the
/// external verifier.
pub fn recover_signer(challenge: &Challenge, signature: &str) -> Result<Address, WalletError> {
    let bytes = hex::decode(signature)
        .map_err(|e| WalletError::provider(format!("signature is not hex: {e}")))?;
    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|e| WalletError::provider(format!("malformed signature: {e}")))?;
    signature
        .recover_address_from_msg(challenge.as_bytes())
        .map_err(|e| WalletError::provider(format!("signer recovery failed: {e}")))
}
