//! User approval for wallet requests.
//!
//! A real wallet shows its own prompt for every connect and signature
//! request. [`LocalWalletProvider`](super::LocalWalletProvider) delegates that
//! decision to an [`ApprovalHandler`] so front ends and tests can answer it.

use alloy::primitives::Address;
use async_trait::async_trait;

/// A request the user must approve in the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalRequest {
    /// Expose `account` to the requesting page.
    Connect {
        /// Provider name.
        provider: String,
        /// The account that would be exposed.
        account: Address,
    },
    /// Sign `message` with `account`.
    SignMessage {
        /// Signing account.
        account: Address,
        /// Message text shown to the user.
        message: String,
    },
}

impl ApprovalRequest {
    /// Human-readable description of the request.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Connect { provider, account } => {
                format!("'{provider}' wants to connect account {}", account.to_checksum(None))
            }
            Self::SignMessage { account, message } => format!(
                "Sign message with {}:\n{message}",
                account.to_checksum(None)
            ),
        }
    }
}

/// The user's answer to an [`ApprovalRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalResponse {
    /// The user approved.
    Approved,
    /// The user declined or closed the prompt.
    Rejected,
}

impl ApprovalResponse {
    /// Check if the response approves the request.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Handler that answers wallet approval prompts.
///
/// There is no timeout: the request stays open until the handler answers.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Ask the user to approve `request`.
    async fn approve(&self, request: &ApprovalRequest) -> ApprovalResponse;
}

/// Approves every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalHandler for AutoApprove {
    async fn approve(&self, _request: &ApprovalRequest) -> ApprovalResponse {
        ApprovalResponse::Approved
    }
}

/// Rejects every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReject;

#[async_trait]
impl ApprovalHandler for AlwaysReject {
    async fn approve(&self, _request: &ApprovalRequest) -> ApprovalResponse {
        ApprovalResponse::Rejected
    }
}
