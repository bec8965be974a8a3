//! In-process wallet provider backed by a local key.
//!
//! [`LocalWalletProvider`] stands in for a browser wallet during development
//! and in terminal front ends: it signs with an [`alloy`] `PrivateKeySigner`
//! (EIP-191 personal sign) and routes every prompt through an
//! [`ApprovalHandler`]. The key is supplied by the caller; nothing is
//! generated or stored.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use alloy::primitives::{Address, hex};
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::approval::{ApprovalHandler, ApprovalRequest, AutoApprove};
use super::{ProviderEvent, ProviderEventStream, WalletProvider, WalletSession};
use crate::error::WalletError;

/// Default provider name.
const DEFAULT_NAME: &str = "local";

/// Capacity of the provider event channel.
const EVENT_CAPACITY: usize = 16;

/// A wallet provider signing with a local private key.
pub struct LocalWalletProvider {
    name: String,
    signer: PrivateKeySigner,
    approval: Arc<dyn ApprovalHandler>,
    events: broadcast::Sender<ProviderEvent>,
    connected: AtomicBool,
    seq: AtomicU64,
}

impl std::fmt::Debug for LocalWalletProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWalletProvider")
            .field("name", &self.name)
            .field("address", &self.signer.address())
            .field("connected", &self.connected.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl LocalWalletProvider {
    /// Create a provider from a raw private key hex string (with or without
    /// `0x`). Requests are auto-approved until a handler is set.
    pub fn from_private_key(key: &str) -> Result<Self, WalletError> {
        let key = key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let signer = key
            .parse::<PrivateKeySigner>()
            .map_err(|e| WalletError::provider(format!("invalid private key: {e}")))?;
        Ok(Self::from_signer(signer))
    }

    /// Create a provider around an existing signer.
    #[must_use]
    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(address = %signer.address(), "local wallet provider initialized");
        Self {
            name: DEFAULT_NAME.to_owned(),
            signer,
            approval: Arc::new(AutoApprove),
            events,
            connected: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        }
    }

    /// Set the handler that answers connect and sign prompts.
    #[must_use]
    pub fn with_approval(mut self, handler: impl ApprovalHandler + 'static) -> Self {
        self.approval = Arc::new(handler);
        self
    }

    /// Set the provider name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The account this provider signs for.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn current_session(&self) -> WalletSession {
        if self.connected.load(Ordering::Acquire) {
            WalletSession::connected(self.address())
        } else {
            WalletSession::disconnected()
        }
    }

    fn emit(&self, session: WalletSession) {
        let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(seq, status = %session.status, "local provider session changed");
        let _ = self.events.send(ProviderEvent::sequenced(seq, session));
    }
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), WalletError> {
        let request = ApprovalRequest::Connect {
            provider: self.name.clone(),
            account: self.address(),
        };
        if !self.approval.approve(&request).await.is_approved() {
            return Err(WalletError::UserRejected);
        }

        self.connected.store(true, Ordering::Release);
        self.emit(WalletSession::connected(self.address()));
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.emit(WalletSession::disconnected());
    }

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<String, WalletError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(WalletError::NotConnected);
        }
        if account != self.address() {
            return Err(WalletError::provider(format!(
                "account {account} is not managed by this wallet"
            )));
        }

        let request = ApprovalRequest::SignMessage {
            account,
            message: String::from_utf8_lossy(message).into_owned(),
        };
        if !self.approval.approve(&request).await.is_approved() {
            return Err(WalletError::UserRejected);
        }

        let sig = self
            .signer
            .sign_message(message)
            .await
            .map_err(|e| WalletError::provider(format!("message signing failed: {e}")))?;
        Ok(format!("0x{}", hex::encode(sig.as_bytes())))
    }

    fn subscribe(&self) -> ProviderEventStream {
        let mut rx = self.events.subscribe();
        let snapshot =
            ProviderEvent::sequenced(self.seq.load(Ordering::Acquire), self.current_session());

        Box::pin(async_stream::stream! {
            yield snapshot;
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "local provider events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
