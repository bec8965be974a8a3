//! Session adapter over an injected wallet provider.
//!
//! The adapter holds no truth of its own: it mirrors the provider's session
//! from the provider's change notifications. Two local rules sit on top:
//!
//! - Provider events carrying a sequence number are applied last-write-wins;
//!   anything at or below the last applied number is dropped.
//! - After a local [`disconnect`](WalletSessionAdapter::disconnect), provider
//!   sessions other than `Disconnected` are ignored until the next
//!   [`connect`](WalletSessionAdapter::connect), so a late "connected"
//!   notification cannot bring the session back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ProviderEvent, ProviderEventStream, SessionStatus, WalletProvider, WalletSession};
use crate::challenge::Challenge;
use crate::error::WalletError;

/// Mirror of a wallet provider's session.
pub struct WalletSessionAdapter {
    provider: Option<Arc<dyn WalletProvider>>,
    shared: Arc<AdapterShared>,
    pump: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WalletSessionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSessionAdapter")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_owned()))
            .field("session", &*self.shared.session.borrow())
            .finish_non_exhaustive()
    }
}

struct AdapterShared {
    session: watch::Sender<WalletSession>,
    order: Mutex<EventOrder>,
    signing: AtomicBool,
}

#[derive(Debug, Default)]
struct EventOrder {
    /// Highest provider sequence number applied so far.
    last_seq: Option<u64>,
    /// Set by a local disconnect, cleared by the next connect.
    hold_connected: bool,
}

impl AdapterShared {
    fn new() -> Self {
        let (session, _) = watch::channel(WalletSession::disconnected());
        Self {
            session,
            order: Mutex::new(EventOrder::default()),
            signing: AtomicBool::new(false),
        }
    }

    /// Apply a provider event. Returns `true` if the mirrored session changed.
    async fn apply(&self, event: ProviderEvent) -> bool {
        let mut order = self.order.lock().await;

        if let Some(seq) = event.seq {
            if order.last_seq.is_some_and(|last| seq <= last) {
                debug!(seq, last = ?order.last_seq, "dropping stale provider event");
                return false;
            }
            order.last_seq = Some(seq);
        }

        // A connected session without an account means the account is gone.
        let session = if event.session.status == SessionStatus::Connected
            && event.session.account.is_none()
        {
            WalletSession::disconnected()
        } else {
            event.session
        };

        if order.hold_connected && session.status != SessionStatus::Disconnected {
            debug!(status = %session.status, "ignoring provider session after local disconnect");
            return false;
        }

        let changed = self.session.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });
        if changed {
            debug!(
                status = %session.status,
                account = ?session.account,
                "wallet session updated"
            );
        }
        changed
    }
}

/// Clears the in-flight flag when the signature request ends or is dropped.
struct SignGuard<'a>(&'a AtomicBool);

impl<'a> SignGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SignGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WalletSessionAdapter {
    /// Create an adapter over `provider` and start mirroring its session.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        let shared = Arc::new(AdapterShared::new());
        let events = provider.subscribe();
        let pump = tokio::spawn(pump_events(events, Arc::clone(&shared)));
        info!(provider = provider.name(), "wallet provider attached");

        Self {
            provider: Some(provider),
            shared,
            pump: Some(pump),
        }
    }

    /// Create an adapter with no provider. Every connect fails with
    /// [`WalletError::ProviderUnavailable`].
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            provider: None,
            shared: Arc::new(AdapterShared::new()),
            pump: None,
        }
    }

    /// Use the first available provider, if any.
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn first_available(providers: impl IntoIterator<Item = Arc<dyn WalletProvider>>) -> Self {
        providers
            .into_iter()
            .find(|provider| provider.is_available())
            .map_or_else(Self::unavailable, Self::new)
    }

    /// Name of the attached provider.
    #[must_use]
    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|provider| provider.name())
    }

    /// Current session.
    #[must_use]
    pub fn session(&self) -> WalletSession {
        *self.shared.session.borrow()
    }

    /// Whether a signature request is waiting on the provider.
    #[must_use]
    pub fn is_signing(&self) -> bool {
        self.shared.signing.load(Ordering::Acquire)
    }

    /// Live view of the session.
    ///
    /// Yields the current session first, then every change. Intermediate
    /// values may be skipped when changes arrive faster than they are
    /// consumed; the latest value is always delivered.
    pub fn observe_session(&self) -> impl Stream<Item = WalletSession> + Send + 'static {
        let mut rx = self.shared.session.subscribe();
        async_stream::stream! {
            let current = *rx.borrow_and_update();
            yield current;
            while rx.changed().await.is_ok() {
                let session = *rx.borrow_and_update();
                yield session;
            }
        }
    }

    /// Ask the provider to connect.
    ///
    /// Returns once the user has answered; the account itself arrives through
    /// the provider's event stream. While a request is already waiting on the
    /// user, a second call returns immediately without prompting again.
    pub async fn connect(&self) -> Result<(), WalletError> {
        let provider = self
            .provider
            .as_ref()
            .filter(|provider| provider.is_available())
            .ok_or(WalletError::ProviderUnavailable)?;

        {
            let mut order = self.shared.order.lock().await;
            if self.shared.session.borrow().status == SessionStatus::Connecting {
                debug!(provider = provider.name(), "connect request already pending");
                return Ok(());
            }
            order.hold_connected = false;
            self.shared.session.send_if_modified(|session| {
                if session.status == SessionStatus::Disconnected {
                    *session = WalletSession::connecting();
                    true
                } else {
                    false
                }
            });
        }

        info!(provider = provider.name(), "requesting wallet connection");
        if let Err(err) = provider.connect().await {
            warn!(provider = provider.name(), error = %err, "wallet connection failed");
            self.shared.session.send_if_modified(|session| {
                if session.status == SessionStatus::Connecting {
                    *session = WalletSession::disconnected();
                    true
                } else {
                    false
                }
            });
            return Err(err);
        }
        Ok(())
    }

    /// Tear down the local session view.
    ///
    /// The session reads `Disconnected` as soon as this is called; the
    /// provider is then asked to drop its own session.
    pub async fn disconnect(&self) {
        {
            let mut order = self.shared.order.lock().await;
            order.hold_connected = true;
            self.shared.session.send_replace(WalletSession::disconnected());
        }

        if let Some(provider) = &self.provider {
            provider.disconnect().await;
        }
        info!("wallet disconnected");
    }

    /// Ask the connected account to sign the exact challenge bytes.
    ///
    /// Fails with [`WalletError::NotConnected`] without reaching the provider
    /// when there is no active session, and with [`WalletError::Busy`] while
    /// another request is pending.
    pub async fn sign_message(&self, challenge: &Challenge) -> Result<String, WalletError> {
        let session = self.session();
        let account = match (session.status, session.account) {
            (SessionStatus::Connected, Some(account)) => account,
            _ => return Err(WalletError::NotConnected),
        };
        let provider = self.provider.as_ref().ok_or(WalletError::NotConnected)?;
        let _guard = SignGuard::acquire(&self.shared.signing).ok_or(WalletError::Busy)?;

        debug!(account = %account, "requesting signature");
        let signature = provider
            .sign_message(account, challenge.as_bytes())
            .await?;

        if signature.trim().is_empty() {
            return Err(WalletError::provider("wallet returned an empty signature"));
        }
        Ok(signature)
    }

    /// Stop mirroring provider events.
    pub fn shutdown(&self) {
        if let Some(pump) = &self.pump {
            pump.abort();
            debug!("wallet session pump stopped");
        }
    }

    #[cfg(test)]
    pub(crate) async fn apply(&self, event: ProviderEvent) -> bool {
        self.shared.apply(event).await
    }
}

impl Drop for WalletSessionAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn pump_events(mut events: ProviderEventStream, shared: Arc<AdapterShared>) {
    while let Some(event) = events.next().await {
        shared.apply(event).await;
    }
    debug!("provider event stream ended");
}
