//! Verification state machine.
//!
//! ```text
//!            session Connected              sign() succeeds
//!  Connect ─────────────────────▶ Verify ─────────────────▶ Signed
//!     ▲                             │                          │
//!     └──── session Disconnected ───┴──────────────────────────┘
//! ```
//!
//! The machine is the only writer of the verification state. It reacts to
//! session changes pushed by the [`WalletSessionAdapter`] and to the outcome
//! of user-initiated `connect`, `sign` and `disconnect` calls. Failed calls
//! never move the phase; they are recorded as a transient error and
//! broadcast as [`VerificationEvent::TransientError`].

use std::fmt;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::challenge::{Challenge, IdentityParameters};
use crate::clipboard::{Clipboard, ClipboardController, CopyOutcome};
use crate::config::VerifyConfig;
use crate::error::{ClipboardError, WalletError};
use crate::view::VerificationView;
use crate::wallet::{WalletSession, WalletSessionAdapter};

/// Phase of the verification flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No wallet session; the user has to connect.
    #[default]
    Connect,
    /// Connected; the user can sign the challenge.
    Verify,
    /// The challenge is signed.
    Signed,
}

impl Phase {
    /// Lowercase name for logs and display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Verify => "verify",
            Self::Signed => "signed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase and signature, as exposed to the presentation layer.
///
/// `phase == Signed` if and only if a signature is present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerificationState {
    phase: Phase,
    signature: Option<String>,
}

impl VerificationState {
    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The produced signature, once signed.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Whether the challenge is signed.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        matches!(self.phase, Phase::Signed)
    }
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent {
    /// The phase changed.
    PhaseChanged {
        /// Previous phase.
        from: Phase,
        /// New phase.
        to: Phase,
    },
    /// A wallet call failed. The phase is unchanged and the action can be
    /// retried.
    TransientError(WalletError),
    /// Result of the automatic copy after signing.
    AutoCopy(CopyOutcome),
    /// A manual copy succeeded.
    ManualCopied,
    /// A manual copy failed.
    ManualCopyFailed(ClipboardError),
}

/// Full machine state. `epoch` advances whenever a signature would no longer
/// belong to the current session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct MachineState {
    pub(crate) phase: Phase,
    pub(crate) signature: Option<String>,
    pub(crate) session: WalletSession,
    pub(crate) signing: bool,
    pub(crate) last_error: Option<WalletError>,
    pub(crate) copy: Option<CopyOutcome>,
    pub(crate) epoch: u64,
}

impl MachineState {
    fn verification(&self) -> VerificationState {
        VerificationState {
            phase: self.phase,
            signature: self.signature.clone(),
        }
    }

    fn clear_signature(&mut self) {
        self.signature = None;
        self.copy = None;
        self.epoch += 1;
    }

    /// Apply a session change and return the phase transition, if any.
    fn apply_session(&mut self, session: WalletSession) -> Option<(Phase, Phase)> {
        let from = self.phase;
        let account_changed = self.session.account != session.account;
        self.session = session;

        if session.is_connected() {
            if from == Phase::Connect || account_changed {
                self.clear_signature();
                self.phase = Phase::Verify;
            }
        } else if from != Phase::Connect {
            self.clear_signature();
            self.phase = Phase::Connect;
        }

        if from == self.phase {
            None
        } else {
            self.last_error = None;
            Some((from, self.phase))
        }
    }
}

struct Shared {
    state: watch::Sender<MachineState>,
    events: broadcast::Sender<VerificationEvent>,
}

impl Shared {
    fn emit(&self, event: VerificationEvent) {
        let _ = self.events.send(event);
    }

    fn apply_session(&self, session: WalletSession) {
        let mut transition = None;
        self.state.send_if_modified(|state| {
            let before = state.clone();
            transition = state.apply_session(session);
            *state != before
        });

        if let Some((from, to)) = transition {
            info!(%from, %to, account = ?session.account, "verification phase changed");
            self.emit(VerificationEvent::PhaseChanged { from, to });
        }
    }

    fn report(&self, err: WalletError) {
        warn!(error = %err, "wallet action failed");
        self.state.send_modify(|state| state.last_error = Some(err.clone()));
        self.emit(VerificationEvent::TransientError(err));
    }
}

/// Clears the signing flag if a sign call is dropped before it finishes.
struct SigningFlag<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl SigningFlag<'_> {
    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SigningFlag<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.state.send_if_modified(|state| {
                std::mem::replace(&mut state.signing, false)
            });
        }
    }
}

/// Drives the verification flow for one set of identity parameters.
pub struct VerificationMachine {
    challenge: Challenge,
    adapter: Arc<WalletSessionAdapter>,
    clipboard: ClipboardController,
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl fmt::Debug for VerificationMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationMachine")
            .field("challenge", &self.challenge)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl VerificationMachine {
    /// Build the challenge and start following the adapter's session.
    ///
    /// Must be called within a Tokio runtime. The subscription to the
    /// session lasts until [`shutdown`](Self::shutdown) or drop.
    #[must_use]
    pub fn start(
        config: &VerifyConfig,
        params: &IdentityParameters,
        adapter: Arc<WalletSessionAdapter>,
        clipboard: Arc<dyn Clipboard>,
    ) -> Self {
        let challenge = Challenge::build(&config.template, params);
        let (state, _) = watch::channel(MachineState::default());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Arc::new(Shared { state, events });

        shared.apply_session(adapter.session());
        let pump = tokio::spawn(pump_sessions(adapter.observe_session(), Arc::clone(&shared)));

        debug!(code = %params.code, user = %params.user, "verification machine started");

        Self {
            challenge,
            adapter,
            clipboard: ClipboardController::new(clipboard, config.auto_copy),
            shared,
            pump,
        }
    }

    /// The challenge this machine signs.
    #[must_use]
    pub const fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    /// The wallet session adapter.
    #[must_use]
    pub const fn adapter(&self) -> &Arc<WalletSessionAdapter> {
        &self.adapter
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.state.borrow().phase
    }

    /// Current phase and signature.
    #[must_use]
    pub fn state(&self) -> VerificationState {
        self.shared.state.borrow().verification()
    }

    /// The produced signature, once signed.
    #[must_use]
    pub fn signature(&self) -> Option<String> {
        self.shared.state.borrow().signature.clone()
    }

    /// The session as last seen by the machine.
    #[must_use]
    pub fn session(&self) -> WalletSession {
        self.shared.state.borrow().session
    }

    /// The most recent transient error, cleared by the next action or phase
    /// change.
    #[must_use]
    pub fn last_error(&self) -> Option<WalletError> {
        self.shared.state.borrow().last_error.clone()
    }

    /// Everything the presentation layer renders.
    #[must_use]
    pub fn view(&self) -> VerificationView {
        VerificationView::from_state(&self.shared.state.borrow())
    }

    /// Subscribe to verification events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<VerificationEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until the machine reaches `phase`.
    pub async fn wait_for_phase(&self, phase: Phase) -> VerificationState {
        let mut rx = self.shared.state.subscribe();
        let reached = rx
            .wait_for(|state| state.phase == phase)
            .await
            .map(|state| state.verification());
        reached.unwrap_or_else(|_| self.state())
    }

    /// Connect the wallet. A no-op once connected or while a connect request
    /// is waiting on the wallet.
    pub async fn connect(&self) -> Result<(), WalletError> {
        if self.phase() != Phase::Connect {
            debug!("wallet already connected");
            return Ok(());
        }
        self.clear_error();

        self.adapter
            .connect()
            .await
            .inspect_err(|err| self.shared.report(err.clone()))
    }

    /// Ask the wallet to sign the challenge.
    ///
    /// Only one request can be pending; a second call fails with
    /// [`WalletError::Busy`]. Outside [`Phase::Verify`] the call fails with
    /// [`WalletError::NotConnected`] before the wallet is asked, even if the
    /// adapter already reports a session the machine has not seen yet. A
    /// no-op once signed.
    pub async fn sign(&self) -> Result<(), WalletError> {
        let mut begin = Err(WalletError::Busy);
        let mut already_signed = false;
        self.shared.state.send_if_modified(|state| {
            if state.phase == Phase::Signed {
                already_signed = true;
                return false;
            }
            if state.phase != Phase::Verify {
                begin = Err(WalletError::NotConnected);
                return false;
            }
            if state.signing {
                return false;
            }
            state.signing = true;
            state.last_error = None;
            begin = Ok(state.epoch);
            true
        });

        if already_signed {
            debug!("challenge already signed");
            return Ok(());
        }
        let epoch = match begin {
            Ok(epoch) => epoch,
            Err(err) => {
                self.shared.report(err.clone());
                return Err(err);
            }
        };

        let mut flag = SigningFlag {
            shared: &self.shared,
            armed: true,
        };
        let result = self.adapter.sign_message(&self.challenge).await;
        flag.disarm();

        let signature = match result {
            Ok(signature) => signature,
            Err(err) => {
                self.shared.state.send_modify(|state| state.signing = false);
                self.shared.report(err.clone());
                return Err(err);
            }
        };

        let mut accepted = false;
        self.shared.state.send_modify(|state| {
            state.signing = false;
            if state.epoch == epoch && state.phase == Phase::Verify && state.session.is_connected()
            {
                state.signature = Some(signature.clone());
                state.phase = Phase::Signed;
                state.last_error = None;
                accepted = true;
            }
        });

        if !accepted {
            warn!("discarding signature: the wallet session changed while signing");
            return Err(WalletError::NotConnected);
        }

        info!(account = ?self.session().account, "challenge signed");
        self.shared.emit(VerificationEvent::PhaseChanged {
            from: Phase::Verify,
            to: Phase::Signed,
        });
        self.spawn_auto_copy(signature, epoch);
        Ok(())
    }

    /// Disconnect the wallet. The machine returns to [`Phase::Connect`]
    /// immediately.
    pub async fn disconnect(&self) {
        self.adapter.disconnect().await;
        self.shared.apply_session(self.adapter.session());
    }

    /// Copy the signature on user request. Available whenever the flow is
    /// signed, whatever the automatic copy did.
    pub async fn copy_signature(&self) -> Result<(), ClipboardError> {
        let signature = self.signature().ok_or(ClipboardError::Empty)?;
        match self.clipboard.copy(&signature).await {
            Ok(()) => {
                self.shared.emit(VerificationEvent::ManualCopied);
                Ok(())
            }
            Err(err) => {
                self.shared
                    .emit(VerificationEvent::ManualCopyFailed(err.clone()));
                Err(err)
            }
        }
    }

    /// Stop following the wallet session.
    pub fn shutdown(&self) {
        self.pump.abort();
    }

    fn clear_error(&self) {
        self.shared
            .state
            .send_if_modified(|state| state.last_error.take().is_some());
    }

    fn spawn_auto_copy(&self, signature: String, epoch: u64) {
        let controller = self.clipboard.clone();
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let outcome = controller.on_signed(&signature).await;
            shared.state.send_if_modified(|state| {
                if state.epoch == epoch && state.phase == Phase::Signed {
                    state.copy = Some(outcome.clone());
                    true
                } else {
                    false
                }
            });
            shared.emit(VerificationEvent::AutoCopy(outcome));
        });
    }
}

impl Drop for VerificationMachine {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump_sessions<S>(sessions: S, shared: Arc<Shared>)
where
    S: Stream<Item = WalletSession> + Send + 'static,
{
    let mut sessions = Box::pin(sessions);
    while let Some(session) = sessions.next().await {
        shared.apply_session(session);
    }
    debug!("wallet session stream ended");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clipboard::NoClipboard;
    use crate::wallet::{
        ApprovalHandler, ApprovalRequest, ApprovalResponse, LocalWalletProvider, WalletProvider,
    };
    use alloy::primitives::Address;
    use async_trait::async_trait;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    /// Approves everything and counts signature prompts.
    #[derive(Debug, Default, Clone)]
    struct CountingApproval(Arc<AtomicUsize>);

    #[async_trait]
    impl ApprovalHandler for CountingApproval {
        async fn approve(&self, request: &ApprovalRequest) -> ApprovalResponse {
            if matches!(request, ApprovalRequest::SignMessage { .. }) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            ApprovalResponse::Approved
        }
    }

    fn connected(byte: u8) -> WalletSession {
        WalletSession::connected(Address::repeat_byte(byte))
    }

    #[test]
    fn test_connect_to_verify() {
        let mut state = MachineState::default();
        assert_eq!(
            state.apply_session(connected(1)),
            Some((Phase::Connect, Phase::Verify))
        );
        assert_eq!(state.phase, Phase::Verify);
        assert!(state.signature.is_none());
    }

    #[test]
    fn test_connecting_stays_in_connect() {
        let mut state = MachineState::default();
        assert_eq!(state.apply_session(WalletSession::connecting()), None);
        assert_eq!(state.phase, Phase::Connect);
        assert_eq!(state.session, WalletSession::connecting());
    }

    #[test]
    fn test_disconnect_clears_signature_from_any_phase() {
        for phase in [Phase::Verify, Phase::Signed] {
            let mut state = MachineState::default();
            state.apply_session(connected(1));
            if phase == Phase::Signed {
                state.phase = Phase::Signed;
                state.signature = Some("0xSIG".into());
            }

            assert_eq!(
                state.apply_session(WalletSession::disconnected()),
                Some((phase, Phase::Connect))
            );
            assert!(state.signature.is_none());
            assert_eq!(state.verification(), VerificationState::default());
        }
    }

    #[test]
    fn test_account_switch_invalidates_signature() {
        let mut state = MachineState::default();
        state.apply_session(connected(1));
        state.phase = Phase::Signed;
        state.signature = Some("0xSIG".into());
        let epoch = state.epoch;

        assert_eq!(
            state.apply_session(connected(2)),
            Some((Phase::Signed, Phase::Verify))
        );
        assert!(state.signature.is_none());
        assert!(state.epoch > epoch);
    }

    #[test]
    fn test_same_session_is_idempotent() {
        let mut state = MachineState::default();
        state.apply_session(connected(1));
        let epoch = state.epoch;
        assert_eq!(state.apply_session(connected(1)), None);
        assert_eq!(state.epoch, epoch);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Verify.to_string(), "verify");
        assert_eq!(
            serde_json::to_string(&Phase::Signed).unwrap(),
            "\"signed\""
        );
    }

    #[tokio::test]
    async fn test_sign_waits_for_machine_to_see_session() {
        let prompts = CountingApproval::default();
        let provider = Arc::new(
            LocalWalletProvider::from_private_key(DEV_KEY)
                .unwrap()
                .with_approval(prompts.clone()),
        );
        let adapter = Arc::new(WalletSessionAdapter::new(
            Arc::clone(&provider) as Arc<dyn WalletProvider>
        ));
        let machine = VerificationMachine::start(
            &VerifyConfig::default(),
            &IdentityParameters::new("AB12"),
            Arc::clone(&adapter),
            Arc::new(NoClipboard),
        );
        // Freeze the machine's view of the session.
        machine.shutdown();

        provider.connect().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while !adapter.session().is_connected() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(machine.phase(), Phase::Connect);

        assert_eq!(machine.sign().await, Err(WalletError::NotConnected));
        assert_eq!(prompts.0.load(Ordering::SeqCst), 0);
        assert_eq!(machine.last_error(), Some(WalletError::NotConnected));
        assert!(!machine.view().signing);
    }
}
