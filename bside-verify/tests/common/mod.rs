//! Shared test fixtures: a wallet provider driven by the test.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use bside_verify::wallet::ProviderEventStream;
use bside_verify::{
    Phase, ProviderEvent, VerificationMachine, VerificationState, WalletError, WalletProvider,
    WalletSession,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, broadcast, mpsc, oneshot};
use tracing_subscriber::EnvFilter;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(2);

/// Route library logs to the test output. `RUST_LOG` picks the level.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("bside_verify=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Account exposed by the scripted provider.
pub fn account() -> Address {
    "0xabc0000000000000000000000000000000000abc"
        .parse()
        .unwrap()
}

/// A signature request held by the test until it answers.
#[derive(Debug)]
pub struct SignRequest {
    pub account: Address,
    pub message: Vec<u8>,
    reply: oneshot::Sender<Result<String, WalletError>>,
}

impl SignRequest {
    pub fn resolve(self, signature: &str) {
        let _ = self.reply.send(Ok(signature.to_owned()));
    }

    pub fn reject(self, err: WalletError) {
        let _ = self.reply.send(Err(err));
    }
}

/// A wallet provider whose every move is scripted by the test.
///
/// `connect` emits a sequenced `Connected` event unless rejections are
/// switched on. Sign requests are forwarded to the test through a channel
/// and stay pending until the test resolves them; dropping a request reads
/// as the user closing the prompt.
pub struct ScriptedProvider {
    account: Address,
    events: broadcast::Sender<ProviderEvent>,
    seq: AtomicU64,
    reject_connect: AtomicBool,
    hold_connect: AtomicBool,
    connect_gate: Notify,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    sign_requests: mpsc::UnboundedSender<SignRequest>,
}

impl ScriptedProvider {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SignRequest>) {
        let (events, _) = broadcast::channel(32);
        let (sign_requests, rx) = mpsc::unbounded_channel();
        let provider = Arc::new(Self {
            account: account(),
            events,
            seq: AtomicU64::new(0),
            reject_connect: AtomicBool::new(false),
            hold_connect: AtomicBool::new(false),
            connect_gate: Notify::new(),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            sign_requests,
        });
        (provider, rx)
    }

    pub fn reject_connect(&self, reject: bool) {
        self.reject_connect.store(reject, Ordering::SeqCst);
    }

    /// Keep connect prompts open until [`release_connect`](Self::release_connect).
    pub fn hold_connect(&self, hold: bool) {
        self.hold_connect.store(hold, Ordering::SeqCst);
    }

    pub fn release_connect(&self) {
        self.connect_gate.notify_one();
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Emit `session` with the next sequence number.
    pub fn emit(&self, session: WalletSession) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.events.send(ProviderEvent::sequenced(seq, session));
        seq
    }

    pub fn emit_with_seq(&self, seq: u64, session: WalletSession) {
        let _ = self.events.send(ProviderEvent::sequenced(seq, session));
    }

    pub fn emit_unsequenced(&self, session: WalletSession) {
        let _ = self.events.send(ProviderEvent::unsequenced(session));
    }
}

#[async_trait]
impl WalletProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self) -> Result<(), WalletError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.hold_connect.load(Ordering::SeqCst) {
            self.connect_gate.notified().await;
        }
        if self.reject_connect.load(Ordering::SeqCst) {
            return Err(WalletError::UserRejected);
        }
        self.emit(WalletSession::connected(self.account));
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<String, WalletError> {
        let (reply, answer) = oneshot::channel();
        let request = SignRequest {
            account,
            message: message.to_vec(),
            reply,
        };
        self.sign_requests
            .send(request)
            .map_err(|_| WalletError::provider("test harness gone"))?;
        answer.await.unwrap_or(Err(WalletError::UserRejected))
    }

    fn subscribe(&self) -> ProviderEventStream {
        let mut rx = self.events.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Wait for `phase`, failing the test after [`WAIT`].
pub async fn reach(machine: &VerificationMachine, phase: Phase) -> VerificationState {
    tokio::time::timeout(WAIT, machine.wait_for_phase(phase))
        .await
        .unwrap_or_else(|_| panic!("machine never reached {phase}, stuck in {}", machine.phase()))
}

/// Receive the next sign request, failing the test after [`WAIT`].
pub async fn next_request(requests: &mut mpsc::UnboundedReceiver<SignRequest>) -> SignRequest {
    tokio::time::timeout(WAIT, requests.recv())
        .await
        .expect("no sign request arrived")
        .expect("provider dropped")
}

/// Yield until spawned tasks have run.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
