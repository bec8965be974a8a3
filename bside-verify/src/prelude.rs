//! Common imports for front ends.

pub use crate::challenge::{Challenge, ChallengeTemplate, IdentityParameters, build_challenge};
pub use crate::clipboard::{Clipboard, CopyOutcome, MemoryClipboard, NoClipboard};
pub use crate::config::VerifyConfig;
pub use crate::error::{ClipboardError, WalletError};
pub use crate::machine::{Phase, VerificationEvent, VerificationMachine, VerificationState};
pub use crate::view::VerificationView;
pub use crate::wallet::{
    ApprovalHandler, ApprovalRequest, ApprovalResponse, AutoApprove, LocalWalletProvider,
    WalletProvider, WalletSession, WalletSessionAdapter,
};
