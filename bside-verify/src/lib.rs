#![cfg_attr(docsrs, feature(doc_cfg))]
//! Wallet ownership verification for B Side.
//!
//! A user arrives with identity parameters (a verification code and a user
//! id) from a chat bot, connects a wallet, and signs a deterministic
//! challenge. The signature is then pasted back into the chat, where an
//! external verifier checks it. This crate holds the core of that flow:
//!
//! - [`challenge`]: identity parameters and challenge rendering
//! - [`wallet`]: the wallet provider trait and the session adapter
//! - [`machine`]: the `Connect → Verify → Signed` state machine
//! - [`clipboard`]: best-effort copy of the signature
//! - [`view`]: the view model a front end renders
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bside_verify::prelude::*;
//!
//! let params = IdentityParameters::from_query("?code=AB12&user=1234");
//! let provider = LocalWalletProvider::from_private_key(&key)?;
//! let adapter = Arc::new(WalletSessionAdapter::new(Arc::new(provider)));
//! let machine = VerificationMachine::start(
//!     &VerifyConfig::default(),
//!     &params,
//!     adapter,
//!     Arc::new(MemoryClipboard::new()),
//! );
//!
//! machine.connect().await?;
//! machine.wait_for_phase(Phase::Verify).await;
//! machine.sign().await?;
//! println!("{}", machine.signature().unwrap_or_default());
//! ```

pub mod challenge;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod machine;
pub mod prelude;
pub mod view;
pub mod wallet;

pub use challenge::{Challenge, ChallengeTemplate, IdentityParameters, TemplateField, build_challenge};
pub use clipboard::{Clipboard, ClipboardController, CopyOutcome, MemoryClipboard, NoClipboard};
pub use config::VerifyConfig;
pub use error::{ClipboardError, ConfigError, Error, Result, WalletError};
pub use machine::{Phase, VerificationEvent, VerificationMachine, VerificationState};
pub use view::{Actions, VerificationView};
pub use wallet::{
    LocalWalletProvider, ProviderEvent, SessionStatus, WalletProvider, WalletSession,
    WalletSessionAdapter, recover_signer,
};
