//! Presentation view model.
//!
//! A [`VerificationView`] is a snapshot of everything a front end renders:
//! phase, address, prompt text and which actions are enabled. Front ends
//! never read the machine's internals directly.

use serde::Serialize;

use crate::clipboard::CopyOutcome;
use crate::machine::{MachineState, Phase};
use crate::wallet::SessionStatus;

/// Prompt shown while waiting for a wallet connection.
pub const PROMPT_CONNECT: &str = "Beep boop!";
/// Prompt shown while the challenge is waiting to be signed.
pub const PROMPT_VERIFY: &str = "Bzzign to Verify, Beep.";
/// Prompt shown next to the produced signature.
pub const PROMPT_SIGNED: &str = "Paste this Bzzignature in Discord to comBlete verification.";
/// Address line when no wallet is connected.
pub const NO_WALLET: &str = "No wallet connected.";
/// Footer disclaimer.
pub const DISCLAIMER: &str = "No sensitive data. No transactions. No wallet exposure.";
/// Hint shown when the automatic copy did not happen.
pub const COPY_MANUALLY: &str = "Copy the signature manually.";
/// Hint shown after a successful automatic copy.
pub const COPIED: &str = "Signature copied to clipboard.";

/// Which user actions are currently enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Actions {
    /// Connect button.
    pub can_connect: bool,
    /// Sign button. Disabled while a signature request is pending.
    pub can_sign: bool,
    /// Manual copy button.
    pub can_copy: bool,
    /// Disconnect button.
    pub can_disconnect: bool,
}

/// Snapshot of the verification flow for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationView {
    /// Current phase.
    pub phase: Phase,
    /// Checksummed address of the connected account.
    pub address: Option<String>,
    /// Phase prompt.
    pub prompt: &'static str,
    /// The signature, once signed.
    pub signature: Option<String>,
    /// Whether a connect request is waiting on the wallet.
    pub connecting: bool,
    /// Whether a signature request is waiting on the wallet.
    pub signing: bool,
    /// Message for the most recent failed action.
    pub error: Option<String>,
    /// Outcome of the automatic copy.
    pub copy: Option<CopyOutcome>,
    /// Enabled actions.
    pub actions: Actions,
}

impl VerificationView {
    pub(crate) fn from_state(state: &MachineState) -> Self {
        let connected = state.session.is_connected();
        let connecting = state.session.status == SessionStatus::Connecting;

        let prompt = match state.phase {
            Phase::Connect => PROMPT_CONNECT,
            Phase::Verify => PROMPT_VERIFY,
            Phase::Signed => PROMPT_SIGNED,
        };

        let actions = Actions {
            can_connect: state.phase == Phase::Connect && !connecting,
            can_sign: state.phase == Phase::Verify && connected && !state.signing,
            can_copy: state.phase == Phase::Signed,
            can_disconnect: connected,
        };

        Self {
            phase: state.phase,
            address: state.session.address_string(),
            prompt,
            signature: state.signature.clone(),
            connecting,
            signing: state.signing,
            error: state
                .last_error
                .as_ref()
                .map(|err| err.user_message().to_owned()),
            copy: state.copy.clone(),
            actions,
        }
    }

    /// Address line: the checksummed address or [`NO_WALLET`].
    #[must_use]
    pub fn address_line(&self) -> &str {
        self.address.as_deref().unwrap_or(NO_WALLET)
    }

    /// Copy status line for the signed phase.
    #[must_use]
    pub fn copy_hint(&self) -> Option<&'static str> {
        match &self.copy {
            Some(CopyOutcome::Copied) => Some(COPIED),
            Some(_) => Some(COPY_MANUALLY),
            None => None,
        }
    }

    /// Footer disclaimer.
    #[must_use]
    pub const fn footer() -> &'static str {
        DISCLAIMER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WalletError;
    use crate::wallet::WalletSession;
    use alloy::primitives::Address;

    #[test]
    fn test_connect_view() {
        let view = VerificationView::from_state(&MachineState::default());
        assert_eq!(view.prompt, PROMPT_CONNECT);
        assert_eq!(view.address_line(), NO_WALLET);
        assert_eq!(
            view.actions,
            Actions {
                can_connect: true,
                ..Actions::default()
            }
        );
    }

    #[test]
    fn test_connect_disabled_while_connecting() {
        let state = MachineState {
            session: WalletSession::connecting(),
            ..MachineState::default()
        };
        let view = VerificationView::from_state(&state);
        assert!(view.connecting);
        assert!(!view.actions.can_connect);
    }

    #[test]
    fn test_sign_disabled_while_pending() {
        let mut state = MachineState {
            phase: Phase::Verify,
            session: WalletSession::connected(Address::repeat_byte(1)),
            ..MachineState::default()
        };
        let view = VerificationView::from_state(&state);
        assert_eq!(view.prompt, PROMPT_VERIFY);
        assert!(view.actions.can_sign);
        assert!(view.actions.can_disconnect);
        assert!(view.address.is_some());

        state.signing = true;
        assert!(!VerificationView::from_state(&state).actions.can_sign);
    }

    #[test]
    fn test_signed_view() {
        let state = MachineState {
            phase: Phase::Signed,
            signature: Some("0xSIG".into()),
            session: WalletSession::connected(Address::repeat_byte(1)),
            copy: Some(CopyOutcome::NoFocus),
            ..MachineState::default()
        };
        let view = VerificationView::from_state(&state);
        assert_eq!(view.prompt, PROMPT_SIGNED);
        assert_eq!(view.signature.as_deref(), Some("0xSIG"));
        assert!(view.actions.can_copy);
        assert!(!view.actions.can_sign);
        assert_eq!(view.copy_hint(), Some(COPY_MANUALLY));
    }

    #[test]
    fn test_error_message() {
        let state = MachineState {
            last_error: Some(WalletError::UserRejected),
            ..MachineState::default()
        };
        let view = VerificationView::from_state(&state);
        assert_eq!(
            view.error.as_deref(),
            Some(WalletError::UserRejected.user_message())
        );
        assert_eq!(VerificationView::footer(), DISCLAIMER);
    }
}
