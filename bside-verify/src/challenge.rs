//! Challenge construction.
//!
//! The challenge is the exact text the wallet signs. The external verifier
//! rebuilds the same string server-side and checks the signature against the
//! claimed address, so rendering must be byte-for-byte deterministic: the
//! same [`IdentityParameters`] and [`ChallengeTemplate`] always produce the
//! same [`Challenge`].
//!
//! ```text
//! Sign this message to verify for B Side:
//! "Verify B Side | Code: AB12 | User: 1234"
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Query key carrying the verification code.
pub const QUERY_CODE: &str = "code";
/// Query key carrying the external user identifier.
pub const QUERY_USER: &str = "user";
/// Query key carrying the expected wallet address.
pub const QUERY_WALLET: &str = "wallet";

/// Service name used by the default template.
pub const DEFAULT_SERVICE_NAME: &str = "B Side";

/// Identity parameters read from the inbound request.
///
/// Missing values are empty strings. Nothing here is validated: checking the
/// code against a pending verification is the external verifier's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityParameters {
    /// Opaque verification code.
    #[serde(default)]
    pub code: String,
    /// External user identifier.
    #[serde(default)]
    pub user: String,
    /// Expected wallet address hint.
    #[serde(default, rename = "wallet")]
    pub wallet_hint: String,
}

impl IdentityParameters {
    /// Create parameters carrying only a verification code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    /// Set the user identifier.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the wallet address hint.
    #[must_use]
    pub fn with_wallet_hint(mut self, wallet: impl Into<String>) -> Self {
        self.wallet_hint = wallet.into();
        self
    }

    /// Read parameters from a query string (leading `?` optional).
    ///
    /// Values are form-url-decoded. When a key repeats, the first occurrence
    /// wins.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    /// Read parameters from the full URL of the hosting page.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(url)?;
        Ok(Self::from_pairs(url.query_pairs()))
    }

    fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut code = None;
        let mut user = None;
        let mut wallet_hint = None;

        for (key, value) in pairs {
            let slot = match key.as_ref() {
                QUERY_CODE => &mut code,
                QUERY_USER => &mut user,
                QUERY_WALLET => &mut wallet_hint,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }

        Self {
            code: code.unwrap_or_default(),
            user: user.unwrap_or_default(),
            wallet_hint: wallet_hint.unwrap_or_default(),
        }
    }

    /// Value of a template field.
    #[must_use]
    pub fn field(&self, field: TemplateField) -> &str {
        match field {
            TemplateField::Code => &self.code,
            TemplateField::User => &self.user,
            TemplateField::WalletHint => &self.wallet_hint,
        }
    }
}

/// A field that may be embedded in the challenge line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateField {
    /// The verification code.
    Code,
    /// The external user identifier.
    User,
    /// The expected wallet address.
    WalletHint,
}

impl TemplateField {
    /// All fields in rendering order.
    pub const ALL: [Self; 3] = [Self::Code, Self::User, Self::WalletHint];

    /// Label printed before the value in the challenge line.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Code => "Code",
            Self::User => "User",
            Self::WalletHint => "Wallet",
        }
    }

    /// Configuration name of the field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::User => "user",
            Self::WalletHint => "wallet_hint",
        }
    }
}

/// Deployment-specific challenge wording.
///
/// Fields are always rendered in [`TemplateField::ALL`] order, whatever order
/// they are configured in. A configured field is rendered even when its value
/// is empty, so the verifier never has to guess whether a segment exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeTemplate {
    /// Name of the verifying service.
    pub service_name: String,
    /// Fields embedded in the quoted line.
    pub fields: Vec<TemplateField>,
}

impl Default for ChallengeTemplate {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
            fields: vec![TemplateField::Code, TemplateField::User],
        }
    }
}

impl ChallengeTemplate {
    /// Create a template for the given service embedding only the code.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            fields: vec![TemplateField::Code],
        }
    }

    /// Replace the embedded fields.
    #[must_use]
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = TemplateField>) -> Self {
        self.fields = fields.into_iter().collect();
        self
    }

    /// Check that the template can produce a usable challenge.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        if self.service_name.contains(['\n', '\r', '"']) {
            return Err(ConfigError::invalid(
                "template service name must not contain quotes or line breaks",
            ));
        }
        if !self.fields.contains(&TemplateField::Code) {
            return Err(ConfigError::MissingCodeField);
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].contains(field) {
                return Err(ConfigError::DuplicateField(field.as_str().to_owned()));
            }
        }
        Ok(())
    }

    /// Render the challenge for `params`.
    #[must_use]
    pub fn render(&self, params: &IdentityParameters) -> Challenge {
        let service = &self.service_name;
        let mut text = format!("Sign this message to verify for {service}:\n\"Verify {service}");
        for field in TemplateField::ALL {
            if self.fields.contains(&field) {
                text.push_str(" | ");
                text.push_str(field.label());
                text.push_str(": ");
                text.push_str(params.field(field));
            }
        }
        text.push('"');
        Challenge(text)
    }
}

/// The exact text handed to the wallet for signing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Challenge(String);

impl Challenge {
    /// Build a challenge with the given template.
    #[must_use]
    pub fn build(template: &ChallengeTemplate, params: &IdentityParameters) -> Self {
        template.render(params)
    }

    /// The challenge text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The challenge bytes, as signed.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Consume the challenge and return the text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Challenge {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the challenge with the default template.
#[must_use]
pub fn build_challenge(params: &IdentityParameters) -> Challenge {
    ChallengeTemplate::default().render(params)
}
