//! Config schema types (confirmation, approval, activation, accounts).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnstileConfig {
    pub confirmation: ConfirmationConfig,
    pub approval: ApprovalConfig,
    pub activation: ActivationConfig,
    pub accounts: AccountsConfig,
}

/// Email confirmation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Grace period (seconds) during which an unconfirmed account may still
    /// sign in after its confirmation token was sent. `0` disables it.
    pub confirm_within_secs: u64,

    /// Whether unconfirmed accounts are blocked at all. Defaults to true.
    pub required: bool,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            confirm_within_secs: 0,
            required: true,
        }
    }
}

impl ConfirmationConfig {
    pub fn confirm_within(&self) -> Duration {
        Duration::from_secs(self.confirm_within_secs)
    }
}

/// Administrative approval settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Address that receives approval requests. When unset, the request goes
    /// to the account's own email.
    pub recipient: Option<String>,

    /// Dispatch approval instructions right after an account is created.
    pub notify_on_create: bool,
}

/// How the gates combine into the sign-in decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Treat unapproved accounts as inactive. Off by default: approval is then
    /// only surfaced through `is_approved` and left to the host.
    pub require_approval: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Lowercase emails before storing and looking them up.
    pub case_insensitive_email: bool,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            case_insensitive_email: true,
        }
    }
}
