use std::fmt;

use chrono::{DateTime, Utc};

use crate::account::Account;

/// Why an account may not sign in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InactiveReason {
    Unconfirmed,
    Unapproved,
    /// Reported by the host's base activation check (e.g. "locked").
    Other(String),
}

impl InactiveReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unconfirmed => "unconfirmed",
            Self::Unapproved => "unapproved",
            Self::Other(reason) => reason,
        }
    }
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The host's own activation check (locking, expiry, ...), consulted before
/// the confirmation gate.
pub trait Activation: Send + Sync {
    fn is_active(&self, account: &Account, now: DateTime<Utc>) -> bool;

    fn inactive_reason(&self, account: &Account) -> Option<InactiveReason>;
}

/// Base check for hosts without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysActive;

impl Activation for AlwaysActive {
    fn is_active(&self, _account: &Account, _now: DateTime<Utc>) -> bool {
        true
    }

    fn inactive_reason(&self, _account: &Account) -> Option<InactiveReason> {
        None
    }
}
