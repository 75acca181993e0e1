use thiserror::Error;

use crate::account::{Account, AccountId, Field, FieldError};

pub type GateResult<T> = Result<T, GateError>;

/// Outcome of a gate operation that did not go through.
///
/// Business rejections carry field errors the caller can render. Store and
/// notifier failures are passed through as they came.
#[derive(Debug, Error)]
pub enum GateError {
    /// A rule was broken on an account the caller holds. The same error has
    /// been attached to that account.
    #[error("{0}")]
    Invalid(FieldError),

    /// A lookup produced no usable account. The record carries its field
    /// errors; it is a fresh placeholder when nothing matched.
    #[error("account rejected: {}", .0.errors)]
    Rejected(Box<Account>),

    #[error("account store: {0:#}")]
    Store(anyhow::Error),

    #[error("notifier: {0:#}")]
    Notify(anyhow::Error),
}

impl GateError {
    /// The record of a rejected lookup, if any.
    pub fn rejected_account(&self) -> Option<&Account> {
        match self {
            Self::Rejected(account) => Some(account),
            _ => None,
        }
    }

    pub fn into_rejected_account(self) -> Option<Account> {
        match self {
            Self::Rejected(account) => Some(*account),
            _ => None,
        }
    }

    /// Field errors behind a business rejection. Empty for infrastructure
    /// failures.
    pub fn field_errors(&self) -> Vec<FieldError> {
        match self {
            Self::Invalid(e) => vec![*e],
            Self::Rejected(account) => account.errors.iter().copied().collect(),
            Self::Store(_) | Self::Notify(_) => Vec::new(),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::Rejected(_))
    }
}

/// Failures raised by the bundled account stores.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("account {id} was modified concurrently (expected lock version {expected})")]
    StaleAccount { id: AccountId, expected: u64 },

    #[error("account {0} does not exist")]
    UnknownAccount(AccountId),

    #[error("{0} is already taken")]
    DuplicateValue(Field),
}
