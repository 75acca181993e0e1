//! Account gating: email confirmation and administrative approval.
//!
//! An account may authenticate once its base activation check passes and it
//! is either confirmed or still inside the confirmation grace period.
//! Approval is tracked alongside and only folded into that decision when the
//! host asks for it (`activation.require_approval`).
//!
//! The gate owns no storage, token source or mail transport. It drives three
//! collaborators: an [`AccountStore`], a [`TokenGenerator`] and a
//! [`Notifier`].

pub mod account;
pub mod activation;
mod approvable;
pub mod clock;
mod confirmable;
pub mod error;
pub mod gate;
pub mod notifier;
pub mod store;
pub mod token;

pub use {
    account::{Account, AccountId, Field, FieldError, FieldErrorKind, FieldErrors, NewAccount},
    activation::{Activation, AlwaysActive, InactiveReason},
    clock::{Clock, ManualClock, SystemClock},
    error::{GateError, GateResult, StoreError},
    gate::{AccountGate, AccountGateBuilder, GateSettings},
    notifier::{LogNotifier, Notification, NotificationKind, Notifier, QueuedNotifier},
    store::{AccountStore, memory::MemoryAccountStore, sqlite::SqliteAccountStore},
    token::{FriendlyTokenGenerator, TokenGenerator},
};
