//! Storage abstraction for gated accounts.

pub mod memory;
pub mod sqlite;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::account::{Account, Field, FieldErrorKind};

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Find one account by a unique field.
    async fn find_by_field(&self, field: Field, value: &str) -> anyhow::Result<Option<Account>>;

    /// Insert or update `account`.
    ///
    /// With `validate` set, an account failing [`Account::validate`] is not
    /// written and `Ok(false)` is returned; its errors say why. On success the
    /// store assigns the id on insert, refreshes timestamps from its clock and
    /// bumps `lock_version`. Writing over a newer version fails with
    /// [`StoreError::StaleAccount`](crate::StoreError::StaleAccount). A failed
    /// write leaves `account` as it was, apart from validation errors.
    async fn save(&self, account: &mut Account, validate: bool) -> anyhow::Result<bool>;

    /// Find by `field`, or return an unsaved placeholder carrying `error` on
    /// that field. A blank `value` yields a `blank` error instead.
    async fn find_or_initialize_with_error(
        &self,
        field: Field,
        value: &str,
        error: FieldErrorKind,
    ) -> anyhow::Result<Account> {
        let blank = value.trim().is_empty();
        if !blank && let Some(account) = self.find_by_field(field, value).await? {
            return Ok(account);
        }

        let mut account = Account::default();
        if blank {
            account.errors.add(field, FieldErrorKind::Blank);
        } else {
            account.set_field(field, value);
            account.errors.add(field, error);
        }
        Ok(account)
    }
}

/// Timestamps for a write that is about to happen. Creation time is only set
/// on records that have never been stored.
pub(crate) fn stamp(account: &mut Account, now: DateTime<Utc>) {
    if account.is_new_record() {
        account.created_at = Some(now);
    }
    account.updated_at = Some(now);
}
