use std::{collections::BTreeMap, sync::Arc};

use {async_trait::async_trait, tokio::sync::RwLock};

use super::{AccountStore, stamp};
use crate::{
    account::{Account, AccountId, Field},
    clock::{Clock, SystemClock},
    error::StoreError,
    token::tokens_match,
};

/// Process-local store, mainly for tests and embedding.
pub struct MemoryAccountStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    rows: BTreeMap<AccountId, Account>,
}

impl Inner {
    fn conflict(&self, account: &Account) -> Option<Field> {
        let others = self.rows.values().filter(|row| row.id != account.id);
        for row in others {
            if row.email == account.email {
                return Some(Field::Email);
            }
            for field in [Field::ConfirmationToken, Field::ApprovalToken] {
                if account.field(field).is_some() && row.field(field) == account.field(field) {
                    return Some(field);
                }
            }
        }
        None
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `created_at`/`updated_at` from `clock`; pass the gate's clock so
    /// both agree.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::default(),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.rows.is_empty()
    }

    pub async fn get(&self, id: AccountId) -> Option<Account> {
        self.inner.read().await.rows.get(&id).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_field(&self, field: Field, value: &str) -> anyhow::Result<Option<Account>> {
        let inner = self.inner.read().await;
        let found = inner.rows.values().find(|row| match field {
            Field::Email => row.email == value,
            Field::ConfirmationToken | Field::ApprovalToken => row
                .field(field)
                .is_some_and(|stored| tokens_match(value, stored)),
        });
        Ok(found.cloned())
    }

    async fn save(&self, account: &mut Account, validate: bool) -> anyhow::Result<bool> {
        let mut inner = self.inner.write().await;

        if let Some(id) = account.id {
            let stored = inner
                .rows
                .get(&id)
                .ok_or(StoreError::UnknownAccount(id))?;
            if stored.lock_version != account.lock_version {
                return Err(StoreError::StaleAccount {
                    id,
                    expected: account.lock_version,
                }
                .into());
            }
        }

        if validate && !account.validate() {
            return Ok(false);
        }
        if let Some(field) = inner.conflict(account) {
            return Err(StoreError::DuplicateValue(field).into());
        }

        let mut row = account.clone();
        stamp(&mut row, self.clock.now());
        let id = match row.id {
            Some(id) => {
                row.lock_version += 1;
                id
            },
            None => {
                inner.last_id += 1;
                AccountId(inner.last_id)
            },
        };
        row.id = Some(id);
        row.errors.clear();
        row.skip_confirmation = false;

        account.id = row.id;
        account.lock_version = row.lock_version;
        account.created_at = row.created_at;
        account.updated_at = row.updated_at;
        inner.rows.insert(id, row);
        Ok(true)
    }
}
