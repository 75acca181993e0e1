//! Administrative approval workflow.

use tracing::{debug, info, warn};

use crate::{
    account::{Account, Field, FieldErrorKind},
    error::{GateError, GateResult},
    gate::AccountGate,
};

impl AccountGate {
    /// Approve the account and start its confirmation.
    ///
    /// Approving twice is harmless: the second call keeps the pending
    /// confirmation token and only dispatches the instructions again. If the
    /// account has no confirmation token (e.g. it is already confirmed), one is
    /// issued and the account is unconfirmed until it is used.
    pub async fn approve(&self, account: &mut Account) -> GateResult<()> {
        let mut staged = account.clone();
        staged.is_approved = true;
        staged.approval_token = None;
        self.ensure_confirmation_token(&mut staged);
        self.commit(account, staged).await?;
        info!(account_id = ?account.id, "account approved");
        self.deliver_confirmation(account).await
    }

    /// Dispatch approval instructions, issuing a token first if the account
    /// has none. A newly issued token is persisted before dispatch.
    pub async fn send_approval_instructions(&self, account: &mut Account) -> GateResult<()> {
        if account.approval_token.is_none() {
            let mut staged = account.clone();
            self.generate_approval_token(&mut staged);
            if staged.is_persisted() {
                self.commit(account, staged).await?;
            } else {
                *account = staged;
            }
        }
        self.notifier
            .deliver_approval_instructions(account)
            .await
            .map_err(GateError::Notify)?;
        debug!(account_id = ?account.id, "approval instructions dispatched");
        Ok(())
    }

    /// Reset the account to unapproved with a fresh approval token. Runs as
    /// part of [`create`](Self::create) unless approval was skipped.
    pub fn generate_approval_token(&self, account: &mut Account) {
        account.is_approved = false;
        account.approval_token = Some(self.tokens.generate_friendly_token());
        account.approval_sent_at = Some(self.clock.now());
        debug!(account_id = ?account.id, "approval token issued");
    }

    /// Look an account up by approval token and approve it.
    pub async fn approve_by_token(&self, token: &str) -> GateResult<Account> {
        let mut account = self
            .store
            .find_or_initialize_with_error(Field::ApprovalToken, token, FieldErrorKind::NotFound)
            .await
            .map_err(GateError::Store)?;

        if account.is_new_record() {
            warn!(errors = %account.errors, "approval with unknown token");
            return Err(GateError::Rejected(Box::new(account)));
        }

        self.approve(&mut account).await?;
        Ok(account)
    }
}
