//! Email confirmation workflow.

use tracing::{debug, info, warn};

use crate::{
    account::{Account, Field, FieldError, FieldErrorKind, normalize_email},
    error::{GateError, GateResult},
    gate::AccountGate,
};

impl AccountGate {
    /// Mark the account confirmed and clear its token.
    ///
    /// A confirmed account gets an `already_confirmed` error on its email and
    /// stays untouched.
    pub async fn confirm(&self, account: &mut Account) -> GateResult<()> {
        self.unless_confirmed(account)?;
        let mut staged = account.clone();
        staged.confirmation_token = None;
        staged.confirmed_at = Some(self.clock.now());
        self.commit(account, staged).await?;
        info!(account_id = ?account.id, "account confirmed");
        Ok(())
    }

    /// Dispatch confirmation instructions, issuing a token first if the
    /// account has none. A newly issued token is persisted before dispatch.
    pub async fn send_confirmation_instructions(&self, account: &mut Account) -> GateResult<()> {
        if account.confirmation_token.is_none() {
            let mut staged = account.clone();
            self.generate_confirmation_token(&mut staged);
            if staged.is_persisted() {
                self.commit(account, staged).await?;
            } else {
                *account = staged;
            }
        }
        self.deliver_confirmation(account).await
    }

    /// Send the instructions again, reusing the current token.
    pub async fn resend_confirmation_token(&self, account: &mut Account) -> GateResult<()> {
        self.unless_confirmed(account)?;
        self.send_confirmation_instructions(account).await
    }

    /// Whether the account's last confirmation token was sent no longer than
    /// `confirm_within` ago. Always false with a zero window.
    ///
    /// With a one day window, a token sent today is within the period; with
    /// five days, one sent four days ago is too, one sent five days and a
    /// second ago is not.
    pub fn is_within_confirmation_period(&self, account: &Account) -> bool {
        let window = self.settings.confirm_within;
        if window.is_zero() {
            return false;
        }
        let Some(sent_at) = account.confirmation_sent_at else {
            return false;
        };
        match (self.clock.now() - sent_at).to_std() {
            Ok(elapsed) => elapsed <= window,
            // Sent "in the future": clock skew between writers.
            Err(_) => true,
        }
    }

    /// Issue a fresh confirmation token. The account becomes unconfirmed
    /// until the token is used. Nothing is persisted.
    pub fn generate_confirmation_token(&self, account: &mut Account) {
        account.confirmed_at = None;
        account.confirmation_token = Some(self.tokens.generate_friendly_token());
        account.confirmation_sent_at = Some(self.clock.now());
        debug!(account_id = ?account.id, "confirmation token issued");
    }

    /// Look an account up by email and resend its confirmation instructions.
    ///
    /// Unknown emails come back as [`GateError::Rejected`] with a placeholder
    /// carrying `not_found` on email; already confirmed accounts come back
    /// the same way with `already_confirmed`.
    pub async fn send_confirmation_instructions_by_email(&self, email: &str) -> GateResult<Account> {
        let email = normalize_email(email, self.settings.case_insensitive_email);
        let mut account = self
            .store
            .find_or_initialize_with_error(Field::Email, &email, FieldErrorKind::NotFound)
            .await
            .map_err(GateError::Store)?;

        if account.is_new_record() {
            warn!(errors = %account.errors, "confirmation resend for unknown email");
            return Err(GateError::Rejected(Box::new(account)));
        }

        match self.resend_confirmation_token(&mut account).await {
            Ok(()) => Ok(account),
            Err(GateError::Invalid(_)) => Err(GateError::Rejected(Box::new(account))),
            Err(e) => Err(e),
        }
    }

    /// Look an account up by confirmation token and confirm it.
    pub async fn confirm_by_token(&self, token: &str) -> GateResult<Account> {
        let mut account = self
            .store
            .find_or_initialize_with_error(Field::ConfirmationToken, token, FieldErrorKind::NotFound)
            .await
            .map_err(GateError::Store)?;

        if account.is_new_record() {
            warn!(errors = %account.errors, "confirmation with unknown token");
            return Err(GateError::Rejected(Box::new(account)));
        }

        match self.confirm(&mut account).await {
            Ok(()) => Ok(account),
            Err(GateError::Invalid(_)) => Err(GateError::Rejected(Box::new(account))),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn ensure_confirmation_token(&self, account: &mut Account) {
        if account.confirmation_token.is_none() {
            self.generate_confirmation_token(account);
        }
    }

    pub(crate) async fn deliver_confirmation(&self, account: &Account) -> GateResult<()> {
        self.notifier
            .deliver_confirmation_instructions(account)
            .await
            .map_err(GateError::Notify)?;
        debug!(account_id = ?account.id, "confirmation instructions dispatched");
        Ok(())
    }

    fn unless_confirmed(&self, account: &mut Account) -> GateResult<()> {
        if !account.is_confirmed() {
            return Ok(());
        }
        let error = FieldError::new(Field::Email, FieldErrorKind::AlreadyConfirmed);
        account.errors.push(error);
        warn!(account_id = ?account.id, "account already confirmed");
        Err(GateError::Invalid(error))
    }
}
