use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use turnstile_config::TurnstileConfig;

use crate::{
    account::{Account, NewAccount},
    activation::{Activation, AlwaysActive, InactiveReason},
    clock::{Clock, SystemClock},
    error::{GateError, GateResult},
    notifier::Notifier,
    store::AccountStore,
    token::{FriendlyTokenGenerator, TokenGenerator},
};

// ── Settings ─────────────────────────────────────────────────────────────────

/// Resolved gate settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    /// Grace period after a confirmation token is sent. Zero disables it.
    pub confirm_within: Duration,
    pub confirmation_required: bool,
    pub notify_approval_on_create: bool,
    pub require_approval: bool,
    pub case_insensitive_email: bool,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self::from(&TurnstileConfig::default())
    }
}

impl From<&TurnstileConfig> for GateSettings {
    fn from(cfg: &TurnstileConfig) -> Self {
        Self {
            confirm_within: cfg.confirmation.confirm_within(),
            confirmation_required: cfg.confirmation.required,
            notify_approval_on_create: cfg.approval.notify_on_create,
            require_approval: cfg.activation.require_approval,
            case_insensitive_email: cfg.accounts.case_insensitive_email,
        }
    }
}

// ── Gate ─────────────────────────────────────────────────────────────────────

/// Confirmation and approval workflows over an [`AccountStore`].
///
/// Operations read, change and write one account at a time. The gate takes
/// no locks; concurrent writers are caught by the store's lock version.
pub struct AccountGate {
    pub(crate) store: Arc<dyn AccountStore>,
    pub(crate) tokens: Arc<dyn TokenGenerator>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) activation: Arc<dyn Activation>,
    pub(crate) settings: GateSettings,
}

pub struct AccountGateBuilder {
    store: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    tokens: Option<Arc<dyn TokenGenerator>>,
    clock: Option<Arc<dyn Clock>>,
    activation: Option<Arc<dyn Activation>>,
    settings: GateSettings,
}

impl AccountGateBuilder {
    pub fn tokens(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Base activation check consulted by [`AccountGate::is_active`].
    pub fn activation(mut self, activation: Arc<dyn Activation>) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn config(mut self, config: &TurnstileConfig) -> Self {
        self.settings = GateSettings::from(config);
        self
    }

    pub fn settings(mut self, settings: GateSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> AccountGate {
        AccountGate {
            store: self.store,
            notifier: self.notifier,
            tokens: self
                .tokens
                .unwrap_or_else(|| Arc::new(FriendlyTokenGenerator)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            activation: self.activation.unwrap_or_else(|| Arc::new(AlwaysActive)),
            settings: self.settings,
        }
    }
}

impl AccountGate {
    pub fn builder(store: Arc<dyn AccountStore>, notifier: Arc<dyn Notifier>) -> AccountGateBuilder {
        AccountGateBuilder {
            store,
            notifier,
            tokens: None,
            clock: None,
            activation: None,
            settings: GateSettings::default(),
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    /// Create and persist an account.
    ///
    /// Unless approval was skipped, the account is stored unapproved with a
    /// fresh approval token. An account that fails validation comes back in
    /// [`GateError::Rejected`] with its field errors.
    pub async fn create(&self, new: NewAccount) -> GateResult<Account> {
        let approval_required = new.approval_required();
        let mut account = new.into_account(self.clock.now(), self.settings.case_insensitive_email);

        if approval_required {
            self.generate_approval_token(&mut account);
        }

        if !self.save(&mut account, true).await? {
            warn!(email = %account.email, errors = %account.errors, "account rejected");
            return Err(GateError::Rejected(Box::new(account)));
        }

        info!(
            account_id = ?account.id,
            approved = account.is_approved,
            confirmed = account.is_confirmed(),
            "account created"
        );

        if approval_required && self.settings.notify_approval_on_create {
            self.notifier
                .deliver_approval_instructions(&account)
                .await
                .map_err(GateError::Notify)?;
        }

        Ok(account)
    }

    /// Whether the account may authenticate.
    ///
    /// The host's base check must pass, and the account must be confirmed,
    /// exempt from confirmation, or still inside the grace period. Approval
    /// only counts when `require_approval` is set.
    pub fn is_active(&self, account: &Account) -> bool {
        let confirmation_ok = !self.confirmation_required(account)
            || account.is_confirmed()
            || self.is_within_confirmation_period(account);
        let approval_ok = !self.settings.require_approval || account.is_approved();

        self.activation.is_active(account, self.clock.now()) && confirmation_ok && approval_ok
    }

    /// Reason to show for an inactive account. `unconfirmed` wins whenever the
    /// account is not confirmed; otherwise the base check decides.
    pub fn inactive_reason(&self, account: &Account) -> Option<InactiveReason> {
        if !account.is_confirmed() {
            return Some(InactiveReason::Unconfirmed);
        }
        if self.settings.require_approval && !account.is_approved() {
            return Some(InactiveReason::Unapproved);
        }
        self.activation.inactive_reason(account)
    }

    fn confirmation_required(&self, account: &Account) -> bool {
        self.settings.confirmation_required && !account.confirmation_skipped()
    }

    pub(crate) async fn save(&self, account: &mut Account, validate: bool) -> GateResult<bool> {
        self.store
            .save(account, validate)
            .await
            .map_err(GateError::Store)
    }

    /// Save `staged` without validation and, once the store accepted it, make
    /// it the caller's account. A rejected write leaves `account` untouched.
    pub(crate) async fn commit(
        &self,
        account: &mut Account,
        mut staged: Account,
    ) -> GateResult<()> {
        self.save(&mut staged, false).await?;
        *account = staged;
        Ok(())
    }
}
