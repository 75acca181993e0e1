use std::fmt;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

// ── Identity ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Field errors ─────────────────────────────────────────────────────────────

/// Account attributes that can carry an error or serve as a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Email,
    ConfirmationToken,
    ApprovalToken,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::ConfirmationToken => "confirmation_token",
            Self::ApprovalToken => "approval_token",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    AlreadyConfirmed,
    NotFound,
    Blank,
    Invalid,
}

impl FieldErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyConfirmed => "already_confirmed",
            Self::NotFound => "not_found",
            Self::Blank => "blank",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldError {
    pub field: Field,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn new(field: Field, kind: FieldErrorKind) -> Self {
        Self { field, kind }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.kind)
    }
}

/// Errors attached to an account instance, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn add(&mut self, field: Field, kind: FieldErrorKind) {
        self.push(FieldError::new(field, kind));
    }

    pub fn push(&mut self, error: FieldError) {
        if !self.0.contains(&error) {
            self.0.push(error);
        }
    }

    pub fn has(&self, field: Field, kind: FieldErrorKind) -> bool {
        self.0.contains(&FieldError::new(field, kind))
    }

    /// Error kinds recorded for one field.
    pub fn on(&self, field: Field) -> impl Iterator<Item = FieldErrorKind> + '_ {
        self.0
            .iter()
            .filter(move |e| e.field == field)
            .map(|e| e.kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

// ── Account ──────────────────────────────────────────────────────────────────

/// The gated account record.
///
/// `errors` and the skip flag are instance state only; stores never persist
/// them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<AccountId>,
    pub email: String,
    pub confirmation_token: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmation_sent_at: Option<DateTime<Utc>>,
    pub approval_token: Option<String>,
    #[serde(default)]
    pub is_approved: bool,
    pub approval_sent_at: Option<DateTime<Utc>>,
    /// Optimistic lock counter, bumped by every successful save.
    #[serde(default)]
    pub lock_version: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub errors: FieldErrors,
    #[serde(skip)]
    pub(crate) skip_confirmation: bool,
}

impl Account {
    /// True until a store has assigned an id.
    pub fn is_new_record(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Persisted and carrying a confirmation timestamp.
    pub fn is_confirmed(&self) -> bool {
        self.is_persisted() && self.confirmed_at.is_some()
    }

    pub fn is_approved(&self) -> bool {
        self.is_approved
    }

    /// Whether confirmation was skipped when this instance was created.
    pub fn confirmation_skipped(&self) -> bool {
        self.skip_confirmation
    }

    /// Current value of a lookup field.
    pub fn field(&self, field: Field) -> Option<&str> {
        match field {
            Field::Email => Some(self.email.as_str()).filter(|e| !e.is_empty()),
            Field::ConfirmationToken => self.confirmation_token.as_deref(),
            Field::ApprovalToken => self.approval_token.as_deref(),
        }
    }

    pub(crate) fn set_field(&mut self, field: Field, value: &str) {
        match field {
            Field::Email => self.email = value.to_string(),
            Field::ConfirmationToken => self.confirmation_token = Some(value.to_string()),
            Field::ApprovalToken => self.approval_token = Some(value.to_string()),
        }
    }

    /// Run record validations, replacing any previous errors.
    pub fn validate(&mut self) -> bool {
        self.errors.clear();
        let email = self.email.trim();
        if email.is_empty() {
            self.errors.add(Field::Email, FieldErrorKind::Blank);
        } else if !is_plausible_email(email) {
            self.errors.add(Field::Email, FieldErrorKind::Invalid);
        }
        self.errors.is_empty()
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        },
        None => false,
    }
}

/// Trim and, when the store is case-insensitive, lowercase an email.
pub fn normalize_email(email: &str, case_insensitive: bool) -> String {
    let email = email.trim();
    if case_insensitive {
        email.to_lowercase()
    } else {
        email.to_string()
    }
}

// ── Creation ─────────────────────────────────────────────────────────────────

/// An account that has not been created yet.
///
/// Skip options can only be chosen here, before the creation hook runs.
///
/// ```
/// use turnstile_gate::NewAccount;
///
/// let seed = NewAccount::new("ops@example.com").skip_confirm_and_approve();
/// assert!(!seed.confirmation_required());
/// assert!(!seed.approval_required());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    email: String,
    skip_confirmation: bool,
    skip_approval: bool,
}

impl NewAccount {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            skip_confirmation: false,
            skip_approval: false,
        }
    }

    /// Create the account already confirmed: no token, no instructions.
    pub fn skip_confirmation(mut self) -> Self {
        self.skip_confirmation = true;
        self
    }

    /// Create the account already approved; the approval hook does not run.
    pub fn skip_approval(mut self) -> Self {
        self.skip_approval = true;
        self
    }

    /// Immediately usable account, e.g. for seeding.
    pub fn skip_confirm_and_approve(self) -> Self {
        self.skip_confirmation().skip_approval()
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn confirmation_required(&self) -> bool {
        !self.skip_confirmation
    }

    pub fn approval_required(&self) -> bool {
        !self.skip_approval
    }

    pub(crate) fn into_account(self, now: DateTime<Utc>, case_insensitive_email: bool) -> Account {
        Account {
            email: normalize_email(&self.email, case_insensitive_email),
            confirmed_at: self.skip_confirmation.then_some(now),
            is_approved: self.skip_approval,
            skip_confirmation: self.skip_confirmation,
            ..Account::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_never_confirmed() {
        let account = Account {
            confirmed_at: Some(Utc::now()),
            ..Account::default()
        };
        assert!(account.is_new_record());
        assert!(!account.is_confirmed());

        let saved = Account {
            id: Some(AccountId(1)),
            ..account
        };
        assert!(saved.is_confirmed());
    }

    #[test]
    fn validation_flags_blank_and_malformed_email() {
        let mut blank = Account::default();
        assert!(!blank.validate());
        assert!(blank.errors.has(Field::Email, FieldErrorKind::Blank));

        let mut malformed = Account {
            email: "nobody".into(),
            ..Account::default()
        };
        assert!(!malformed.validate());
        assert_eq!(
            malformed.errors.on(Field::Email).collect::<Vec<_>>(),
            vec![FieldErrorKind::Invalid]
        );

        let mut ok = Account {
            email: "a@b.test".into(),
            ..Account::default()
        };
        assert!(ok.validate());
    }

    #[test]
    fn validate_replaces_stale_errors() {
        let mut account = Account {
            email: "a@b.test".into(),
            ..Account::default()
        };
        account.errors.add(Field::Email, FieldErrorKind::NotFound);
        assert!(account.validate());
        assert!(account.errors.is_empty());
    }

    #[test]
    fn field_errors_dedupe_and_render() {
        let mut errors = FieldErrors::default();
        errors.add(Field::Email, FieldErrorKind::AlreadyConfirmed);
        errors.add(Field::Email, FieldErrorKind::AlreadyConfirmed);
        errors.add(Field::ConfirmationToken, FieldErrorKind::NotFound);
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.to_string(),
            "email already_confirmed, confirmation_token not_found"
        );
    }

    #[test]
    fn skip_options_shape_the_initial_record() {
        let now = Utc::now();
        let account = NewAccount::new("  Seed@Example.COM ")
            .skip_confirm_and_approve()
            .into_account(now, true);
        assert_eq!(account.email, "seed@example.com");
        assert_eq!(account.confirmed_at, Some(now));
        assert!(account.is_approved);
        assert!(account.confirmation_skipped());

        let plain = NewAccount::new("User@Example.com").into_account(now, false);
        assert_eq!(plain.email, "User@Example.com");
        assert!(plain.confirmed_at.is_none());
        assert!(!plain.is_approved);
    }

    #[test]
    fn transient_state_is_not_serialized() {
        let mut account = Account {
            id: Some(AccountId(7)),
            email: "a@b.test".into(),
            skip_confirmation: true,
            ..Account::default()
        };
        account.errors.add(Field::Email, FieldErrorKind::Invalid);

        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["id"], 7);
        assert!(json.get("errors").is_none());
        assert!(json.get("skip_confirmation").is_none());

        let back: Account = serde_json::from_value(json).unwrap();
        assert!(back.errors.is_empty());
        assert!(!back.confirmation_skipped());
    }
}
