use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use {
    chrono::{DateTime, TimeDelta, Utc},
    tokio::sync::mpsc,
};

use {
    turnstile_config::TurnstileConfig,
    turnstile_gate::{
        AccountGate, AccountStore, Field, FieldErrorKind, GateError, ManualClock,
        MemoryAccountStore, NewAccount, Notification, NotificationKind, QueuedNotifier,
        SqliteAccountStore, TokenGenerator,
    },
};

struct Counter(AtomicUsize);

impl TokenGenerator for Counter {
    fn generate_friendly_token(&self) -> String {
        format!("t{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

fn created_at() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).unwrap()
}

fn memory_store(clock: Arc<ManualClock>) -> Arc<dyn AccountStore> {
    Arc::new(MemoryAccountStore::with_clock(clock))
}

struct World {
    gate: AccountGate,
    clock: Arc<ManualClock>,
    outbox: mpsc::UnboundedReceiver<Notification>,
}

impl World {
    /// `store` receives the world's clock so record timestamps follow it.
    fn new(
        store: impl FnOnce(Arc<ManualClock>) -> Arc<dyn AccountStore>,
        config: &TurnstileConfig,
    ) -> Self {
        let (notifier, outbox) = QueuedNotifier::new(config.approval.recipient.clone());
        let clock = Arc::new(ManualClock::new(created_at()));
        let store = store(clock.clone());
        let gate = AccountGate::builder(store, Arc::new(notifier))
            .tokens(Arc::new(Counter(AtomicUsize::new(0))))
            .clock(clock.clone())
            .config(config)
            .build();
        Self {
            gate,
            clock,
            outbox,
        }
    }

    fn memory() -> Self {
        Self::new(memory_store, &TurnstileConfig::default())
    }

    fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.outbox.try_recv() {
            out.push(n);
        }
        out
    }
}

#[tokio::test]
async fn new_account_is_unapproved_with_approval_token() {
    let mut world = World::memory();
    let account = world
        .gate
        .create(NewAccount::new("user@example.com"))
        .await
        .unwrap();

    assert!(!account.is_approved());
    assert!(account.approval_token.as_deref().is_some_and(|t| !t.is_empty()));
    assert_eq!(account.approval_sent_at, Some(created_at()));
    assert_eq!(account.created_at, account.approval_sent_at);
    assert_eq!(account.updated_at, Some(created_at()));
    assert!(!account.is_confirmed());
    assert!(world.drain().is_empty());
}

#[tokio::test]
async fn seeded_account_needs_nothing() {
    let mut world = World::memory();
    let account = world
        .gate
        .create(NewAccount::new("seed@example.com").skip_confirm_and_approve())
        .await
        .unwrap();

    assert!(account.is_confirmed());
    assert!(account.is_approved());
    assert!(account.confirmation_token.is_none());
    assert!(account.approval_token.is_none());
    assert!(world.drain().is_empty());
    assert!(world.gate.is_active(&account));
}

#[tokio::test]
async fn unknown_email_yields_not_found_placeholder() {
    let world = World::memory();
    let err = world
        .gate
        .send_confirmation_instructions_by_email("missing@x.com")
        .await
        .unwrap_err();

    let record = err.rejected_account().unwrap();
    assert!(record.is_new_record());
    assert!(record.errors.has(Field::Email, FieldErrorKind::NotFound));
}

#[tokio::test]
async fn generated_token_confirms_by_token() {
    let world = World::memory();
    let mut account = world
        .gate
        .create(NewAccount::new("user@example.com"))
        .await
        .unwrap();
    world.gate.generate_confirmation_token(&mut account);
    world.gate.store().save(&mut account, false).await.unwrap();

    let token = account.confirmation_token.clone().unwrap();
    let confirmed = world.gate.confirm_by_token(&token).await.unwrap();
    assert!(confirmed.is_confirmed());
    assert!(confirmed.confirmation_token.is_none());
}

#[tokio::test]
async fn full_signup_flow() {
    let mut config = TurnstileConfig::default();
    config.approval.recipient = Some("admin@example.com".into());
    config.approval.notify_on_create = true;
    config.confirmation.confirm_within_secs = 24 * 3600;
    let mut world = World::new(memory_store, &config);

    let account = world
        .gate
        .create(NewAccount::new("user@example.com"))
        .await
        .unwrap();
    assert!(!world.gate.is_active(&account));

    let sent = world.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::ApprovalInstructions);
    assert_eq!(sent[0].recipient, "admin@example.com");
    let approval_token = sent[0].token.clone().unwrap();

    world.clock.advance(TimeDelta::hours(2));
    let approved = world.gate.approve_by_token(&approval_token).await.unwrap();
    assert!(approved.is_approved());
    // Inside the grace period that approval just opened.
    assert!(world.gate.is_active(&approved));

    let sent = world.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::ConfirmationInstructions);
    assert_eq!(sent[0].recipient, "user@example.com");
    let confirmation_token = sent[0].token.clone().unwrap();

    world.clock.advance(TimeDelta::hours(25));
    assert!(!world.gate.is_active(&approved));

    let confirmed = world.gate.confirm_by_token(&confirmation_token).await.unwrap();
    assert!(world.gate.is_active(&confirmed));
    assert_eq!(world.gate.inactive_reason(&confirmed), None);
}

#[tokio::test]
async fn sqlite_store_backs_the_gate() {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    SqliteAccountStore::init(&pool).await.unwrap();
    let mut world = World::new(
        |clock| Arc::new(SqliteAccountStore::with_clock(pool, clock)),
        &TurnstileConfig::default(),
    );

    let mut account = world
        .gate
        .create(NewAccount::new("user@example.com"))
        .await
        .unwrap();
    assert_eq!(account.created_at, Some(created_at()));
    world.clock.advance(TimeDelta::minutes(3));
    world.gate.approve(&mut account).await.unwrap();
    assert_eq!(account.updated_at, Some(created_at() + TimeDelta::minutes(3)));

    let token = account.confirmation_token.clone().unwrap();
    let confirmed = world.gate.confirm_by_token(&token).await.unwrap();
    assert!(confirmed.is_confirmed());
    assert!(confirmed.is_approved());
    assert_eq!(world.drain().len(), 1);

    let err = world
        .gate
        .send_confirmation_instructions_by_email("user@example.com")
        .await
        .unwrap_err();
    assert!(
        err.rejected_account()
            .unwrap()
            .errors
            .has(Field::Email, FieldErrorKind::AlreadyConfirmed)
    );
}

#[tokio::test]
async fn racing_confirmations_are_serialized_by_the_store() {
    let world = World::memory();
    let mut account = world
        .gate
        .create(NewAccount::new("user@example.com"))
        .await
        .unwrap();
    world.gate.generate_confirmation_token(&mut account);
    world.gate.store().save(&mut account, false).await.unwrap();

    let mut first = account.clone();
    let mut second = account.clone();
    world.gate.confirm(&mut first).await.unwrap();
    let err = world.gate.confirm(&mut second).await.unwrap_err();

    assert!(matches!(err, GateError::Store(_)));
    assert!(!err.is_rejection());
    assert!(first.is_confirmed());
    assert!(!second.is_confirmed());
    assert_eq!(second.confirmation_token, account.confirmation_token);
}
