use {
    async_trait::async_trait,
    serde::Serialize,
    tokio::sync::mpsc,
    tracing::{debug, info},
};

use crate::account::{Account, AccountId};

/// Sends confirmation and approval messages.
///
/// Delivery is fire-and-forget from the gate's side: it neither waits for the
/// message to arrive nor retries. Implementations may queue.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver_confirmation_instructions(&self, account: &Account) -> anyhow::Result<()>;

    async fn deliver_approval_instructions(&self, account: &Account) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ConfirmationInstructions,
    ApprovalInstructions,
}

/// A message waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub account_id: Option<AccountId>,
    /// Address the message goes to.
    pub recipient: String,
    /// Account email the message is about.
    pub email: String,
    pub token: Option<String>,
}

impl Notification {
    pub fn confirmation(account: &Account) -> Self {
        Self {
            kind: NotificationKind::ConfirmationInstructions,
            account_id: account.id,
            recipient: account.email.clone(),
            email: account.email.clone(),
            token: account.confirmation_token.clone(),
        }
    }

    /// Approval requests go to `recipient` when configured, otherwise to the
    /// account itself.
    pub fn approval(account: &Account, recipient: Option<&str>) -> Self {
        Self {
            kind: NotificationKind::ApprovalInstructions,
            account_id: account.id,
            recipient: recipient.unwrap_or(&account.email).to_string(),
            email: account.email.clone(),
            token: account.approval_token.clone(),
        }
    }
}

// ── Log notifier ─────────────────────────────────────────────────────────────

/// Records each dispatch as a tracing event and nothing else.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    approval_recipient: Option<String>,
}

impl LogNotifier {
    pub fn new(approval_recipient: Option<String>) -> Self {
        Self { approval_recipient }
    }

    fn log(&self, n: &Notification) {
        info!(
            kind = ?n.kind,
            account_id = ?n.account_id,
            recipient = %n.recipient,
            has_token = n.token.is_some(),
            "notification dispatched"
        );
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver_confirmation_instructions(&self, account: &Account) -> anyhow::Result<()> {
        self.log(&Notification::confirmation(account));
        Ok(())
    }

    async fn deliver_approval_instructions(&self, account: &Account) -> anyhow::Result<()> {
        self.log(&Notification::approval(
            account,
            self.approval_recipient.as_deref(),
        ));
        Ok(())
    }
}

// ── Queued notifier ──────────────────────────────────────────────────────────

/// Hands notifications to a background consumer over an unbounded channel.
#[derive(Debug, Clone)]
pub struct QueuedNotifier {
    tx: mpsc::UnboundedSender<Notification>,
    approval_recipient: Option<String>,
}

impl QueuedNotifier {
    /// Create the notifier and the receiving end the mail worker drains.
    pub fn new(approval_recipient: Option<String>) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                approval_recipient,
            },
            rx,
        )
    }

    fn enqueue(&self, notification: Notification) -> anyhow::Result<()> {
        debug!(kind = ?notification.kind, account_id = ?notification.account_id, "queueing notification");
        self.tx
            .send(notification)
            .map_err(|_| anyhow::anyhow!("notification queue is closed"))
    }
}

#[async_trait]
impl Notifier for QueuedNotifier {
    async fn deliver_confirmation_instructions(&self, account: &Account) -> anyhow::Result<()> {
        self.enqueue(Notification::confirmation(account))
    }

    async fn deliver_approval_instructions(&self, account: &Account) -> anyhow::Result<()> {
        self.enqueue(Notification::approval(
            account,
            self.approval_recipient.as_deref(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: Some(AccountId(4)),
            email: "user@example.com".into(),
            confirmation_token: Some("conf".into()),
            approval_token: Some("appr".into()),
            ..Account::default()
        }
    }

    #[tokio::test]
    async fn approval_goes_to_configured_recipient() {
        let (notifier, mut rx) = QueuedNotifier::new(Some("admin@example.com".into()));
        notifier
            .deliver_approval_instructions(&account())
            .await
            .unwrap();

        let n = rx.recv().await.unwrap();
        assert_eq!(n.kind, NotificationKind::ApprovalInstructions);
        assert_eq!(n.recipient, "admin@example.com");
        assert_eq!(n.email, "user@example.com");
        assert_eq!(n.token.as_deref(), Some("appr"));
    }

    #[tokio::test]
    async fn approval_defaults_to_account_email() {
        let (notifier, mut rx) = QueuedNotifier::new(None);
        notifier
            .deliver_approval_instructions(&account())
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().recipient, "user@example.com");
    }

    #[tokio::test]
    async fn confirmation_ignores_approval_recipient() {
        let (notifier, mut rx) = QueuedNotifier::new(Some("admin@example.com".into()));
        notifier
            .deliver_confirmation_instructions(&account())
            .await
            .unwrap();

        let n = rx.recv().await.unwrap();
        assert_eq!(n.kind, NotificationKind::ConfirmationInstructions);
        assert_eq!(n.recipient, "user@example.com");
        assert_eq!(n.token.as_deref(), Some("conf"));
    }

    #[tokio::test]
    async fn closed_queue_is_an_error() {
        let (notifier, rx) = QueuedNotifier::new(None);
        drop(rx);
        assert!(
            notifier
                .deliver_confirmation_instructions(&account())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        let notifier = LogNotifier::new(Some("admin@example.com".into()));
        notifier
            .deliver_confirmation_instructions(&account())
            .await
            .unwrap();
        notifier
            .deliver_approval_instructions(&account())
            .await
            .unwrap();
    }
}
