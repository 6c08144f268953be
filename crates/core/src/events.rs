//! Inbound platform events and the outbound notification seam.
//!
//! The engine consumes one event per point award and emits abstract
//! `Notification`s through an `Arc<dyn Notifier>`. Delivery (email, LINE,
//! push) lives behind the trait.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

// ─── Inbound ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCompleted {
    pub user_id: String,
    pub booking_id: String,
    pub amount_paid: f64,
    #[serde(default)]
    pub restaurant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSubmitted {
    pub user_id: String,
    pub review_id: String,
    #[serde(default)]
    pub restaurant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinOccurred {
    pub user_id: String,
    pub restaurant_id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralConfirmed {
    pub user_id: String,
    pub referred_user_id: String,
}

// ─── Outbound ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    PointsEarned,
    RewardRedeemed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotifyKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: impl Into<String>, kind: NotifyKind, payload: serde_json::Value) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Fire-and-forget notification dispatch. Errors are logged by the caller
/// and never undo the transaction that produced the notification.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Drops every notification.
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _notification: Notification) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Logs notifications through `tracing`; the default in development.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            payload = %notification.payload,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// In-memory notifier that captures notifications for testing.
#[derive(Default)]
pub struct CaptureNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl CaptureNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub fn count_kind(&self, kind: NotifyKind) -> usize {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }
}

impl Notifier for CaptureNotifier {
    fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub fn noop_notifier() -> Arc<dyn Notifier> {
    Arc::new(NoOpNotifier)
}

pub fn capture_notifier() -> Arc<CaptureNotifier> {
    Arc::new(CaptureNotifier::new())
}
