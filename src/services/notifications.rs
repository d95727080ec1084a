use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::events::EventHub;
use crate::models::expenses::{Expense, ExpenseStatus};
use crate::models::notifications::PushNotification;

pub type NotificationHub = EventHub<PushNotification>;

pub async fn listen(hub: &NotificationHub, mut receiver: mpsc::Receiver<PushNotification>) {
    while let Some(notification) = receiver.recv().await {
        let delivered = hub.publish(&notification);
        log::debug!("Notification delivered to {} subscribers", delivered);
    }
    log::info!("Notification channel closed.");
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b([0-9]{4,})\b").expect("static pattern"))
}

fn id_from(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Looks at `data.gastoId`, then `data.id`, then `data.gastos[0].id`, and
/// finally at the first run of four or more digits in the title and body.
pub fn extract_expense_id(notification: &PushNotification) -> Option<String> {
    let data = &notification.data;

    id_from(data.get("gastoId"))
        .or_else(|| id_from(data.get("id")))
        .or_else(|| id_from(data.pointer("/gastos/0/id")))
        .or_else(|| {
            id_pattern()
                .captures(&notification.text())
                .map(|c| c[1].to_string())
        })
}

pub fn extract_status(notification: &PushNotification) -> Option<ExpenseStatus> {
    let data = &notification.data;
    data.get("status")
        .and_then(Value::as_str)
        .or_else(|| data.get("type").and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(ExpenseStatus::parse)
}

#[derive(Clone, Copy, Debug)]
pub struct HighlightTimings {
    pub highlight: Duration,
    pub navigate_delay: Duration,
}

impl Default for HighlightTimings {
    fn default() -> Self {
        Self {
            highlight: Duration::from_millis(7000),
            navigate_delay: Duration::from_millis(7000),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListAction {
    ScrollTo(usize),
    Reload,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NotificationOutcome {
    pub expense_id: String,
    pub status: Option<ExpenseStatus>,
    pub action: ListAction,
}

struct Highlight {
    expense_id: String,
    until: Instant,
}

struct PendingNavigation {
    expense_id: String,
    due: Instant,
}

/// Time is passed in explicitly; callers drive it with [`poll`] at the
/// instants returned by [`next_deadline`] and after every data load.
///
/// [`poll`]: HighlightCoordinator::poll
/// [`next_deadline`]: HighlightCoordinator::next_deadline
pub struct HighlightCoordinator {
    timings: HighlightTimings,
    highlight: Option<Highlight>,
    pending: Option<PendingNavigation>,
}

impl HighlightCoordinator {
    pub fn new(timings: HighlightTimings) -> Self {
        Self {
            timings,
            highlight: None,
            pending: None,
        }
    }

    pub fn highlighted(&self) -> Option<&str> {
        self.highlight.as_ref().map(|h| h.expense_id.as_str())
    }

    pub fn pending_navigation(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.expense_id.as_str())
    }

    pub fn on_notification(
        &mut self,
        notification: &PushNotification,
        loaded: &[Expense],
        now: Instant,
    ) -> Option<NotificationOutcome> {
        let Some(expense_id) = extract_expense_id(notification) else {
            log::info!("Notification without an expense id, ignoring.");
            return None;
        };
        let status = extract_status(notification);

        self.highlight = Some(Highlight {
            expense_id: expense_id.clone(),
            until: now + self.timings.highlight,
        });
        self.pending = Some(PendingNavigation {
            expense_id: expense_id.clone(),
            due: now + self.timings.navigate_delay,
        });

        let action = match loaded.iter().position(|e| e.id == expense_id) {
            Some(index) => ListAction::ScrollTo(index),
            None => ListAction::Reload,
        };
        log::info!(
            "Notification for expense {} ({:?}): {:?}",
            expense_id,
            status,
            action
        );

        Some(NotificationOutcome {
            expense_id,
            status,
            action,
        })
    }

    pub fn on_data_loaded(&self, loaded: &[Expense]) -> Option<usize> {
        let highlight = self.highlight.as_ref()?;
        loaded.iter().position(|e| e.id == highlight.expense_id)
    }

    /// Advances timers. Returns the expense to open once its navigation is
    /// due and it is present in `loaded`.
    pub fn poll(&mut self, loaded: &[Expense], now: Instant) -> Option<Expense> {
        let mut navigate_to = None;

        if let Some(pending) = &self.pending {
            if now >= pending.due {
                if let Some(expense) = loaded.iter().find(|e| e.id == pending.expense_id) {
                    navigate_to = Some(expense.clone());
                }
            }
        }

        if navigate_to.is_some() {
            self.pending = None;
            self.highlight = None;
        } else if matches!(&self.highlight, Some(h) if now >= h.until) {
            self.highlight = None;
        }

        navigate_to
    }

    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        let highlight = self.highlight.as_ref().map(|h| h.until);
        let pending = self.pending.as_ref().map(|p| p.due);

        [highlight, pending]
            .into_iter()
            .flatten()
            .filter(|deadline| *deadline > now)
            .min()
    }

    pub fn clear(&mut self) {
        self.highlight = None;
        self.pending = None;
    }
}
