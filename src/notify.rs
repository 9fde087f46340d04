//! Notification layer: a transient toast and a blocking popup
//!
//! Both channels hold at most one value. Showing a new toast replaces the
//! pending one. Time is passed in explicitly so callers can drive it from
//! `tokio::time::Instant`.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastPhase {
    Visible,
    Leaving,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub id: u64,
    pub notification: Notification,
    shown_at: Instant,
}

/// Auto-dismissing toast channel
#[derive(Debug)]
pub struct ToastSlot {
    current: Option<Toast>,
    hold: Duration,
    exit: Duration,
    next_id: u64,
}

impl ToastSlot {
    pub fn new(hold: Duration, exit: Duration) -> Self {
        Self {
            current: None,
            hold,
            exit,
            next_id: 1,
        }
    }

    pub fn show(&mut self, notification: Notification, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.current = Some(Toast {
            id,
            notification,
            shown_at: now,
        });
        id
    }

    pub fn dismiss(&mut self) {
        self.current = None;
    }

    /// The live toast and its phase, dropping it once the exit animation ends
    pub fn current(&mut self, now: Instant) -> Option<(&Toast, ToastPhase)> {
        let elapsed = match &self.current {
            Some(toast) => now.saturating_duration_since(toast.shown_at),
            None => return None,
        };
        if elapsed >= self.hold + self.exit {
            self.current = None;
            return None;
        }
        let phase = if elapsed >= self.hold {
            ToastPhase::Leaving
        } else {
            ToastPhase::Visible
        };
        self.current.as_ref().map(|t| (t, phase))
    }
}

impl Default for ToastSlot {
    fn default() -> Self {
        Self::new(Duration::from_millis(4000), Duration::from_millis(300))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Popup {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

/// Modal popup channel; stays until dismissed
#[derive(Debug, Default)]
pub struct PopupSlot {
    current: Option<Popup>,
}

impl PopupSlot {
    pub fn show(&mut self, popup: Popup) {
        self.current = Some(popup);
    }

    pub fn dismiss(&mut self) -> Option<Popup> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&Popup> {
        self.current.as_ref()
    }
}
