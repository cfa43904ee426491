//! Undeliverable-message queue: bounded, chronological, coalescing on
//! flush.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Entries kept beyond this are evicted oldest-first.
pub const QUEUE_CAPACITY: usize = 50;

/// Message category, fixed at construction time. Behavior keys off this
/// field, never off the rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Start,
    Alert,
    Trying,
    Ok,
    Critical,
    Heartbeat,
}

impl Category {
    /// Tag rendered into the message text. Cosmetic only.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Alert => "ALERT",
            Self::Trying => "TRYING",
            Self::Ok => "OK",
            Self::Critical => "CRITICAL",
            Self::Heartbeat => "HEARTBEAT",
        }
    }
}

/// A message awaiting delivery. Owned by the queue until flushed or
/// evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub category: Category,
    pub body: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Bounded FIFO of undelivered messages.
#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: VecDeque<QueuedMessage>,
}

impl MessageQueue {
    /// Append a message, evicting oldest entries beyond capacity so the
    /// retained set is always the most recent ones in original order.
    pub fn enqueue(&mut self, message: QueuedMessage) {
        self.entries.push_back(message);
        while self.entries.len() > QUEUE_CAPACITY {
            self.entries.pop_front();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &VecDeque<QueuedMessage> {
        &self.entries
    }

    /// Drain the queue and return what flush actually delivers: the
    /// latest Alert, then the latest Critical. Start is never re-sent;
    /// Trying and Heartbeat entries are dropped outright. The queue is
    /// cleared unconditionally — queued messages are best-effort.
    pub fn take_flush_batch(&mut self) -> Vec<QueuedMessage> {
        let mut latest_alert = None;
        let mut latest_critical = None;
        for message in self.entries.drain(..) {
            match message.category {
                Category::Alert => latest_alert = Some(message),
                Category::Critical => latest_critical = Some(message),
                Category::Start | Category::Ok | Category::Trying | Category::Heartbeat => {}
            }
        }
        let mut batch = Vec::with_capacity(2);
        if let Some(alert) = latest_alert {
            batch.push(alert);
        }
        if let Some(critical) = latest_critical {
            batch.push(critical);
        }
        batch
    }

    /// Serialize for the scratch file.
    pub fn to_json(&self) -> Result<String> {
        let entries: Vec<&QueuedMessage> = self.entries.iter().collect();
        Ok(serde_json::to_string(&entries)?)
    }

    /// Rebuild from the scratch file, re-applying the capacity bound.
    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: Vec<QueuedMessage> = serde_json::from_str(raw)?;
        let mut queue = Self::default();
        for message in entries {
            queue.enqueue(message);
        }
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, MessageQueue, QueuedMessage, QUEUE_CAPACITY};
    use chrono::Utc;

    fn message(category: Category, body: &str) -> QueuedMessage {
        QueuedMessage {
            category,
            body: body.to_string(),
            enqueued_at: Utc::now(),
        }
    }

    #[test]
    fn eviction_keeps_most_recent_in_order() {
        let mut queue = MessageQueue::default();
        for n in 0..60 {
            queue.enqueue(message(Category::Alert, &format!("m{n}")));
        }
        assert_eq!(queue.len(), QUEUE_CAPACITY);
        let bodies: Vec<_> = queue.entries().iter().map(|m| m.body.clone()).collect();
        assert_eq!(bodies.first().map(String::as_str), Some("m10"));
        assert_eq!(bodies.last().map(String::as_str), Some("m59"));
        // Chronological order preserved.
        for window in bodies.windows(2) {
            let a: u32 = window[0][1..].parse().unwrap();
            let b: u32 = window[1][1..].parse().unwrap();
            assert_eq!(b, a + 1);
        }
    }

    #[test]
    fn flush_batch_coalesces_to_latest_alert_then_critical() {
        let mut queue = MessageQueue::default();
        queue.enqueue(message(Category::Alert, "alert-1"));
        queue.enqueue(message(Category::Trying, "trying-1"));
        queue.enqueue(message(Category::Alert, "alert-2"));
        queue.enqueue(message(Category::Critical, "critical-1"));
        queue.enqueue(message(Category::Heartbeat, "beat-1"));

        let batch = queue.take_flush_batch();
        let bodies: Vec<_> = batch.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["alert-2", "critical-1"]);
        assert!(queue.is_empty(), "flush clears the queue unconditionally");
    }

    #[test]
    fn start_is_never_resent_from_queue() {
        let mut queue = MessageQueue::default();
        queue.enqueue(message(Category::Start, "started"));
        assert!(queue.take_flush_batch().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn scratch_round_trip_preserves_categories() {
        let mut queue = MessageQueue::default();
        queue.enqueue(message(Category::Alert, "a"));
        queue.enqueue(message(Category::Critical, "c"));
        let raw = queue.to_json().unwrap();
        let restored = MessageQueue::from_json(&raw).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.entries()[0].category, Category::Alert);
        assert_eq!(restored.entries()[1].category, Category::Critical);
    }
}
