//! Notifier: renders, delivers, queues, and coalesces messages.
//!
//! Delivery is judged against the channel's own lightweight probe, not
//! the main connectivity state — the two can diverge (router down while a
//! previously queued alert still needs eventual delivery, or vice versa).

pub mod queue;

use std::rc::Rc;
use std::time::Duration;

use crate::core::retry::{retry_with_pause, RetryOutcome};
use crate::logger::{EventLogger, NotificationAttempt};
use crate::platform::pal::{Clock, ProbeSpec, Prober, Transport};
use crate::store::{StateStore, KEY_QUEUE};
use queue::{Category, MessageQueue, QueuedMessage};

/// Delivery attempts per message.
const SEND_ATTEMPTS: u32 = 3;
/// Fixed pause between delivery attempts.
const SEND_RETRY_PAUSE: Duration = Duration::from_secs(2);
/// Pause between consecutive sends on flush, against transport
/// throttling.
const FLUSH_PAUSE: Duration = Duration::from_secs(2);

/// Channel probe shape: one small packet, short timeout.
const CHANNEL_PROBE_COUNT: u32 = 1;
const CHANNEL_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const CHANNEL_PROBE_PAYLOAD: u32 = 32;

/// Normalize to the transport character set: ASCII with a small
/// transliteration table. Falls back to the verbatim input when
/// normalization would destroy the body entirely.
#[must_use]
pub fn normalize_for_transport(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    let mut normalized = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            c if c.is_ascii() => normalized.push(c),
            '\u{2018}' | '\u{2019}' => normalized.push('\''),
            '\u{201c}' | '\u{201d}' => normalized.push('"'),
            '\u{2013}' | '\u{2014}' => normalized.push('-'),
            '\u{2026}' => normalized.push_str("..."),
            '\u{a0}' => normalized.push(' '),
            _ => normalized.push('?'),
        }
    }
    let destroyed = normalized
        .chars()
        .all(|c| c == '?' || c.is_ascii_whitespace());
    if destroyed && !text.trim().is_empty() {
        return text.to_string();
    }
    normalized
}

/// Truncate to the transport length limit, on a character boundary.
#[must_use]
pub fn truncate_body(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    text.chars().take(max_len).collect()
}

/// Render a message for the wire: category tag, normalization,
/// truncation. The tag is cosmetic; behavior keys off the enum field.
#[must_use]
pub fn render_message(category: Category, body: &str, max_len: usize) -> String {
    let tagged = format!("[{}] {}", category.label(), body);
    truncate_body(&normalize_for_transport(&tagged), max_len)
}

/// Owns the transport, the channel probe, and the undelivered queue.
pub struct Notifier {
    transport: Box<dyn Transport>,
    channel_prober: Box<dyn Prober>,
    clock: Rc<dyn Clock>,
    logger: Rc<EventLogger>,
    store: Rc<dyn StateStore>,
    queue: MessageQueue,
    probe_address: String,
    max_message_len: usize,
}

impl Notifier {
    /// Build a notifier, reloading any queue scratch a previous run (or
    /// crash) left behind.
    pub fn new(
        transport: Box<dyn Transport>,
        channel_prober: Box<dyn Prober>,
        clock: Rc<dyn Clock>,
        logger: Rc<EventLogger>,
        store: Rc<dyn StateStore>,
        probe_address: String,
        max_message_len: usize,
    ) -> Self {
        let queue = store
            .read(KEY_QUEUE)
            .ok()
            .flatten()
            .and_then(|raw| MessageQueue::from_json(&raw).ok())
            .unwrap_or_default();
        Self {
            transport,
            channel_prober,
            clock,
            logger,
            store,
            queue,
            probe_address,
            max_message_len,
        }
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn channel_available(&self) -> bool {
        let spec = ProbeSpec {
            address: &self.probe_address,
            count: CHANNEL_PROBE_COUNT,
            timeout: CHANNEL_PROBE_TIMEOUT,
            payload_bytes: CHANNEL_PROBE_PAYLOAD,
        };
        self.channel_prober.probe(&spec).reachable
    }

    fn persist_queue(&self) {
        // Best-effort: a failed scratch write only costs crash
        // durability of the queue.
        if let Ok(raw) = self.queue.to_json() {
            let _ = self.store.write(KEY_QUEUE, &raw);
        }
    }

    fn send_with_retry(&self, text: &str) -> RetryOutcome {
        retry_with_pause(
            self.clock.as_ref(),
            SEND_ATTEMPTS,
            SEND_RETRY_PAUSE,
            |_attempt| self.transport.deliver(text),
        )
    }

    fn log_attempt(&self, category: Category, outcome: Option<RetryOutcome>, queued: bool) {
        self.logger.notification(&NotificationAttempt {
            category: category.label().to_string(),
            at: self.clock.now(),
            delivered: outcome.is_some_and(|o| o.succeeded),
            queued,
            attempts: outcome.map_or(0, |o| o.attempts),
        });
    }

    /// Deliver one message, flushing the coalesced queue first when the
    /// channel has a path, queueing the message when it has none.
    /// Returns whether the triggering message itself was delivered.
    pub fn notify(&mut self, category: Category, body: &str) -> bool {
        let now = self.clock.now();
        if !self.channel_available() {
            self.queue.enqueue(QueuedMessage {
                category,
                body: body.to_string(),
                enqueued_at: now,
            });
            self.persist_queue();
            self.log_attempt(category, None, true);
            return false;
        }

        for retained in self.queue.take_flush_batch() {
            let text = render_message(retained.category, &retained.body, self.max_message_len);
            let outcome = self.send_with_retry(&text);
            self.log_attempt(retained.category, Some(outcome), false);
            self.clock.sleep(FLUSH_PAUSE);
        }
        // Cleared even when a flush send failed: queued messages are
        // best-effort.
        self.persist_queue();

        let text = render_message(category, body, self.max_message_len);
        let outcome = self.send_with_retry(&text);
        self.log_attempt(category, Some(outcome), false);
        outcome.succeeded
    }
}
