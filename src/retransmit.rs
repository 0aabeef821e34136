//! Retransmission of Confirmable messages (RFC 7252 §4.2, §4.8).
//!
//! The queue is owned exclusively by the connection's event loop; entries
//! arrive and leave through the loop's channels, so the queue itself needs
//! no synchronization.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::error::ConnectionError;
use crate::message::packet::Packet;

/// Initial acknowledgement timeout (RFC 7252 §4.8).
pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Randomization factor applied to the initial timeout (RFC 7252 §4.8).
pub const ACK_RANDOM_FACTOR: f64 = 1.5;

/// Maximum number of retransmissions of a Confirmable message
/// (RFC 7252 §4.8).
pub const MAX_RETRANSMIT: u32 = 4;

/// Maximum time from the first transmission to the last retransmission:
/// `ACK_TIMEOUT * ((2 ** MAX_RETRANSMIT) - 1) * ACK_RANDOM_FACTOR`
/// (RFC 7252 §4.8.2).
pub const MAX_TRANSMIT_SPAN: Duration = Duration::from_secs(45);

/// Maximum time from the first transmission until the sender gives up on
/// an acknowledgement:
/// `ACK_TIMEOUT * ((2 ** (MAX_RETRANSMIT + 1)) - 1) * ACK_RANDOM_FACTOR`
/// (RFC 7252 §4.8.2).
pub const MAX_TRANSMIT_WAIT: Duration = Duration::from_secs(93);

/// Callback invoked with terminal retransmission errors.
///
/// Called from the connection's event loop; the default handler discards
/// the error.
pub type RetransmitErrorHandler = Arc<dyn Fn(&Packet, ConnectionError) + Send + Sync>;

/// Parameters for reliable transmission of Confirmable messages.
#[derive(Clone)]
pub struct RetransmitOptions {
    pub ack_timeout: Duration,
    pub ack_random_factor: f64,
    pub max_retransmit: u32,
    pub max_transmit_span: Duration,
    pub max_transmit_wait: Duration,
    pub error_handler: RetransmitErrorHandler,
}

impl Default for RetransmitOptions {
    fn default() -> RetransmitOptions {
        RetransmitOptions {
            ack_timeout: ACK_TIMEOUT,
            ack_random_factor: ACK_RANDOM_FACTOR,
            max_retransmit: MAX_RETRANSMIT,
            max_transmit_span: MAX_TRANSMIT_SPAN,
            max_transmit_wait: MAX_TRANSMIT_WAIT,
            error_handler: Arc::new(|_, _| {}),
        }
    }
}

impl fmt::Debug for RetransmitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetransmitOptions")
            .field("ack_timeout", &self.ack_timeout)
            .field("ack_random_factor", &self.ack_random_factor)
            .field("max_retransmit", &self.max_retransmit)
            .field("max_transmit_span", &self.max_transmit_span)
            .field("max_transmit_wait", &self.max_transmit_wait)
            .finish_non_exhaustive()
    }
}

impl RetransmitOptions {
    /// Initial per-exchange timeout:
    /// `ack_timeout + U(0, ack_timeout * ack_random_factor)`.
    ///
    /// A non-positive factor disables the jitter, giving a deterministic
    /// schedule.
    pub fn initial_timeout(&self) -> Duration {
        let bound = self.ack_timeout.as_secs_f64() * self.ack_random_factor;
        if bound <= 0.0 {
            return self.ack_timeout;
        }

        let jitter = rand::thread_rng().gen_range(0.0..bound);
        self.ack_timeout + Duration::from_secs_f64(jitter)
    }
}

/// A Confirmable message awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct TransmitEntry {
    pub message: Packet,
    pub peer: SocketAddr,
    /// Time of the first transmission.
    pub start: Instant,
    /// Current backoff timeout; doubles on every retransmission.
    pub timeout: Duration,
    /// Number of retransmissions performed so far.
    pub retransmits: u32,
    /// Time of the next retransmission.
    pub next: Instant,
}

impl TransmitEntry {
    /// Creates an entry for a message first transmitted `now` with the
    /// given initial timeout.
    pub fn new(message: Packet, peer: SocketAddr, now: Instant, timeout: Duration) -> TransmitEntry {
        TransmitEntry {
            message,
            peer,
            start: now,
            timeout,
            retransmits: 0,
            next: now + timeout,
        }
    }
}

/// Timer-ordered collection of in-flight Confirmable messages.
pub struct RetransmitQueue {
    opts: RetransmitOptions,
    data: Vec<TransmitEntry>,
}

impl RetransmitQueue {
    pub fn new(opts: RetransmitOptions) -> RetransmitQueue {
        RetransmitQueue {
            opts,
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends an in-flight entry.
    pub fn add(&mut self, entry: TransmitEntry) {
        self.data.push(entry);
    }

    /// Removes the first entry with the given message id.
    ///
    /// Returns `None` when no entry matches; a redundant ACK is not an
    /// error.
    pub fn remove(&mut self, id: u16) -> Option<TransmitEntry> {
        let i = self
            .data
            .iter()
            .position(|entry| entry.message.header.message_id == id)?;

        Some(self.data.remove(i))
    }

    /// Drains the queue, reporting every entry to the error handler with
    /// [`ConnectionError::Closed`].
    pub fn close(&mut self) {
        for entry in self.data.drain(..) {
            (*self.opts.error_handler)(&entry.message, ConnectionError::Closed);
        }
    }

    /// Single sweep over the queue at time `now`.
    ///
    /// Entries past their per-entry limits are dropped and reported to the
    /// error handler; due entries double their timeout, bump their
    /// retransmission count and are collected into `due` for the caller to
    /// transmit. Entries past `max_transmit_span` back off no further but
    /// stay queued until an ACK arrives or `max_transmit_wait` expires.
    pub fn retransmit(&mut self, now: Instant, due: &mut Vec<TransmitEntry>) {
        due.clear();

        let handler = self.opts.error_handler.clone();
        let mut kept = 0;
        for i in 0..self.data.len() {
            let entry = &mut self.data[i];

            let keep = if entry.next > now {
                true
            } else if entry.retransmits == self.opts.max_retransmit {
                (*handler)(
                    &entry.message,
                    ConnectionError::RetransmitRetryLimit {
                        retransmits: entry.retransmits,
                        max: self.opts.max_retransmit,
                    },
                );
                false
            } else if entry.start + self.opts.max_transmit_wait < now {
                (*handler)(
                    &entry.message,
                    ConnectionError::RetransmitWaitLimit {
                        wait: self.opts.max_transmit_wait,
                    },
                );
                false
            } else if entry.start + self.opts.max_transmit_span < now {
                // no further backoff; advance the deadline without sending
                // so sweep wakeups stay bounded while the wait budget runs
                entry.next = now + entry.timeout;
                true
            } else {
                entry.timeout *= 2;
                entry.retransmits += 1;
                entry.next = now + entry.timeout;
                due.push(entry.clone());
                true
            };

            if keep {
                self.data.swap(kept, i);
                kept += 1;
            }
        }

        self.data.truncate(kept);
    }

    /// Time until the earliest pending retransmission, or `ack_timeout`
    /// when the queue is empty.
    pub fn next_deadline(&self, now: Instant) -> Duration {
        self.data
            .iter()
            .map(|entry| entry.next.duration_since(now))
            .min()
            .unwrap_or(self.opts.ack_timeout)
    }
}
