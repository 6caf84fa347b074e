//! Reply framing
//!
//! Replies carry no length header and no reliable terminator. The firmware
//! pretty-prints JSON and may emit one reply over many small USB writes, so
//! bytes are gathered until the buffer, ignoring trailing whitespace, ends with
//! `}` or the deadline passes.
//!
//! The `}` test cannot tell a complete object from a truncated one that
//! happens to end in `}`. It is the only framing signal the firmware gives.

use chrono::{DateTime, Utc};
use std::thread;
use std::time::{Duration, Instant};

use super::{ProtocolError, Transport, DEFAULT_POLL_INTERVAL_MS};

/// Largest single read taken from the transport
const READ_CHUNK: usize = 1024;

/// Text gathered for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// Everything received, decoded as UTF-8 with invalid sequences replaced
    pub text: String,
    /// Wall clock time the accumulator started waiting
    pub started_at: DateTime<Utc>,
    /// Whether the end-of-message test fired before the deadline
    pub complete: bool,
    /// Time spent waiting
    pub elapsed: Duration,
}

/// Result of one accumulation
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Some bytes arrived, complete or cut off by the deadline
    Frame(RawResponse),
    /// Nothing at all arrived before the deadline
    NoResponse {
        /// Time spent waiting
        elapsed: Duration,
    },
}

/// Gathers reply bytes from a pollable transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAccumulator {
    poll_interval: Duration,
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }
}

impl FrameAccumulator {
    /// Create an accumulator that sleeps `poll_interval` between empty polls
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Sleep between polls that found nothing
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll `transport` until the buffer looks like a complete object or
    /// `timeout` elapses.
    ///
    /// Transport failures are returned as errors; running out of time is not
    /// an error and shows up in the outcome instead.
    pub fn accumulate<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        timeout: Duration,
    ) -> Result<FrameOutcome, ProtocolError> {
        let started_at = Utc::now();
        let start = Instant::now();
        // Too large to represent means wait without a deadline
        let deadline = start.checked_add(timeout);
        let mut buffer: Vec<u8> = Vec::new();
        let mut complete = false;

        loop {
            let available = transport.bytes_available()?;
            if available > 0 {
                let chunk = transport.read(available.min(READ_CHUNK))?;
                tracing::trace!(
                    bytes = chunk.len(),
                    data = %String::from_utf8_lossy(&chunk),
                    "frame chunk"
                );
                buffer.extend_from_slice(&chunk);
                if looks_complete(&buffer) {
                    complete = true;
                    break;
                }
            }

            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                break;
            }
            if available == 0 {
                let wait = deadline.map_or(self.poll_interval, |d| self.poll_interval.min(d - now));
                thread::sleep(wait);
            }
        }

        let elapsed = start.elapsed();
        if buffer.iter().all(u8::is_ascii_whitespace) {
            tracing::debug!(
                bytes = buffer.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "no reply before deadline"
            );
            return Ok(FrameOutcome::NoResponse { elapsed });
        }

        if !complete {
            tracing::debug!(
                bytes = buffer.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "deadline reached with partial reply"
            );
        }

        Ok(FrameOutcome::Frame(RawResponse {
            text: String::from_utf8_lossy(&buffer).into_owned(),
            started_at,
            complete,
            elapsed,
        }))
    }
}

/// End-of-message test: last non-whitespace byte is `}`
fn looks_complete(buffer: &[u8]) -> bool {
    buffer
        .iter()
        .rev()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'}')
}
