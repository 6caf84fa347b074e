//! Request/response transactions
//!
//! One transaction is: drop stale input, write the request line, gather the
//! reply under a deadline, decode it. The protocol has no request IDs, so only
//! one transaction may be in flight; `&mut` access to the transport enforces
//! that. Nothing here retries.

use std::time::Duration;

use super::decoder::{self, DecodedResponse};
use super::frame::{FrameAccumulator, FrameOutcome};
use super::{Command, ProtocolError, Transport};

/// Cumulative traffic seen by a runner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCounters {
    /// Request bytes written
    pub tx_bytes: u64,
    /// Reply bytes received
    pub rx_bytes: u64,
    /// Requests written
    pub tx_packets: u64,
    /// Replies received
    pub rx_packets: u64,
}

/// Runs single request/response cycles against a transport
#[derive(Debug, Clone, Default)]
pub struct TransactionRunner {
    accumulator: FrameAccumulator,
    counters: TrafficCounters,
}

impl TransactionRunner {
    /// Create a runner polling at `poll_interval`
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            accumulator: FrameAccumulator::new(poll_interval),
            counters: TrafficCounters::default(),
        }
    }

    /// Cumulative tx/rx counters
    pub fn counters(&self) -> TrafficCounters {
        self.counters
    }

    /// Send `command` and wait up to `timeout` for its reply.
    ///
    /// Every failure, including transport errors, comes back as
    /// [`DecodedResponse::Error`].
    pub fn run<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        command: &Command,
        timeout: Duration,
    ) -> DecodedResponse {
        match self.exchange(transport, command, timeout) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(command = command.name(), error = %e, "transaction failed");
                DecodedResponse::Error(e)
            }
        }
    }

    fn exchange<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        command: &Command,
        timeout: Duration,
    ) -> Result<DecodedResponse, ProtocolError> {
        let line = command.encode()?;

        // Late bytes from an earlier, timed-out command must not leak into this reply
        transport.reset_input_buffer()?;

        tracing::debug!(
            command = command.name(),
            timeout_ms = timeout.as_millis() as u64,
            request = %String::from_utf8_lossy(&line).trim_end(),
            "sending command"
        );
        transport.write(&line)?;
        transport.flush()?;
        self.counters.tx_bytes = self.counters.tx_bytes.saturating_add(line.len() as u64);
        self.counters.tx_packets = self.counters.tx_packets.saturating_add(1);

        let raw = match self.accumulator.accumulate(transport, timeout)? {
            FrameOutcome::NoResponse { .. } => return Err(ProtocolError::Timeout),
            FrameOutcome::Frame(raw) => raw,
        };

        self.counters.rx_bytes = self.counters.rx_bytes.saturating_add(raw.text.len() as u64);
        self.counters.rx_packets = self.counters.rx_packets.saturating_add(1);
        tracing::debug!(
            command = command.name(),
            complete = raw.complete,
            elapsed_ms = raw.elapsed.as_millis() as u64,
            response = %raw.text,
            "reply received"
        );

        Ok(decoder::decode(&raw))
    }
}
