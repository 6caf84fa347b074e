//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements [`Transport`] with a scripted device: each
//! request line written to it consumes the next queued [`Reply`]. It records
//! every open, reset and write so tests can assert on ordering and counts.
//!
//! # Example
//!
//! ```
//! use irislink_core::protocol::mock::{MockTransport, Reply};
//!
//! let mut mock = MockTransport::new();
//! // The reply arrives as two separate device writes.
//! mock.push_reply(Reply::chunks(["{\n\t\"results\":", " [\"ok\"]\n}"]));
//! ```

use std::collections::VecDeque;

use super::{ProtocolError, Transport};

/// What the scripted device does in answer to one request
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Send these writes; each becomes visible to one poll
    Chunks(Vec<Vec<u8>>),
    /// Never answer
    Silent,
    /// The link drops: every poll and read fails until the transport is reopened
    Disconnect,
}

impl Reply {
    /// One write holding `text`
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Chunks(vec![text.into().into_bytes()])
    }

    /// Several writes
    pub fn chunks<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reply::Chunks(parts.into_iter().map(|p| p.into().into_bytes()).collect())
    }
}

/// Observable transport call, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(String),
    Reset,
    Write(Vec<u8>),
    Close,
}

/// A scripted [`Transport`] for tests
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: VecDeque<Reply>,
    /// Device writes waiting to be read, oldest first
    incoming: VecDeque<Vec<u8>>,
    open: bool,
    dropped: bool,
    /// Number of upcoming `open()` calls that fail
    failing_opens: usize,
    events: Vec<Event>,
    open_calls: usize,
    reset_calls: usize,
}

impl MockTransport {
    /// Create a closed mock with no scripted replies
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next request
    pub fn push_reply(&mut self, reply: Reply) {
        self.replies.push_back(reply);
    }

    /// Queue several answers
    pub fn with_replies(mut self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.replies.extend(replies);
        self
    }

    /// Make the next `count` calls to `open()` fail
    pub fn fail_next_opens(&mut self, count: usize) {
        self.failing_opens = count;
    }

    /// Deliver bytes now, as if the device wrote them unprompted
    pub fn inject(&mut self, bytes: &[u8]) {
        self.incoming.push_back(bytes.to_vec());
    }

    /// All calls seen so far
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Request lines written, in order
    pub fn written(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Write(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    /// Number of `open()` calls, successful or not
    pub fn open_calls(&self) -> usize {
        self.open_calls
    }

    /// Number of `reset_input_buffer()` calls
    pub fn reset_calls(&self) -> usize {
        self.reset_calls
    }

    /// Replies not yet consumed
    pub fn remaining_replies(&self) -> usize {
        self.replies.len()
    }

    fn ensure_link(&self) -> Result<(), ProtocolError> {
        if !self.open {
            return Err(ProtocolError::NotConnected);
        }
        if self.dropped {
            return Err(ProtocolError::io("read", "device disconnected"));
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn open(&mut self, port: &str, _baud_rate: u32) -> Result<(), ProtocolError> {
        self.open_calls += 1;
        self.events.push(Event::Open(port.to_string()));
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(ProtocolError::io("open", "no such device"));
        }
        self.open = true;
        self.dropped = false;
        self.incoming.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.ensure_link()?;
        self.events.push(Event::Write(data.to_vec()));
        if !data.ends_with(b"\n") {
            return Ok(());
        }
        match self.replies.pop_front() {
            Some(Reply::Chunks(chunks)) => self.incoming.extend(chunks),
            Some(Reply::Disconnect) => self.dropped = true,
            Some(Reply::Silent) | None => {}
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        self.ensure_link()
    }

    fn bytes_available(&mut self) -> Result<usize, ProtocolError> {
        self.ensure_link()?;
        Ok(self.incoming.front().map_or(0, Vec::len))
    }

    fn read(&mut self, max: usize) -> Result<Vec<u8>, ProtocolError> {
        self.ensure_link()?;
        let Some(front) = self.incoming.front_mut() else {
            return Ok(Vec::new());
        };
        if max >= front.len() {
            return Ok(self.incoming.pop_front().unwrap_or_default());
        }
        let rest = front.split_off(max);
        Ok(std::mem::replace(front, rest))
    }

    fn reset_input_buffer(&mut self) -> Result<(), ProtocolError> {
        self.ensure_link()?;
        self.reset_calls += 1;
        self.events.push(Event::Reset);
        self.incoming.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        if self.open {
            self.events.push(Event::Close);
        }
        self.open = false;
        self.incoming.clear();
        Ok(())
    }
}
