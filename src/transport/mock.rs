//! Scripted transport for driver tests. Captures every write and plays
//! back queued replies; optionally echoes writes (a Modbus write-single
//! response is an exact echo of the request).

use crate::error::{DaqError, Result};
use crate::transport::Transport;
use std::collections::VecDeque;

#[derive(Default)]
pub struct MockTransport {
    replies: VecDeque<Vec<u8>>,
    echo_writes: bool,
    fail_open: bool,
    /// Every frame written by the driver, in order.
    pub writes: Vec<Vec<u8>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one reply; each `read_available` consumes one.
    pub fn queue_reply(&mut self, reply: impl Into<Vec<u8>>) -> &mut Self {
        self.replies.push_back(reply.into());
        self
    }

    /// When the reply queue is empty, answer each read with the most
    /// recent write.
    pub fn echo_writes(&mut self) -> &mut Self {
        self.echo_writes = true;
        self
    }

    pub fn fail_open(&mut self) -> &mut Self {
        self.fail_open = true;
        self
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(DaqError::Connection("mock open failure".to_string()));
        }
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let reply = match self.replies.pop_front() {
            Some(reply) => reply,
            None if self.echo_writes => match self.writes.last() {
                Some(last) => last.clone(),
                None => return Ok(0),
            },
            None => return Ok(0),
        };
        buf.extend_from_slice(&reply);
        Ok(reply.len())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
