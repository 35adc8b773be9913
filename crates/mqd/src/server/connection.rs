//! Per-client state and the queue of responses awaiting write readiness.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;

use mq_protocol::{MAX_REQUEST_BYTES, Response, frame_end};

use crate::registry::OrderedList;

const READ_CHUNK: usize = 4096;

/// Result of draining a readable socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadProgress {
    /// A complete request is buffered.
    Complete,
    /// More bytes are needed.
    Pending,
    /// The peer closed before sending anything.
    Closed,
    /// The request exceeds [`MAX_REQUEST_BYTES`].
    Oversized,
}

/// One accepted client.
#[derive(Debug)]
pub(crate) struct Connection {
    stream: UnixStream,
    buffer: Vec<u8>,
    dispatched: bool,
}

impl Connection {
    pub(crate) const fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            dispatched: false,
        }
    }

    pub(crate) const fn stream(&self) -> &UnixStream {
        &self.stream
    }

    pub(crate) fn request(&self) -> &[u8] {
        &self.buffer
    }

    /// Whether a response has already been queued for this client.
    pub(crate) const fn is_dispatched(&self) -> bool {
        self.dispatched
    }

    pub(crate) fn mark_dispatched(&mut self) {
        self.dispatched = true;
    }

    /// Reads whatever is available without blocking.
    pub(crate) fn fill(&mut self) -> io::Result<ReadProgress> {
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) if self.buffer.is_empty() => return Ok(ReadProgress::Closed),
                // Unterminated input at EOF is handed on and rejected as malformed.
                Ok(0) => return Ok(ReadProgress::Complete),
                Ok(count) => {
                    self.buffer.extend_from_slice(chunk.get(..count).unwrap_or_default());
                    if frame_end(&self.buffer).is_some() {
                        return Ok(ReadProgress::Complete);
                    }
                    if self.buffer.len() >= MAX_REQUEST_BYTES {
                        return Ok(ReadProgress::Oversized);
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadProgress::Pending);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error),
            }
        }
    }
}

/// An encoded response and how much of it has been written.
#[derive(Debug)]
pub(crate) struct OutboundMessage {
    token: u64,
    bytes: Vec<u8>,
    cursor: usize,
}

impl OutboundMessage {
    fn remaining(&self) -> &[u8] {
        self.bytes.get(self.cursor..).unwrap_or_default()
    }

    /// Writes as much as the socket accepts. Returns `true` once every byte
    /// has been sent.
    pub(crate) fn flush(&mut self, mut stream: &UnixStream) -> io::Result<bool> {
        while !self.remaining().is_empty() {
            match stream.write(self.remaining()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => self.cursor += count,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error),
            }
        }
        Ok(true)
    }
}

/// Responses waiting for their socket to become writable, at most one per
/// client.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    messages: OrderedList<OutboundMessage>,
}

impl Outbox {
    /// Queues `response` for the client behind `token`, replacing nothing:
    /// a client that already has a pending message keeps it.
    pub(crate) fn enqueue(&mut self, token: u64, response: &Response) -> bool {
        if self.get_mut(token).is_some() {
            return false;
        }
        self.messages.append(OutboundMessage {
            token,
            bytes: response.encode(),
            cursor: 0,
        });
        true
    }

    pub(crate) fn get_mut(&mut self, token: u64) -> Option<&mut OutboundMessage> {
        self.messages.iter_mut().find(|message| message.token == token)
    }

    pub(crate) fn discard(&mut self, token: u64) -> bool {
        self.messages
            .position(|message| message.token == token)
            .and_then(|position| self.messages.remove(position))
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }
}
