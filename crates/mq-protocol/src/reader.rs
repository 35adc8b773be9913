//! Incremental decoding of response frames on the client side.

use std::io::{self, BufRead, BufReader, Read};
use std::string::FromUtf8Error;

use thiserror::Error;

use crate::message::{Line, MessageType, Status, Stream};

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A content line.
    Line(Line),
    /// The terminal status ending the response.
    Status(Status),
}

/// Errors raised while reading response frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Reading from the underlying stream failed.
    #[error("failed to read response frame: {0}")]
    Io(#[from] io::Error),
    /// A tag did not match any known message type.
    #[error("unknown message tag {code:?}")]
    UnknownTag {
        /// Raw tag bytes as received.
        code: [u8; MessageType::WIRE_LEN],
    },
    /// The stream ended inside a frame.
    #[error("connection closed mid-frame")]
    Truncated,
    /// A content line was not valid UTF-8.
    #[error("response line is not valid UTF-8")]
    InvalidUtf8(#[source] FromUtf8Error),
}

/// Reads tagged frames from a byte stream.
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wraps a stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some(tag) = self.read_tag()? else {
            return Ok(None);
        };
        let frame = match tag {
            MessageType::Ok => Frame::Status(Status::Ok),
            MessageType::Ko => Frame::Status(Status::Ko),
            MessageType::Out => Frame::Line(self.read_line(Stream::Out)?),
            MessageType::Err => Frame::Line(self.read_line(Stream::Err)?),
        };
        Ok(Some(frame))
    }

    fn read_tag(&mut self) -> Result<Option<MessageType>, FrameError> {
        let mut bytes = [0_u8; MessageType::WIRE_LEN];
        let mut filled = 0;
        while let Some(unfilled) = bytes.get_mut(filled..).filter(|rest| !rest.is_empty()) {
            match self.inner.read(unfilled) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(FrameError::Truncated),
                Ok(count) => filled += count,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(FrameError::Io(error)),
            }
        }
        MessageType::from_wire(bytes)
            .map(Some)
            .ok_or(FrameError::UnknownTag { code: bytes })
    }

    fn read_line(&mut self, stream: Stream) -> Result<Line, FrameError> {
        let mut buffer = Vec::new();
        self.inner.read_until(b'\n', &mut buffer)?;
        if buffer.pop() != Some(b'\n') {
            return Err(FrameError::Truncated);
        }
        let text = String::from_utf8(buffer).map_err(FrameError::InvalidUtf8)?;
        Ok(Line { stream, text })
    }
}
