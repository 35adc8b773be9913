//! Response frames written by the daemon.

use std::fmt;

/// Tag identifying the kind of each response frame.
///
/// Tags travel as four-byte little-endian unsigned integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Terminal success code.
    Ok,
    /// Terminal failure code.
    Ko,
    /// Content line destined for standard output.
    Out,
    /// Content line destined for standard error.
    Err,
}

impl MessageType {
    /// Number of bytes occupied by a tag on the wire.
    pub const WIRE_LEN: usize = 4;

    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::Ko => 1,
            Self::Out => 2,
            Self::Err => 3,
        }
    }

    /// Looks up a tag from its numeric wire code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Ko),
            2 => Some(Self::Out),
            3 => Some(Self::Err),
            _ => None,
        }
    }

    /// Encodes the tag as it appears on the wire.
    #[must_use]
    #[expect(
        clippy::little_endian_bytes,
        reason = "tags have a fixed little-endian wire representation"
    )]
    pub const fn to_wire(self) -> [u8; Self::WIRE_LEN] {
        self.code().to_le_bytes()
    }

    /// Decodes a tag from its wire bytes.
    #[must_use]
    #[expect(
        clippy::little_endian_bytes,
        reason = "tags have a fixed little-endian wire representation"
    )]
    pub const fn from_wire(bytes: [u8; Self::WIRE_LEN]) -> Option<Self> {
        Self::from_code(u32::from_le_bytes(bytes))
    }

    /// Whether the tag ends a response.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ok | Self::Ko)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ok => "OK",
            Self::Ko => "KO",
            Self::Out => "OUT",
            Self::Err => "ERR",
        };
        f.write_str(label)
    }
}

/// Output stream a content line is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output.
    Out,
    /// Standard error.
    Err,
}

impl Stream {
    /// Tag used for lines on this stream.
    #[must_use]
    pub const fn message_type(self) -> MessageType {
        match self {
            Self::Out => MessageType::Out,
            Self::Err => MessageType::Err,
        }
    }
}

/// Terminal status of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The request succeeded.
    Ok,
    /// The request failed.
    Ko,
}

impl Status {
    /// Tag used for this status.
    #[must_use]
    pub const fn message_type(self) -> MessageType {
        match self {
            Self::Ok => MessageType::Ok,
            Self::Ko => MessageType::Ko,
        }
    }
}

/// A single content line of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Destination stream.
    pub stream: Stream,
    /// Line text without its trailing newline.
    pub text: String,
}

/// A complete response: content lines followed by a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    lines: Vec<Line>,
    status: Status,
}

impl Response {
    /// Creates an empty successful response.
    #[must_use]
    pub const fn ok() -> Self {
        Self::new(Status::Ok)
    }

    /// Creates an empty failed response.
    #[must_use]
    pub const fn ko() -> Self {
        Self::new(Status::Ko)
    }

    /// Creates an empty response with the given terminal status.
    #[must_use]
    pub const fn new(status: Status) -> Self {
        Self {
            lines: Vec::new(),
            status,
        }
    }

    /// Creates a failed response carrying a single explanatory error line.
    #[must_use]
    pub fn failure(message: impl fmt::Display) -> Self {
        let mut response = Self::ko();
        response.push_err(message.to_string());
        response
    }

    /// Appends text to standard output, one frame per line.
    pub fn push_out(&mut self, text: impl AsRef<str>) {
        self.push(Stream::Out, text.as_ref());
    }

    /// Appends text to standard error, one frame per line.
    pub fn push_err(&mut self, text: impl AsRef<str>) {
        self.push(Stream::Err, text.as_ref());
    }

    fn push(&mut self, stream: Stream, text: &str) {
        if text.is_empty() {
            self.lines.push(Line {
                stream,
                text: String::new(),
            });
            return;
        }
        self.lines.extend(text.lines().map(|line| Line {
            stream,
            text: line.to_owned(),
        }));
    }

    /// Content lines in emission order.
    #[must_use]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Terminal status.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Serialises the response into its wire representation.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let payload: usize = self
            .lines
            .iter()
            .map(|line| MessageType::WIRE_LEN + line.text.len() + 1)
            .sum();
        let mut bytes = Vec::with_capacity(payload + MessageType::WIRE_LEN);
        for line in &self.lines {
            bytes.extend_from_slice(&line.stream.message_type().to_wire());
            bytes.extend_from_slice(line.text.as_bytes());
            bytes.push(b'\n');
        }
        bytes.extend_from_slice(&self.status.message_type().to_wire());
        bytes
    }
}
