//! Wire protocol shared by the `mq` client and the `mqd` daemon.
//!
//! Each connection carries exactly one request and one response. A request is
//! an argument vector whose elements are terminated by NUL bytes, with the
//! whole frame terminated by a newline. The response is a sequence of tagged
//! frames: zero or more content lines tagged [`MessageType::Out`] or
//! [`MessageType::Err`], followed by a single bare [`MessageType::Ok`] or
//! [`MessageType::Ko`] terminal tag.

mod message;
mod reader;
mod request;

pub use message::{Line, MessageType, Response, Status, Stream};
pub use reader::{Frame, FrameError, FrameReader};
pub use request::{MAX_REQUEST_BYTES, RequestError, decode_request, encode_request, frame_end};
