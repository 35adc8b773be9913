//! Request framing: NUL-separated arguments terminated by a newline.

use std::string::FromUtf8Error;

use thiserror::Error;

/// Upper bound on the size of a single request frame, terminator included.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

const ARGUMENT_TERMINATOR: u8 = 0;
const FRAME_TERMINATOR: u8 = b'\n';

/// Errors raised while encoding or decoding request frames.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The buffer holds no newline terminator.
    #[error("request is not newline terminated")]
    Unterminated,
    /// The frame exceeds [`MAX_REQUEST_BYTES`].
    #[error("request exceeds {limit} bytes")]
    TooLarge {
        /// Configured upper bound.
        limit: usize,
    },
    /// An argument is not valid UTF-8.
    #[error("argument {index} is not valid UTF-8")]
    InvalidUtf8 {
        /// Zero-based argument index.
        index: usize,
        /// Conversion failure.
        #[source]
        source: FromUtf8Error,
    },
    /// An argument contains a byte reserved by the framing.
    #[error("argument {index} contains a reserved byte {byte:#04x}")]
    ReservedByte {
        /// Zero-based argument index.
        index: usize,
        /// Offending byte.
        byte: u8,
    },
}

/// Returns the offset of the frame terminator, if the buffer holds one.
#[must_use]
pub fn frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|byte| *byte == FRAME_TERMINATOR)
}

/// Encodes an argument vector into a request frame.
///
/// Arguments may not contain NUL or newline bytes, since both delimit the
/// frame.
pub fn encode_request<I, S>(arguments: I) -> Result<Vec<u8>, RequestError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut frame = Vec::new();
    for (index, argument) in arguments.into_iter().enumerate() {
        let bytes = argument.as_ref().as_bytes();
        if let Some(byte) = bytes
            .iter()
            .copied()
            .find(|byte| matches!(*byte, ARGUMENT_TERMINATOR | FRAME_TERMINATOR))
        {
            return Err(RequestError::ReservedByte { index, byte });
        }
        frame.extend_from_slice(bytes);
        frame.push(ARGUMENT_TERMINATOR);
    }
    frame.push(FRAME_TERMINATOR);
    if frame.len() > MAX_REQUEST_BYTES {
        return Err(RequestError::TooLarge {
            limit: MAX_REQUEST_BYTES,
        });
    }
    Ok(frame)
}

/// Decodes a request frame into its argument vector.
///
/// Bytes after the first newline are ignored. A final argument missing its NUL
/// terminator is still accepted.
pub fn decode_request(buffer: &[u8]) -> Result<Vec<String>, RequestError> {
    let end = frame_end(buffer).ok_or(RequestError::Unterminated)?;
    if end >= MAX_REQUEST_BYTES {
        return Err(RequestError::TooLarge {
            limit: MAX_REQUEST_BYTES,
        });
    }
    let (payload, _) = buffer.split_at(end);
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    let mut fields: Vec<&[u8]> = payload.split(|byte| *byte == ARGUMENT_TERMINATOR).collect();
    if fields.last().is_some_and(|field| field.is_empty()) {
        fields.pop();
    }

    fields
        .into_iter()
        .enumerate()
        .map(|(index, field)| {
            String::from_utf8(field.to_vec())
                .map_err(|source| RequestError::InvalidUtf8 { index, source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn encodes_each_argument_with_a_nul() {
        let frame = encode_request(["add", "sleep", "5"]).expect("encode");
        assert_eq!(frame, b"add\0sleep\05\0\n");
    }

    #[rstest]
    #[case::terminated(b"list\0\n".as_slice(), vec!["list"])]
    #[case::unterminated_last(b"mv\x003\x001\n".as_slice(), vec!["mv", "3", "1"])]
    #[case::empty_argument(b"add\0sh\0-c\0\0\n".as_slice(), vec!["add", "sh", "-c", ""])]
    #[case::trailing_garbage(b"ls\0\nignored".as_slice(), vec!["ls"])]
    #[case::empty(b"\n".as_slice(), vec![])]
    fn decodes_argument_vectors(#[case] frame: &[u8], #[case] expected: Vec<&str>) {
        let arguments = decode_request(frame).expect("decode");
        assert_eq!(arguments, expected);
    }

    #[rstest]
    fn rejects_frames_without_newline() {
        let error = decode_request(b"add\0sleep\0").expect_err("must fail");
        assert!(matches!(error, RequestError::Unterminated));
    }

    #[rstest]
    fn rejects_invalid_utf8_arguments() {
        let error = decode_request(b"add\0\xff\0\n").expect_err("must fail");
        assert!(matches!(error, RequestError::InvalidUtf8 { index: 1, .. }));
    }

    #[rstest]
    #[case("a\nb", b'\n')]
    #[case("a\0b", 0)]
    fn rejects_reserved_bytes_when_encoding(#[case] argument: &str, #[case] reserved: u8) {
        let error = encode_request(["add", argument]).expect_err("must fail");
        assert!(matches!(
            error,
            RequestError::ReservedByte { index: 1, byte } if byte == reserved
        ));
    }

    #[rstest]
    fn rejects_oversized_frames() {
        let mut frame = vec![b'x'; MAX_REQUEST_BYTES];
        frame.push(b'\n');
        let error = decode_request(&frame).expect_err("must fail");
        assert!(matches!(error, RequestError::TooLarge { .. }));
    }
}
