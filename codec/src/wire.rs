//! The wire grammar.
//!
//! A frame is a single line: a JSON array literal (the reference table),
//! optionally prefixed by a resolution discriminator and the target index.
//! Table elements are either an inlined scalar (a bare JSON string or
//! number) or a two-element array `[code, payload]`. References inside
//! payloads are non-negative local slot indices or negative sentinels.
//!
//! Both sides must produce and accept this grammar bit-exactly so that
//! independent implementations interoperate.

use bytes::Bytes;
use graphwire_types::Value;

use crate::error::DecodeError;

/// Sentinel pseudo-index for the unit-absent value.
pub(crate) const SENTINEL_UNDEFINED: i64 = -1;
/// Sentinel pseudo-index for the unit-null value.
pub(crate) const SENTINEL_NULL: i64 = -2;
/// Sentinel pseudo-index for boolean true.
pub(crate) const SENTINEL_TRUE: i64 = -3;
/// Sentinel pseudo-index for boolean false.
pub(crate) const SENTINEL_FALSE: i64 = -4;
/// Sentinel pseudo-index for positive infinity.
pub(crate) const SENTINEL_POS_INFINITY: i64 = -5;
/// Sentinel pseudo-index for negative infinity.
pub(crate) const SENTINEL_NEG_INFINITY: i64 = -6;
/// Sentinel pseudo-index for not-a-number.
pub(crate) const SENTINEL_NAN: i64 = -7;
/// Sentinel pseudo-index for negative zero.
pub(crate) const SENTINEL_NEG_ZERO: i64 = -8;
/// Sentinel pseudo-index for the empty string.
pub(crate) const SENTINEL_EMPTY_STRING: i64 = -9;
/// Sentinel marking an absent sequence position. Valid only inside a
/// sequence payload; not an atom.
pub(crate) const SENTINEL_HOLE: i64 = -10;

/// Type code wrapping a singleton atom that must occupy a table slot (only
/// ever the root slot; children reference atoms by sentinel instead).
pub(crate) const CODE_ATOM: u64 = 0;
/// Type code for an ordered sequence; payload is an array of refs, holes as
/// [`SENTINEL_HOLE`].
pub(crate) const CODE_SEQUENCE: u64 = 1;
/// Type code for a string-keyed record; payload alternates key string and
/// value ref.
pub(crate) const CODE_RECORD: u64 = 2;
/// Type code for a general keyed mapping; payload alternates key ref and
/// value ref.
pub(crate) const CODE_MAP: u64 = 3;
/// Type code for an unordered unique set; payload is an array of refs.
pub(crate) const CODE_SET: u64 = 4;
/// Type code for an arbitrary-precision integer; payload is its decimal
/// string.
pub(crate) const CODE_BIGINT: u64 = 5;
/// Type code for a timestamp; payload is the signed millisecond count.
pub(crate) const CODE_TIMESTAMP: u64 = 6;
/// Type code for a regular expression; payload is `[pattern, flags]`.
pub(crate) const CODE_REGEXP: u64 = 7;
/// Type code for a symbol; payload is the name.
pub(crate) const CODE_SYMBOL: u64 = 8;
/// Type code for a URL; payload is the string form.
pub(crate) const CODE_URL: u64 = 9;
/// Type code for a tagged error; payload is `[kind, message]`.
pub(crate) const CODE_ERROR: u64 = 10;
/// Type code for a custom-tagged record; payload is the tag string followed
/// by field refs.
pub(crate) const CODE_CUSTOM: u64 = 11;
/// Type code for a pending deferred; payload is its global index.
pub(crate) const CODE_PENDING: u64 = 12;

/// Discriminator prefix of a fulfillment frame.
pub(crate) const FULFILL: u8 = b'+';
/// Discriminator prefix of a rejection frame.
pub(crate) const REJECT: u8 = b'-';

/// Header of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameHeader {
    /// The root frame; carries the reference table only.
    Root,
    /// Fulfills the deferred at the given global index.
    Fulfill(u64),
    /// Rejects the deferred at the given global index.
    Reject(u64),
}

/// A parsed frame: header plus raw table elements.
#[derive(Debug)]
pub(crate) struct Frame {
    pub header: FrameHeader,
    pub table: Vec<serde_json::Value>,
}

/// Parses one frame line (without its terminating newline).
pub(crate) fn parse_frame(line: &[u8]) -> Result<Frame, DecodeError> {
    let text =
        std::str::from_utf8(line).map_err(|_| malformed("frame is not valid UTF-8"))?;
    let (header, body) = split_header(text)?;
    let table: serde_json::Value = serde_json::from_str(body)
        .map_err(|error| malformed(format!("invalid table JSON: {error}")))?;
    match table {
        serde_json::Value::Array(elements) => Ok(Frame {
            header,
            table: elements,
        }),
        _ => Err(malformed("reference table is not an array")),
    }
}

fn split_header(text: &str) -> Result<(FrameHeader, &str), DecodeError> {
    match text.as_bytes().first() {
        Some(b'[') => Ok((FrameHeader::Root, text)),
        Some(&discriminator @ (FULFILL | REJECT)) => {
            let rest = &text[1..];
            let colon = rest
                .find(':')
                .ok_or_else(|| malformed("missing `:` after resolution index"))?;
            let index: u64 = rest[..colon]
                .parse()
                .map_err(|_| malformed("invalid resolution index"))?;
            let header = if discriminator == FULFILL {
                FrameHeader::Fulfill(index)
            } else {
                FrameHeader::Reject(index)
            };
            Ok((header, &rest[colon + 1..]))
        }
        _ => Err(malformed("unrecognized frame discriminator")),
    }
}

/// Renders one frame as a newline-terminated line.
pub(crate) fn render_frame(header: FrameHeader, table: &[serde_json::Value]) -> Bytes {
    let mut line = match header {
        FrameHeader::Root => String::new(),
        FrameHeader::Fulfill(index) => format!("{}{}:", FULFILL as char, index),
        FrameHeader::Reject(index) => format!("{}{}:", REJECT as char, index),
    };
    line.push_str(&serde_json::Value::Array(table.to_vec()).to_string());
    line.push('\n');
    Bytes::from(line)
}

/// Builds a `[code, payload]` table element.
pub(crate) fn node(code: u64, payload: serde_json::Value) -> serde_json::Value {
    serde_json::Value::Array(vec![serde_json::Value::from(code), payload])
}

/// Returns the sentinel for a singleton atom, or `None` for any other value.
pub(crate) fn atom_sentinel(value: &Value) -> Option<i64> {
    match value {
        Value::Undefined => Some(SENTINEL_UNDEFINED),
        Value::Null => Some(SENTINEL_NULL),
        Value::Bool(true) => Some(SENTINEL_TRUE),
        Value::Bool(false) => Some(SENTINEL_FALSE),
        Value::Number(number) => {
            if number.is_nan() {
                Some(SENTINEL_NAN)
            } else if *number == f64::INFINITY {
                Some(SENTINEL_POS_INFINITY)
            } else if *number == f64::NEG_INFINITY {
                Some(SENTINEL_NEG_INFINITY)
            } else if number.to_bits() == (-0.0f64).to_bits() {
                Some(SENTINEL_NEG_ZERO)
            } else {
                None
            }
        }
        Value::String(string) if string.is_empty() => Some(SENTINEL_EMPTY_STRING),
        _ => None,
    }
}

/// Returns the atom a sentinel denotes. [`SENTINEL_HOLE`] is not an atom and
/// yields `None`.
pub(crate) fn sentinel_atom(sentinel: i64) -> Option<Value> {
    match sentinel {
        SENTINEL_UNDEFINED => Some(Value::Undefined),
        SENTINEL_NULL => Some(Value::Null),
        SENTINEL_TRUE => Some(Value::Bool(true)),
        SENTINEL_FALSE => Some(Value::Bool(false)),
        SENTINEL_POS_INFINITY => Some(Value::Number(f64::INFINITY)),
        SENTINEL_NEG_INFINITY => Some(Value::Number(f64::NEG_INFINITY)),
        SENTINEL_NAN => Some(Value::Number(f64::NAN)),
        SENTINEL_NEG_ZERO => Some(Value::Number(-0.0)),
        SENTINEL_EMPTY_STRING => Some(Value::String(String::new())),
        _ => None,
    }
}

/// Builds a [`DecodeError::MalformedFrame`].
pub(crate) fn malformed(detail: impl Into<String>) -> DecodeError {
    DecodeError::MalformedFrame(detail.into())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_root_frames() {
        let frame = parse_frame(b"[1.5,\"x\",[12,0]]").expect("should parse");
        assert_eq!(frame.header, FrameHeader::Root);
        assert_eq!(frame.table.len(), 3);
    }

    #[test]
    fn parses_resolution_frames() {
        let frame = parse_frame(b"+7:[42.0]").expect("should parse");
        assert_eq!(frame.header, FrameHeader::Fulfill(7));

        let frame = parse_frame(b"-0:[[10,[\"Oops\",\"bad\"]]]").expect("should parse");
        assert_eq!(frame.header, FrameHeader::Reject(0));
    }

    #[test]
    fn rejects_bad_grammar() {
        assert!(matches!(
            parse_frame(b"nonsense"),
            Err(DecodeError::MalformedFrame(_))
        ));
        assert!(matches!(
            parse_frame(b"+12[1]"),
            Err(DecodeError::MalformedFrame(_))
        ));
        assert!(matches!(
            parse_frame(b"+x:[1]"),
            Err(DecodeError::MalformedFrame(_))
        ));
        assert!(matches!(
            parse_frame(b"{\"a\":1}"),
            Err(DecodeError::MalformedFrame(_))
        ));
        assert!(matches!(
            parse_frame(b"\xff\xfe"),
            Err(DecodeError::MalformedFrame(_))
        ));
    }

    #[test]
    fn atoms_and_sentinels_are_inverse() {
        for sentinel in [
            SENTINEL_UNDEFINED,
            SENTINEL_NULL,
            SENTINEL_TRUE,
            SENTINEL_FALSE,
            SENTINEL_POS_INFINITY,
            SENTINEL_NEG_INFINITY,
            SENTINEL_NAN,
            SENTINEL_NEG_ZERO,
            SENTINEL_EMPTY_STRING,
        ] {
            let atom = sentinel_atom(sentinel).expect("sentinel should denote an atom");
            assert_eq!(atom_sentinel(&atom), Some(sentinel));
        }
        assert!(sentinel_atom(SENTINEL_HOLE).is_none());
        assert!(sentinel_atom(-11).is_none());
        assert!(sentinel_atom(0).is_none());
    }

    proptest! {
        #[test]
        fn frame_headers_roundtrip(index in any::<u64>(), reject in any::<bool>()) {
            let header = if reject {
                FrameHeader::Reject(index)
            } else {
                FrameHeader::Fulfill(index)
            };
            let line = render_frame(header, &[serde_json::Value::from(1.0)]);
            let frame = parse_frame(&line[..line.len() - 1]).expect("should parse");
            prop_assert_eq!(frame.header, header);
        }

        #[test]
        fn inline_numbers_roundtrip(value in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let line = render_frame(FrameHeader::Root, &[serde_json::Value::from(value)]);
            let frame = parse_frame(&line[..line.len() - 1]).expect("should parse");
            let parsed = frame.table[0].as_f64().expect("should be a number");
            prop_assert_eq!(parsed.to_bits(), value.to_bits());
        }
    }
}
