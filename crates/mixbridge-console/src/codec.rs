//! Binary wire codec for the console control protocol.
//!
//! Every datagram carries exactly one message: an address, a type-tag string
//! and zero or more typed arguments. All encoding/decoding in this module is
//! pure -- no I/O is performed.
//!
//! # Message layout
//!
//! ```text
//! <address>\0 pad4   e.g. "/rtn/1/mix/fader"
//! ,<tags>\0 pad4     e.g. ",f"  (f = f32, i = i32, s = string, b = blob)
//! <arg 0> <arg 1> ...
//! ```
//!
//! - `f`: 4-byte big-endian IEEE 754 float
//! - `i`: 4-byte big-endian two's-complement integer
//! - `s`: NUL-terminated string padded to a 4-byte boundary
//! - `b`: 4-byte big-endian signed length, bytes, padded to a 4-byte boundary
//!
//! A message without arguments is a query; the console answers with the
//! current value at the same address.

use bytes::{BufMut, BytesMut};

/// First byte of a type-tag string.
pub const TAG_PREFIX: u8 = b',';

/// Bytes skipped for an unrecognized type tag.
const UNKNOWN_TAG_WIDTH: usize = 4;

/// A single typed argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// `f` -- 32-bit float.
    Float(f32),
    /// `i` -- 32-bit signed integer.
    Int(i32),
    /// `s` -- string.
    Str(String),
    /// `b` -- length-prefixed binary blob.
    Blob(Vec<u8>),
}

impl Arg {
    /// The type-tag character for this argument.
    pub fn type_tag(&self) -> char {
        match self {
            Arg::Float(_) => 'f',
            Arg::Int(_) => 'i',
            Arg::Str(_) => 's',
            Arg::Blob(_) => 'b',
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Arg::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Arg::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Arg::Blob(b) => Some(b.as_slice()),
            _ => None,
        }
    }
}

/// A decoded (or to-be-encoded) console message.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    /// Slash-separated address, e.g. `/ch/05/config/name`.
    pub address: String,
    /// Typed arguments in wire order.
    pub args: Vec<Arg>,
}

impl WireMessage {
    /// Create a message with no arguments (a query).
    pub fn new(address: impl Into<String>) -> Self {
        WireMessage {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    /// The comma-prefixed type-tag string, e.g. `",si"`.
    pub fn type_tags(&self) -> String {
        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(TAG_PREFIX as char);
        tags.extend(self.args.iter().map(Arg::type_tag));
        tags
    }

    /// The first argument, if any.
    pub fn first_arg(&self) -> Option<&Arg> {
        self.args.first()
    }

    /// Encode this message into a datagram.
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.address, &self.args)
    }
}

/// Length of a NUL-terminated string of `len` bytes after 4-byte padding.
fn padded_len(len: usize) -> usize {
    (len + 4) & !3
}

fn put_padded_str(buf: &mut BytesMut, s: &[u8]) {
    buf.put_slice(s);
    buf.put_bytes(0, padded_len(s.len()) - s.len());
}

/// Encode an address and argument list into a datagram.
///
/// The type-tag string is derived from the arguments. Strings must not
/// contain interior NUL bytes.
///
/// # Example
///
/// ```
/// use mixbridge_console::codec::{encode, Arg};
///
/// let bytes = encode("/rtn/1/mix/on", &[Arg::Int(0)]);
/// assert_eq!(&bytes[..16], b"/rtn/1/mix/on\0\0\0");
/// assert_eq!(&bytes[16..20], b",i\0\0");
/// assert_eq!(&bytes[20..], &[0, 0, 0, 0]);
/// ```
pub fn encode(address: &str, args: &[Arg]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(padded_len(address.len()) + 8 + args.len() * 4);
    put_padded_str(&mut buf, address.as_bytes());

    let mut tags = Vec::with_capacity(args.len() + 1);
    tags.push(TAG_PREFIX);
    tags.extend(args.iter().map(|a| a.type_tag() as u8));
    put_padded_str(&mut buf, &tags);

    for arg in args {
        match arg {
            Arg::Float(v) => buf.put_f32(*v),
            Arg::Int(v) => buf.put_i32(*v),
            Arg::Str(s) => put_padded_str(&mut buf, s.as_bytes()),
            Arg::Blob(data) => {
                debug_assert!(data.len() <= i32::MAX as usize);
                buf.put_i32(data.len() as i32);
                buf.put_slice(data);
                buf.put_bytes(0, (4 - data.len() % 4) % 4);
            }
        }
    }

    buf.to_vec()
}

/// Bounds-checked cursor over a received datagram.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Read a NUL-terminated, 4-byte padded string.
    ///
    /// Fails if no terminator exists before the end of the buffer. Missing
    /// trailing padding is tolerated.
    fn read_str(&mut self) -> Option<String> {
        let rest = self.buf.get(self.pos..)?;
        let nul = rest.iter().position(|&b| b == 0)?;
        let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos = (self.pos + padded_len(nul)).min(self.buf.len());
        Some(s)
    }

    fn read_word(&mut self) -> Option<[u8; 4]> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        bytes.try_into().ok()
    }

    /// Read a length-prefixed blob.
    ///
    /// The declared length is checked against the remaining bytes before
    /// anything is allocated.
    fn read_blob(&mut self) -> Option<Vec<u8>> {
        let declared = i32::from_be_bytes(self.read_word()?);
        let len = usize::try_from(declared).ok()?;
        if len > self.remaining() {
            tracing::trace!(
                declared = declared,
                remaining = self.remaining(),
                "Blob length exceeds datagram"
            );
            return None;
        }
        let data = self.buf[self.pos..self.pos + len].to_vec();
        self.pos = (self.pos + len.div_ceil(4) * 4).min(self.buf.len());
        Some(data)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        if n > self.remaining() {
            return None;
        }
        self.pos += n;
        Some(())
    }
}

/// Decode a received datagram.
///
/// Returns `None` if no valid address can be read. Otherwise returns the
/// message with every argument that could be parsed safely: a truncated
/// argument, a bad blob length, or a string without terminator stops the
/// decode and the arguments read so far are returned. A datagram without a
/// type-tag string decodes as an address-only message.
///
/// Unknown type characters skip a fixed 4-byte chunk. This function never
/// panics, whatever the input.
pub fn decode(data: &[u8]) -> Option<WireMessage> {
    let mut reader = Reader::new(data);

    let address = reader.read_str()?;
    if !address.starts_with('/') {
        tracing::trace!(address = %address, "Datagram does not start with an address");
        return None;
    }

    let mut message = WireMessage::new(address);

    if reader.peek() != Some(TAG_PREFIX) {
        return Some(message);
    }

    let Some(tags) = reader.read_str() else {
        tracing::trace!(address = %message.address, "Unterminated type-tag string");
        return Some(message);
    };

    for tag in tags.chars().skip(1) {
        let arg = match tag {
            'f' => reader.read_word().map(|w| Arg::Float(f32::from_be_bytes(w))),
            'i' => reader.read_word().map(|w| Arg::Int(i32::from_be_bytes(w))),
            's' => reader.read_str().map(Arg::Str),
            'b' => reader.read_blob().map(Arg::Blob),
            other => {
                tracing::trace!(
                    address = %message.address,
                    tag = %other,
                    "Skipping unknown type tag"
                );
                if reader.skip(UNKNOWN_TAG_WIDTH).is_none() {
                    break;
                }
                continue;
            }
        };

        match arg {
            Some(arg) => message.args.push(arg),
            None => {
                tracing::trace!(
                    address = %message.address,
                    tag = %tag,
                    parsed = message.args.len(),
                    "Truncated or malformed argument, returning partial message"
                );
                break;
            }
        }
    }

    Some(message)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
