//! OSC 1.0 content-message codec
//!
//! One OSC message per UDP datagram. Only the three argument types the
//! protocol uses are supported: `i` (int32), `f` (float32), `s` (string).
//!
//! ## Wire Format
//!
//! ```text
//! address    OSC-string  "/patchline/gui/port_added" + NUL, padded to 4
//! type tags  OSC-string  "," followed by one tag per argument
//! arguments  int32/float32 big-endian, strings NUL-terminated padded to 4
//! ```
//!
//! Bundles (`#bundle`) are not part of the protocol and are rejected on
//! decode; every sender emits single content messages.

use bytes::{BufMut, Bytes, BytesMut};

/// Errors during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum OscError {
    #[error("Datagram is not an OSC content message (address must start with '/')")]
    NotAMessage,
    #[error("Missing type tag string")]
    MissingTypeTags,
    #[error("Type tag string must start with ','")]
    MalformedTypeTags,
    #[error("Unsupported type tag '{0}'")]
    UnsupportedType(char),
    #[error("Datagram truncated while reading {0}")]
    Truncated(&'static str),
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}

/// A single typed argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
}

impl OscArg {
    /// The OSC type tag character for this argument.
    pub fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Str(v.to_string())
    }
}

impl From<String> for OscArg {
    fn from(v: String) -> Self {
        OscArg::Str(v)
    }
}

/// A parsed OSC content message.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub path: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// Create a message with no arguments.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    /// Create a message with the given arguments.
    pub fn with_args(path: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }

    /// The type tag string for this message, e.g. `",ssi"`.
    pub fn type_tags(&self) -> String {
        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        for arg in &self.args {
            tags.push(arg.tag());
        }
        tags
    }

    /// Check the argument signature against an expected tag sequence
    /// (without the leading comma), e.g. `msg.has_signature("ssi")`.
    pub fn has_signature(&self, tags: &str) -> bool {
        self.args.len() == tags.len()
            && self.args.iter().zip(tags.chars()).all(|(a, t)| a.tag() == t)
    }

    /// Get argument `idx` as an int32.
    pub fn int(&self, idx: usize) -> Option<i32> {
        match self.args.get(idx) {
            Some(OscArg::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get argument `idx` as a float32.
    pub fn float(&self, idx: usize) -> Option<f32> {
        match self.args.get(idx) {
            Some(OscArg::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get argument `idx` as a string slice.
    pub fn string(&self, idx: usize) -> Option<&str> {
        match self.args.get(idx) {
            Some(OscArg::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Serialize to a single datagram payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);

        put_padded_str(&mut buf, &self.path);
        put_padded_str(&mut buf, &self.type_tags());

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => buf.put_i32(*v),
                OscArg::Float(v) => buf.put_f32(*v),
                OscArg::Str(v) => put_padded_str(&mut buf, v),
            }
        }

        buf.freeze()
    }

    /// Parse a datagram payload into a message.
    pub fn decode(data: &[u8]) -> Result<Self, OscError> {
        let mut cursor = 0usize;

        let path = read_padded_str(data, &mut cursor, "address")?;
        if !path.starts_with('/') {
            return Err(OscError::NotAMessage);
        }

        // A bare address with no tag string means "no arguments" for some
        // legacy senders; accept it rather than failing the datagram.
        if cursor >= data.len() {
            return Ok(Self::new(path));
        }

        let tags = read_padded_str(data, &mut cursor, "type tags")?;
        let Some(tags) = tags.strip_prefix(',') else {
            return Err(OscError::MalformedTypeTags);
        };

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            match tag {
                'i' => {
                    let v = read_i32(data, &mut cursor)?;
                    args.push(OscArg::Int(v));
                }
                'f' => {
                    let v = read_i32(data, &mut cursor)?;
                    args.push(OscArg::Float(f32::from_bits(v as u32)));
                }
                's' => {
                    let v = read_padded_str(data, &mut cursor, "string argument")?;
                    args.push(OscArg::Str(v));
                }
                other => return Err(OscError::UnsupportedType(other)),
            }
        }

        Ok(Self { path, args })
    }
}

/// Write an OSC-string: bytes, NUL terminator, padded to a 4-byte boundary.
fn put_padded_str(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    let padding = 4 - (s.len() % 4);
    buf.put_bytes(0, padding);
}

/// Read an OSC-string and advance the cursor past its padding.
fn read_padded_str(
    data: &[u8],
    cursor: &mut usize,
    what: &'static str,
) -> Result<String, OscError> {
    let rest = data.get(*cursor..).ok_or(OscError::Truncated(what))?;
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(OscError::Truncated(what))?;

    let s = std::str::from_utf8(&rest[..end])
        .map_err(|_| OscError::InvalidUtf8(what))?
        .to_string();

    // Consume the string, its terminator, and the padding
    let advance = (end / 4 + 1) * 4;
    if *cursor + advance > data.len() {
        return Err(OscError::Truncated(what));
    }
    *cursor += advance;

    Ok(s)
}

/// Read a big-endian 32-bit word and advance the cursor.
fn read_i32(data: &[u8], cursor: &mut usize) -> Result<i32, OscError> {
    let bytes = data
        .get(*cursor..*cursor + 4)
        .ok_or(OscError::Truncated("int32 argument"))?;
    *cursor += 4;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
