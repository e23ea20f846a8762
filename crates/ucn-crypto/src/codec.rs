//! Canonical block encoding.
//!
//! The encoding is the hash pre-image of a block and must be an injective
//! function of `(protocol, previous_hash, data)`:
//!
//! ```text
//! escape(protocol) "/n" escape(previous_hash) "/n" data
//! ```
//!
//! `escape` doubles every `/`. Inside an escaped field a `/` is therefore
//! always followed by `/` (a literal slash) or `n` (the field separator),
//! so the two text fields are recovered by a single left-to-right scan.
//! `data` is last and written raw; it ends at end of input, so payload
//! bytes that look like a separator cannot shift a field boundary.

use ucn_types::BlockRecord;

/// Two-byte field separator.
pub const FIELD_SEPARATOR: &[u8; 2] = b"/n";

const ESCAPE: u8 = b'/';

/// Errors from decoding a canonical encoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("missing field separator after {field}")]
    MissingSeparator { field: &'static str },

    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

/// The three hashed fields of a block, as recovered by [`CanonicalCodec::decode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalFields {
    pub protocol: String,
    pub previous_hash: String,
    pub data: Vec<u8>,
}

/// Deterministic encoder for block hash pre-images.
pub struct CanonicalCodec;

impl CanonicalCodec {
    /// Encode the hashed fields of a block.
    pub fn encode(protocol: &str, previous_hash: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            protocol.len() + previous_hash.len() + data.len() + 2 * FIELD_SEPARATOR.len(),
        );
        push_escaped(&mut out, protocol.as_bytes());
        out.extend_from_slice(FIELD_SEPARATOR);
        push_escaped(&mut out, previous_hash.as_bytes());
        out.extend_from_slice(FIELD_SEPARATOR);
        out.extend_from_slice(data);
        out
    }

    /// Encode the hashed fields of a record. The index is not hashed.
    pub fn encode_record(record: &BlockRecord) -> Vec<u8> {
        Self::encode(&record.protocol, &record.previous_hash, &record.data)
    }

    /// Recover the fields from an encoding produced by [`Self::encode`].
    pub fn decode(bytes: &[u8]) -> Result<CanonicalFields, CodecError> {
        let (protocol, offset) = read_escaped(bytes, 0, "protocol")?;
        let (previous_hash, offset) = read_escaped(bytes, offset, "previous_hash")?;
        Ok(CanonicalFields {
            protocol,
            previous_hash,
            data: bytes[offset..].to_vec(),
        })
    }
}

fn push_escaped(out: &mut Vec<u8>, field: &[u8]) {
    for &b in field {
        if b == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(b);
    }
}

/// Read one escaped field starting at `start`; returns the field and the
/// offset just past its separator.
fn read_escaped(
    bytes: &[u8],
    start: usize,
    field: &'static str,
) -> Result<(String, usize), CodecError> {
    let mut out = Vec::new();
    let mut i = start;
    loop {
        match bytes.get(i) {
            None => return Err(CodecError::MissingSeparator { field }),
            Some(&ESCAPE) => match bytes.get(i + 1) {
                Some(&ESCAPE) => {
                    out.push(ESCAPE);
                    i += 2;
                }
                Some(b'n') => {
                    let text =
                        String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8 { field })?;
                    return Ok((text, i + 2));
                }
                _ => return Err(CodecError::InvalidEscape { offset: i }),
            },
            Some(&b) => {
                out.push(b);
                i += 1;
            }
        }
    }
}
