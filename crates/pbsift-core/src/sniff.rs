//! Encoding sniffer for captured payloads.
//!
//! Captures arrive either as raw protobuf bytes, as a base64 data URI
//! (browser DevTools "copy as data URI"), or as a hex dump. [`recover`]
//! classifies a payload and returns the underlying bytes; [`recover_file`]
//! applies the two-pass file strategy: read as text and sniff, or else
//! re-read the file as raw binary.

use crate::error::{Error, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::trace;

/// Marker that introduces base64 content in a data URI
pub const BASE64_MARKER: &str = "base64,";

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// A payload as read from disk
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// File contents read as UTF-8 text
    Text(&'a str),
    /// File contents read as raw bytes
    Binary(&'a [u8]),
}

/// The wrapping a payload was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Data URI style `...;base64,<data>`
    Base64,
    /// Hex dump, whitespace ignored
    Hex,
    /// Already binary
    Binary,
}

impl Encoding {
    /// Returns a short lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Base64 => "base64",
            Encoding::Hex => "hex",
            Encoding::Binary => "binary",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes recovered from a file together with the wrapping they came in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    /// The decoded byte buffer
    pub bytes: Vec<u8>,
    /// How the bytes were wrapped on disk
    pub encoding: Encoding,
}

/// Classify a text payload without decoding it.
///
/// The base64 marker takes priority over the hex test.
pub fn sniff(text: &str) -> Option<Encoding> {
    if text.contains(BASE64_MARKER) {
        return Some(Encoding::Base64);
    }
    if is_hex(text) {
        return Some(Encoding::Hex);
    }
    None
}

/// Recover the byte buffer behind a payload.
///
/// Binary payloads are returned unchanged. Text payloads must be a
/// recognized wrapping, otherwise `None` is returned.
pub fn recover(payload: Payload<'_>) -> Option<Vec<u8>> {
    match payload {
        Payload::Binary(bytes) => Some(bytes.to_vec()),
        Payload::Text(text) => match sniff(text)? {
            Encoding::Base64 => from_base64(text),
            Encoding::Hex => from_hex(text),
            Encoding::Binary => None,
        },
    }
}

/// Decode the part of `text` following the first [`BASE64_MARKER`]
pub fn from_base64(text: &str) -> Option<Vec<u8>> {
    let start = text.find(BASE64_MARKER)? + BASE64_MARKER.len();
    let data: String = text[start..]
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    STANDARD_LENIENT
        .decode(&data)
        .or_else(|_| URL_SAFE_LENIENT.decode(&data))
        .map_err(|e| trace!("base64 payload rejected: {}", e))
        .ok()
}

/// Decode a whitespace-tolerant hex dump
pub fn from_hex(text: &str) -> Option<Vec<u8>> {
    if !is_hex(text) {
        return None;
    }
    hex::decode(strip_whitespace(text)).ok()
}

/// True if `text` is a non-empty, even-length run of hex digits once
/// whitespace is removed
pub fn is_hex(text: &str) -> bool {
    let compact = strip_whitespace(text);
    !compact.is_empty()
        && compact.len() % 2 == 0
        && compact.bytes().all(|b| b.is_ascii_hexdigit())
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// First pass: read the file as UTF-8 and sniff its wrapping.
///
/// Returns `Ok(None)` when the file is not UTF-8 or not a recognized
/// wrapping.
pub fn read_text(path: &Path) -> Result<Option<Recovered>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            trace!("{} is not UTF-8 text", path.display());
            return Ok(None);
        }
        Err(e) => return Err(Error::file_read(path, e)),
    };

    let Some(encoding) = sniff(&text) else {
        return Ok(None);
    };

    Ok(recover(Payload::Text(&text)).map(|bytes| Recovered { bytes, encoding }))
}

/// Second pass: read the file as raw bytes.
///
/// An empty file yields nothing usable.
pub fn read_binary(path: &Path) -> Result<Option<Recovered>> {
    let bytes = fs::read(path).map_err(|e| Error::file_read(path, e))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(Recovered {
        bytes,
        encoding: Encoding::Binary,
    }))
}

/// Recover a file's bytes with the text-then-binary strategy
pub fn recover_file(path: &Path) -> Result<Recovered> {
    let recovered = match read_text(path)? {
        Some(recovered) => Some(recovered),
        None => read_binary(path)?,
    };
    recovered.ok_or_else(|| Error::encoding_unrecognized(path))
}
