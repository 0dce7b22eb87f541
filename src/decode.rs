//! Decoding of URL-borne values that never fails.
//!
//! Nothing in here fails outward: malformed escapes come back verbatim and
//! unparseable JSON yields the caller's fallback.

use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// How many decode-and-retry rounds JSON parsing attempts by default.
pub const DEFAULT_DECODE_DEPTH: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed percent escape at byte {0}")]
    MalformedEscape(usize),

    #[error("percent-decoded bytes are not valid UTF-8")]
    InvalidUtf8,
}

/// Strict percent-decoding: a `%` must be followed by two hex digits and the
/// decoded bytes must be UTF-8.
pub fn try_decode(raw: &str) -> Result<String, DecodeError> {
    let bytes = raw.as_bytes();
    for (idx, byte) in bytes.iter().enumerate() {
        if *byte != b'%' {
            continue;
        }
        let escape_ok = bytes
            .get(idx + 1..idx + 3)
            .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
        if !escape_ok {
            return Err(DecodeError::MalformedEscape(idx));
        }
    }

    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| DecodeError::InvalidUtf8)
}

/// Percent-decode once; on malformed input the original string is returned.
pub fn decode_once(raw: &str) -> String {
    match try_decode(raw) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(input = raw, error = %err, "malformed percent-encoding, keeping raw value");
            raw.to_string()
        }
    }
}

/// Parse JSON, percent-decoding between attempts.
///
/// The raw value is parsed first so literal `%` characters inside legitimate
/// JSON strings are never decoded. Each failed attempt decodes once more, up
/// to `max_depth` rounds; a decode that changes nothing ends the loop early.
pub fn parse_json_with_decode_retry<T: DeserializeOwned>(
    raw: &str,
    fallback: T,
    max_depth: usize,
) -> T {
    let mut current = raw.to_string();
    if let Ok(parsed) = serde_json::from_str::<T>(&current) {
        return parsed;
    }

    for depth in 0..max_depth {
        let decoded = decode_once(&current);
        if decoded == current {
            debug!(depth, "decoding reached a fixed point without valid JSON");
            break;
        }
        current = decoded;
        if let Ok(parsed) = serde_json::from_str::<T>(&current) {
            return parsed;
        }
    }

    warn!(input = raw, "value is not valid JSON, using fallback");
    fallback
}
