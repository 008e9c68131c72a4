//! Decoding of raw field bytes.

use std::borrow::Cow;

use encoding_rs::Encoding;
use tracing::debug;

use crate::error::{LexisError, Result};

/// Resolve a WHATWG encoding label such as `utf-8` or `koi8-r`.
pub fn lookup(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| LexisError::UnsupportedEncoding(label.to_string()))
}

/// Decode `bytes` with `encoding`.
///
/// Malformed sequences are replaced with U+FFFD rather than failing the
/// document. A byte order mark overrides the configured encoding.
pub fn decode<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(encoding = used.name(), "malformed input replaced during decoding");
    }
    text
}
