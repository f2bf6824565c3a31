//! The crate-wide error taxonomy.
//!
//! Kinds, not types: a `Validation` error means the definition itself is
//! malformed and decoding never starts; `Underrun`/`Truncation`/`Timeout` come
//! from the stream adapter; `Comparison`/`Enumeration`/`Calibration` surface
//! per-packet; `Coverage` means the container state machine bottomed out at
//! an abstract container with no matching inheritor.

use std::io;
use std::string::FromUtf8Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid UTF-8 in decoded string: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("not enough bits (wanted {expected_bits}, only {available_bits} available)")]
    Underrun {
        expected_bits: usize,
        available_bits: usize,
    },

    #[error("packet ended before its declared length was satisfied")]
    Truncation,

    #[error("timed out waiting for more bytes")]
    Timeout,

    #[error("invalid packet definition: {0}")]
    Validation(String),

    #[error("could not resolve match criteria: {0}")]
    Comparison(String),

    #[error("raw value {raw} has no entry in the enumeration list")]
    Enumeration { raw: String },

    #[error("calibration failed: {0}")]
    Calibration(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("container {container} is abstract and no inheritor's restriction criteria matched")]
    Coverage { container: String },
}
