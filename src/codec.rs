//! Transport encoding for credential material
//!
//! Credential bytes cross the negotiation as printable text. Base64 here is
//! strictly a boundary transform: encode before handing secrets to a text
//! mechanism, decode when reading them back.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Encode arbitrary bytes into the printable transport alphabet
pub fn transport_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode transport text back into the original bytes
///
/// Inverse of [`transport_encode`] for every byte sequence, including the
/// empty one.
pub fn transport_decode(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| Error::Encoding(format!("invalid transport encoding: {}", e)))
}
