//! Sticker payload decoding.
//!
//! Animated stickers ship as `.tgs` files: gzip-compressed Lottie JSON. Plain
//! `.json` documents are accepted as well.

use crate::model::LottieJson;
use crate::DataError;
use flate2::read::GzDecoder;
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Upper bound on the inflated document size.
pub const MAX_INFLATED_BYTES: usize = 16 * 1024 * 1024;

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Inflates a `.tgs` payload into raw JSON bytes.
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>, DataError> {
    let mut out = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes)
        .take(MAX_INFLATED_BYTES as u64 + 1)
        .read_to_end(&mut out)
        .map_err(DataError::Inflate)?;
    if out.len() > MAX_INFLATED_BYTES {
        return Err(DataError::TooLarge(MAX_INFLATED_BYTES));
    }
    Ok(out)
}

/// Parses a sticker payload, inflating it first when it is gzip-compressed.
pub fn decode_payload(bytes: &[u8]) -> Result<LottieJson, DataError> {
    if bytes.is_empty() {
        return Err(DataError::Empty);
    }
    if is_gzip(bytes) {
        let json = inflate(bytes)?;
        Ok(serde_json::from_slice(&json)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}
