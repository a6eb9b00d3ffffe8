//! Payload compression.
//!
//! Array payloads may be stored zlib-deflated; scalar payloads never
//! are. Level 0 is handled by the caller (the payload is stored raw).

use std::io::{Read, Write};

use crate::error::FormatError;

/// Compress a payload with zlib at the given level (1-9).
pub fn deflate_compress(data: &[u8], level: u32) -> Result<Vec<u8>, FormatError> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| FormatError::Filter(e.to_string()))?;
    encoder.finish().map_err(|e| FormatError::Filter(e.to_string()))
}

/// Decompress a zlib-deflated payload.
pub fn deflate_decompress(data: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FormatError::Filter(e.to_string()))?;
    Ok(out)
}
