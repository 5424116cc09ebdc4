//! Zlib compression of stored blobs.
//!
//! Compression is deterministic, so compressed inputs can be compared
//! directly inside SQL lookups.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::error::{DbError, DbResult};

pub fn compress(data: &[u8]) -> DbResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data).map_err(DbError::Compression)?;
    encoder.finish().map_err(DbError::Compression)
}

pub fn decompress(data: &[u8]) -> DbResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut result)
        .map_err(DbError::Compression)?;
    Ok(result)
}
