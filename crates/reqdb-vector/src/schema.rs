//! On-disk layout of a vector snapshot.
//!
//! `vectors.bin`: `[count: i32 LE][dimension: i32 LE]` followed by
//! `count * dimension` little-endian `f32` values, document-major.
//! `vectors_meta.json`: array of `DocumentMetadata` in the same order. The
//! position in the array is the join key, there is no explicit index field.

use std::path::Path;

use reqdb_core::error::{Error, Result};

pub const VECTORS_FILE: &str = "vectors.bin";
pub const VECTORS_META_FILE: &str = "vectors_meta.json";

const HEADER_LEN: usize = 8;

pub fn encode_matrix(count: usize, dimension: usize, values: &[f32]) -> Result<Vec<u8>> {
    let count_i32 = i32::try_from(count)
        .map_err(|_| Error::InvalidDocument(format!("{count} vectors exceed the i32 header")))?;
    let dim_i32 = i32::try_from(dimension)
        .map_err(|_| Error::InvalidDocument(format!("dimension {dimension} exceeds the i32 header")))?;

    let mut out = Vec::with_capacity(HEADER_LEN + values.len() * 4);
    out.extend_from_slice(&count_i32.to_le_bytes());
    out.extend_from_slice(&dim_i32.to_le_bytes());
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

/// Decode `(count, dimension, values)`; `path` is only used in errors.
pub fn decode_matrix(path: &Path, bytes: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::corrupt(path, format!("{} bytes is shorter than the header", bytes.len())));
    }
    let count = read_i32(&bytes[0..4]);
    let dimension = read_i32(&bytes[4..8]);
    let (Ok(count), Ok(dimension)) = (usize::try_from(count), usize::try_from(dimension)) else {
        return Err(Error::corrupt(path, format!("negative header values ({count}, {dimension})")));
    };

    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| Error::corrupt(path, "header overflows"))?;
    if bytes.len() != expected {
        return Err(Error::corrupt(
            path,
            format!("header says {count}x{dimension} ({expected} bytes) but file has {} bytes", bytes.len()),
        ));
    }

    let values = bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((count, dimension, values))
}

fn read_i32(b: &[u8]) -> i32 {
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
