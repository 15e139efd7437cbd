//! Stream filters (only `FlateDecode`, with optional PNG predictors).

use crate::object::{Dictionary, Object, Stream};
use crate::{Error, Result};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

pub(crate) fn flate_encode(plain: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(plain)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::InvalidInput(format!("failed to compress stream: {e}")))
}

fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        // Truncated zlib trailers are common; keep what inflated cleanly.
        Err(e) if !out.is_empty() => {
            tracing::debug!(error = %e, "flate stream ended early");
            Ok(out)
        }
        Err(e) => Err(Error::malformed(format!("corrupt FlateDecode stream: {e}"))),
    }
}

/// Decode a stream's data by applying its `/Filter` chain.
pub(crate) fn decode_stream(stream: &Stream) -> Result<Vec<u8>> {
    let filters: Vec<&[u8]> = match stream.dict.get(b"Filter") {
        None => return Ok(stream.data.clone()),
        Some(Object::Name(n)) => vec![n.as_slice()],
        Some(Object::Array(items)) => items.iter().filter_map(Object::as_name).collect(),
        Some(other) => {
            return Err(Error::malformed(format!(
                "stream /Filter must be a name or array, found {}",
                other.type_name()
            )));
        }
    };
    let params: Vec<Option<&Dictionary>> = match stream.dict.get(b"DecodeParms") {
        Some(Object::Array(items)) => items.iter().map(Object::as_dict).collect(),
        Some(other) => vec![other.as_dict()],
        None => Vec::new(),
    };

    let mut data = stream.data.clone();
    for (i, filter) in filters.iter().enumerate() {
        match *filter {
            b"FlateDecode" | b"Fl" => {
                data = flate_decode(&data)?;
                if let Some(Some(p)) = params.get(i) {
                    data = apply_predictor(data, p)?;
                }
            }
            other => {
                return Err(Error::malformed(format!(
                    "unsupported stream filter /{}",
                    String::from_utf8_lossy(other)
                )));
            }
        }
    }
    Ok(data)
}

fn apply_predictor(data: Vec<u8>, params: &Dictionary) -> Result<Vec<u8>> {
    let int = |key: &[u8], default: i64| {
        params
            .get(key)
            .and_then(Object::as_i64)
            .unwrap_or(default)
    };
    let predictor = int(b"Predictor", 1);
    if predictor < 10 {
        if predictor == 1 {
            return Ok(data);
        }
        return Err(Error::malformed(format!(
            "unsupported predictor {predictor}"
        )));
    }

    let colors = int(b"Colors", 1).max(1) as usize;
    let bits = int(b"BitsPerComponent", 8).max(1) as usize;
    let columns = int(b"Columns", 1).max(1) as usize;
    let bpp = (colors * bits).div_ceil(8);
    let row_len = (colors * bits * columns).div_ceil(8);

    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        let (kind, encoded) = chunk
            .split_first()
            .ok_or_else(|| Error::malformed("empty predictor row"))?;
        let mut row = encoded.to_vec();
        row.resize(row_len, 0);
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match kind {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(Error::malformed(format!("unknown PNG row filter {other}")));
                }
            };
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
