//! Web font unpacking
//!
//! Gzip compressed bodies are inflated first. WOFF 1.0 containers are then
//! rebuilt into a plain sfnt (TrueType/OpenType) file.

use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;

use crate::error::DecodeError;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const WOFF_SIGNATURE: &[u8] = b"wOFF";
const WOFF_HEADER_LEN: usize = 44;
const WOFF_ENTRY_LEN: usize = 20;
const SFNT_HEADER_LEN: usize = 12;
const SFNT_ENTRY_LEN: usize = 16;
/// Largest font accepted after inflation
const MAX_FONT_LEN: usize = 64 << 20;

/// Turn a fetched font body into sfnt bytes
pub fn unpack(raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let data = if raw.starts_with(GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(raw)
            .take(MAX_FONT_LEN as u64 + 1)
            .read_to_end(&mut inflated)
            .map_err(|e| DecodeError::Compression(e.to_string()))?;
        if inflated.len() > MAX_FONT_LEN {
            return Err(DecodeError::Compression("font too large".to_string()));
        }
        inflated
    } else {
        raw.to_vec()
    };

    if data.starts_with(WOFF_SIGNATURE) {
        return decode_woff(&data);
    }
    if data.is_empty() {
        return Err(DecodeError::EmptyFont);
    }
    Ok(data)
}

fn be_u16(data: &[u8], at: usize) -> Result<u16, DecodeError> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| DecodeError::Woff("truncated".to_string()))
}

fn be_u32(data: &[u8], at: usize) -> Result<u32, DecodeError> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| DecodeError::Woff("truncated".to_string()))
}

struct WoffTable {
    tag: u32,
    offset: usize,
    comp_length: usize,
    orig_length: usize,
    checksum: u32,
}

fn decode_woff(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if data.len() < WOFF_HEADER_LEN {
        return Err(DecodeError::Woff("header too short".to_string()));
    }
    let flavor = be_u32(data, 4)?;
    let length = be_u32(data, 8)? as usize;
    let num_tables = be_u16(data, 12)? as usize;
    let total_sfnt_size = be_u32(data, 16)? as usize;

    if length != data.len() {
        return Err(DecodeError::Woff(format!(
            "length field {} does not match {} bytes",
            length,
            data.len()
        )));
    }

    let mut tables = Vec::with_capacity(num_tables);
    let mut sfnt_size = SFNT_HEADER_LEN + num_tables * SFNT_ENTRY_LEN;
    for i in 0..num_tables {
        let at = WOFF_HEADER_LEN + i * WOFF_ENTRY_LEN;
        let table = WoffTable {
            tag: be_u32(data, at)?,
            offset: be_u32(data, at + 4)? as usize,
            comp_length: be_u32(data, at + 8)? as usize,
            orig_length: be_u32(data, at + 12)? as usize,
            checksum: be_u32(data, at + 16)?,
        };
        if table.comp_length > table.orig_length
            || table.offset.checked_add(table.comp_length).is_none_or(|end| end > data.len())
        {
            return Err(DecodeError::Woff("table out of bounds".to_string()));
        }
        sfnt_size = sfnt_size
            .checked_add(padded(table.orig_length))
            .filter(|size| *size <= MAX_FONT_LEN)
            .ok_or_else(|| DecodeError::Woff("font too large".to_string()))?;
        tables.push(table);
    }

    if total_sfnt_size != sfnt_size {
        return Err(DecodeError::Woff(format!(
            "sfnt size field {} does not match tables ({} bytes)",
            total_sfnt_size, sfnt_size
        )));
    }

    let mut out = Vec::with_capacity(sfnt_size);
    write_sfnt_header(&mut out, flavor, num_tables);

    let mut table_offset = SFNT_HEADER_LEN + num_tables * SFNT_ENTRY_LEN;
    for table in &tables {
        out.extend_from_slice(&table.tag.to_be_bytes());
        out.extend_from_slice(&table.checksum.to_be_bytes());
        out.extend_from_slice(&(table_offset as u32).to_be_bytes());
        out.extend_from_slice(&(table.orig_length as u32).to_be_bytes());
        table_offset += padded(table.orig_length);
    }

    for table in &tables {
        let source = &data[table.offset..table.offset + table.comp_length];
        if table.comp_length == table.orig_length {
            out.extend_from_slice(source);
        } else {
            let mut inflated = Vec::with_capacity(table.orig_length);
            ZlibDecoder::new(source)
                .take(table.orig_length as u64 + 1)
                .read_to_end(&mut inflated)
                .map_err(|e| DecodeError::Compression(e.to_string()))?;
            if inflated.len() != table.orig_length {
                return Err(DecodeError::Woff("table length mismatch".to_string()));
            }
            out.extend_from_slice(&inflated);
        }
        out.resize(padded(out.len()), 0);
    }

    Ok(out)
}

fn write_sfnt_header(out: &mut Vec<u8>, flavor: u32, num_tables: usize) {
    let mut power = 1usize;
    let mut selector = 0u16;
    while power * 2 <= num_tables {
        power *= 2;
        selector += 1;
    }
    let search_range = (power * 16) as u16;

    out.extend_from_slice(&flavor.to_be_bytes());
    out.extend_from_slice(&(num_tables as u16).to_be_bytes());
    out.extend_from_slice(&search_range.to_be_bytes());
    out.extend_from_slice(&selector.to_be_bytes());
    out.extend_from_slice(&((num_tables * 16) as u16).wrapping_sub(search_range).to_be_bytes());
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}
