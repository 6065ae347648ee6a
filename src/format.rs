//! gzip wrapper parsing (RFC 1952).
//!
//! Only the member framing is handled here: the fixed 10-byte header, the
//! optional FEXTRA/FNAME/FCOMMENT/FHCRC fields, and the 8-byte footer. The
//! footer's CRC32/ISIZE are exposed but not verified — the random-access
//! core cannot promise end-to-end checksums and the sequential path keeps
//! the same policy.

use crate::error::{RazgzError, RazgzResult};

pub const GZIP_ID1: u8 = 0x1F;
pub const GZIP_ID2: u8 = 0x8B;
pub const GZIP_CM_DEFLATE: u8 = 0x08;

pub const GZIP_FHCRC: u8 = 0x02;
pub const GZIP_FEXTRA: u8 = 0x04;
pub const GZIP_FNAME: u8 = 0x08;
pub const GZIP_FCOMMENT: u8 = 0x10;
pub const GZIP_FRESERVED: u8 = 0xE0;

pub const GZIP_FOOTER_SIZE: usize = 8;
/// Fixed header plus footer: the smallest possible member.
pub const GZIP_MIN_OVERHEAD: usize = 10 + GZIP_FOOTER_SIZE;

/// Parse a member header starting at `data[0]`. Returns the offset of the
/// DEFLATE payload.
pub fn parse_gzip_header(data: &[u8]) -> RazgzResult<usize> {
    if data.len() < GZIP_MIN_OVERHEAD {
        return Err(RazgzError::invalid_gzip("shorter than a gzip member"));
    }
    if data[0] != GZIP_ID1 || data[1] != GZIP_ID2 {
        return Err(RazgzError::invalid_gzip("bad magic bytes"));
    }
    if data[2] != GZIP_CM_DEFLATE {
        return Err(RazgzError::invalid_gzip(format!(
            "unsupported compression method {}",
            data[2]
        )));
    }
    let flg = data[3];
    if flg & GZIP_FRESERVED != 0 {
        return Err(RazgzError::invalid_gzip("reserved flag bits set"));
    }
    // MTIME(4) + XFL + OS are skipped.
    let mut offset = 10;

    if flg & GZIP_FEXTRA != 0 {
        if offset + 2 > data.len() {
            return Err(RazgzError::invalid_gzip("truncated FEXTRA length"));
        }
        let xlen = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
        offset += 2;
        if data.len() - offset < xlen + GZIP_FOOTER_SIZE {
            return Err(RazgzError::invalid_gzip("truncated FEXTRA field"));
        }
        offset += xlen;
    }

    for (flag, what) in [(GZIP_FNAME, "FNAME"), (GZIP_FCOMMENT, "FCOMMENT")] {
        if flg & flag != 0 {
            match data[offset..].iter().position(|&b| b == 0) {
                Some(nul) => offset += nul + 1,
                None => {
                    return Err(RazgzError::invalid_gzip(format!("unterminated {}", what)));
                }
            }
        }
    }

    if flg & GZIP_FHCRC != 0 {
        offset += 2;
    }

    if data.len() - offset < GZIP_FOOTER_SIZE {
        return Err(RazgzError::invalid_gzip("no room left for a footer"));
    }
    Ok(offset)
}

/// The member's DEFLATE payload, footer stripped. Only valid for
/// single-member files; multi-member streams must be walked member by
/// member.
pub fn deflate_payload(data: &[u8]) -> RazgzResult<&[u8]> {
    let start = parse_gzip_header(data)?;
    Ok(&data[start..data.len() - GZIP_FOOTER_SIZE])
}

/// The `(CRC32, ISIZE)` pair from a member footer located at `end`.
pub fn read_footer(data: &[u8], end: usize) -> Option<(u32, u32)> {
    if end < GZIP_FOOTER_SIZE || end > data.len() {
        return None;
    }
    let f = &data[end - GZIP_FOOTER_SIZE..end];
    Some((
        u32::from_le_bytes([f[0], f[1], f[2], f[3]]),
        u32::from_le_bytes([f[4], f[5], f[6], f[7]]),
    ))
}
