//! Encoding detection from leading bytes.
//!
//! Encapsulated pixel data does not always match the transfer syntax the
//! container declares (JPEG lossless data filed under JPEG Baseline is a
//! common case). [`detect_encoding`] peeks at the start of a compressed frame
//! through a [`ByteWindow`], classifies it, and puts the bytes back so the
//! chosen decoder sees the stream untouched.
//!
//! Recognized signatures:
//!
//! - **JPEG**: SOI followed by marker segments up to the first SOFn
//! - **JPEG 2000**: codestream SOC/SIZ (COD transform picks lossless or not),
//!   or the JP2 file signature box
//! - **RLE**: a 64-byte header whose first offset is 64

use crate::error::StreamError;
use crate::io::{read_u16_be, read_u32_le, ByteWindow};
use crate::pixel::EncodingId;

use super::jpeg::{EOI, SOI, SOS};

/// Maximum bytes examined when looking for a signature.
pub const MAX_DETECT_BYTES: usize = 4096;

/// JPEG 2000 codestream start: SOC followed by SIZ.
const J2K_CODESTREAM: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

/// JP2 signature box.
const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

/// JPEG 2000 coding style default marker.
const J2K_COD: u8 = 0x52;

/// Size of an RLE header.
const RLE_HEADER_LEN: usize = 64;

/// Classify the compressed data at the current position of `window`.
///
/// Reads up to [`MAX_DETECT_BYTES`] and rewinds them with `putback`, leaving
/// the read position unchanged. Returns `Ok(None)` when nothing matched.
pub fn detect_encoding(window: &mut ByteWindow) -> Result<Option<EncodingId>, StreamError> {
    let mut peek = vec![0u8; window.available().min(MAX_DETECT_BYTES)];
    let n = window.read(&mut peek);
    window.putback(n)?;
    Ok(classify(&peek[..n]))
}

/// Classify a byte prefix.
pub fn classify(data: &[u8]) -> Option<EncodingId> {
    if data.starts_with(&SOI) {
        return classify_jpeg(data);
    }
    if data.starts_with(&J2K_CODESTREAM) {
        return Some(classify_j2k_codestream(data));
    }
    if data.starts_with(&JP2_SIGNATURE) {
        return Some(EncodingId::JPEG2000);
    }
    if is_rle_header(data) {
        return Some(EncodingId::RLE_LOSSLESS);
    }
    None
}

/// Walk JPEG marker segments until the first start-of-frame marker.
fn classify_jpeg(data: &[u8]) -> Option<EncodingId> {
    let mut pos = 2;
    while pos + 3 < data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        match marker {
            // Fill bytes
            0xFF => {
                pos += 1;
                continue;
            }
            0xC0 => return Some(EncodingId::JPEG_BASELINE),
            0xC1 | 0xC2 => return Some(EncodingId::JPEG_EXTENDED),
            0xC3 => return Some(EncodingId::JPEG_LOSSLESS),
            0xF7 => return Some(EncodingId::JPEG_LS_LOSSLESS),
            _ => {}
        }
        if [0xFF, marker] == SOS || [0xFF, marker] == EOI {
            return None;
        }
        let length = read_u16_be(&data[pos + 2..pos + 4]) as usize;
        pos += 2 + length;
    }
    None
}

/// Decide lossless vs. lossy from the COD wavelet transform field.
fn classify_j2k_codestream(data: &[u8]) -> EncodingId {
    let mut pos = 2;
    while pos + 3 < data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        if marker == J2K_COD {
            // Lcod(2) Scod(1) SGcod(4) levels(1) xcb(1) ycb(1) style(1) transform(1)
            return match data.get(pos + 13) {
                Some(1) => EncodingId::JPEG2000_LOSSLESS,
                _ => EncodingId::JPEG2000,
            };
        }
        let length = read_u16_be(&data[pos + 2..pos + 4]) as usize;
        pos += 2 + length;
    }
    EncodingId::JPEG2000
}

/// Check for a plausible RLE header (segment count 1-15, first offset 64,
/// increasing offsets, unused offsets zero).
pub fn is_rle_header(data: &[u8]) -> bool {
    if data.len() < RLE_HEADER_LEN {
        return false;
    }
    let count = read_u32_le(data) as usize;
    if count == 0 || count > 15 {
        return false;
    }
    let offsets: Vec<u32> = (0..15)
        .map(|i| read_u32_le(&data[4 + 4 * i..]))
        .collect();
    offsets[0] as usize == RLE_HEADER_LEN
        && offsets[..count].windows(2).all(|w| w[0] < w[1])
        && offsets[count..].iter().all(|&o| o == 0)
}

// =============================================================================
// Tests
// =============================================================================
