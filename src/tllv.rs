//! TLLV (tag, total length, value length, value) record codec.
//!
//! Wire layout of one record:
//!
//! ```text
//! tag: u64 BE | total_length: u32 BE | value_length: u32 BE | value | padding
//! ```
//!
//! `total_length` covers the value and its padding, so a record occupies
//! `16 + total_length` bytes.

use crate::constants::{tag as tags, AES128_BLOCK_SIZE, TLLV_HEADER_SZ};
use crate::error::{Result, Status};
use crate::utils::{fill_random, put_u32, put_u64, read_u32, read_u64};

/// A single TLLV record as seen in an SPC payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tllv {
    /// Tag value.
    pub tag: u64,
    /// Value bytes (padding excluded).
    pub value: Vec<u8>,
}

impl Tllv {
    /// Create a record.
    pub fn new(tag: u64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Append this record to `out` with random padding.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        encode(self.tag, &self.value, out);
    }
}

/// Decode the record starting at `offset`.
///
/// Returns the record and the offset of the next one, which skips the
/// value and its padding.
pub fn decode(buffer: &[u8], offset: usize) -> Result<(Tllv, usize)> {
    fps_ensure!(
        buffer.len().saturating_sub(offset) >= TLLV_HEADER_SZ,
        Status::ParamErr,
        "TLLV header at offset {} exceeds buffer of {} bytes",
        offset,
        buffer.len()
    );

    let mut offset = offset;
    let tag = read_u64(buffer, offset)?;
    offset += 8;
    let total_length = read_u32(buffer, offset)? as usize;
    offset += 4;
    let value_length = read_u32(buffer, offset)? as usize;
    offset += 4;

    fps_ensure!(
        value_length <= total_length,
        Status::ParamErr,
        "TLLV 0x{:016x} value length {} exceeds total length {}",
        tag,
        value_length,
        total_length
    );

    let end = offset
        .checked_add(total_length)
        .filter(|end| *end <= buffer.len());
    let value_end = offset
        .checked_add(value_length)
        .filter(|end| *end <= buffer.len());
    let (end, value_end) = match (end, value_end) {
        (Some(end), Some(value_end)) => (end, value_end),
        _ => fps_bail!(
            Status::ParamErr,
            "TLLV 0x{:016x} of length {} exceeds buffer of {} bytes",
            tag,
            total_length,
            buffer.len()
        ),
    };

    let tllv = Tllv::new(tag, &buffer[offset..value_end]);
    Ok((tllv, end))
}

/// Number of padding bytes for a value of `value_len` bytes, given the
/// random byte selecting 0 to 3 extra blocks.
#[must_use]
pub fn padding_len(value_len: usize, random: u8) -> usize {
    let mut padding = 0;
    if value_len % AES128_BLOCK_SIZE != 0 {
        padding += AES128_BLOCK_SIZE - (value_len % AES128_BLOCK_SIZE);
    }
    padding + AES128_BLOCK_SIZE * (random % 4) as usize
}

/// Append one record to `out`.
///
/// The value is padded to a block boundary plus 0 to 3 random extra blocks,
/// and the padding is filled with random bytes.
pub fn encode(tag: u64, value: &[u8], out: &mut Vec<u8>) {
    let mut extra = [0u8; 1];
    fill_random(&mut extra);
    let padding_size = padding_len(value.len(), extra[0]);

    let mut padding = vec![0u8; padding_size];
    fill_random(&mut padding);

    debug!(
        "Adding TLLV {} (0x{:016x}) block length 0x{:x} value length 0x{:x}",
        tags::name(tag),
        tag,
        value.len() + padding_size,
        value.len()
    );

    put_u64(out, tag);
    put_u32(out, (value.len() + padding_size) as u32);
    put_u32(out, value.len() as u32);
    out.extend_from_slice(value);
    out.extend_from_slice(&padding);
}

/// Decode every record in `buffer[..end]`.
pub fn decode_all(buffer: &[u8], end: usize) -> Result<Vec<Tllv>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < end {
        let (tllv, next) = decode(buffer, offset)?;
        records.push(tllv);
        offset = next;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::{decode, decode_all, encode, padding_len, Tllv};
    use crate::error::Status;

    #[test]
    fn decode_returns_encoded_value() {
        for len in [0usize, 1, 15, 16, 17, 44, 200] {
            let value = (0..len).map(|i| i as u8).collect::<Vec<_>>();
            let mut out = Vec::new();
            encode(0x1bf7f53f5d5d5a1f, &value, &mut out);

            assert_eq!(out.len() % 16, 0);
            let (tllv, next) = decode(&out, 0).expect("decode");
            assert_eq!(tllv, Tllv::new(0x1bf7f53f5d5d5a1f, value));
            assert_eq!(next, out.len());
        }
    }

    #[test]
    fn padding_is_block_aligned() {
        assert_eq!(padding_len(16, 0), 0);
        assert_eq!(padding_len(17, 0), 15);
        assert_eq!(padding_len(0, 3), 48);
        assert_eq!(padding_len(5, 6), 11 + 32);
    }

    #[test]
    fn consecutive_records_decode_in_order() {
        let mut out = Vec::new();
        Tllv::new(1, vec![1u8; 3]).write_to(&mut out);
        Tllv::new(2, vec![2u8; 21]).write_to(&mut out);
        let records = decode_all(&out, out.len()).expect("decode all");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag, 1);
        assert_eq!(records[1].value, vec![2u8; 21]);
    }

    #[test]
    fn short_header_is_param_err() {
        let err = decode(&[0u8; 15], 0).expect_err("short");
        assert_eq!(err.status(), Status::ParamErr);
    }

    #[test]
    fn value_longer_than_total_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u64.to_be_bytes());
        buf.extend_from_slice(&16u32.to_be_bytes());
        buf.extend_from_slice(&17u32.to_be_bytes());
        buf.extend_from_slice(&[0u8; 32]);
        assert!(decode(&buf, 0).is_err());
    }

    #[test]
    fn total_length_past_end_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u64.to_be_bytes());
        buf.extend_from_slice(&u32::MAX.to_be_bytes());
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        let err = decode(&buf, 0).expect_err("past end");
        assert_eq!(err.status(), Status::ParamErr);
    }
}
