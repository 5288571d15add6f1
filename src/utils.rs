//! Bounds-checked big-endian field access and random byte helpers.
//!
//! All SPC fields are read through these helpers so that attacker-controlled
//! lengths can never index past the buffer.
use byteorder::{BigEndian, ByteOrder};
use rsa::rand_core::{OsRng, RngCore};

use crate::error::{Result, Status};

/// Borrow `len` bytes at `offset`, failing with `paramErr` when out of range.
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.checked_add(len);
    match end {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => fps_bail!(
            Status::ParamErr,
            "read of {} bytes at offset {} exceeds buffer of {} bytes",
            len,
            offset,
            data.len()
        ),
    }
}

/// Read a big-endian u32 at `offset`.
pub fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    read_bytes(data, offset, 4).map(BigEndian::read_u32)
}

/// Read a big-endian u64 at `offset`.
pub fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    read_bytes(data, offset, 8).map(BigEndian::read_u64)
}

/// Append a big-endian u32.
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Append a big-endian u64.
pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Fill `out` with bytes from the OS CSPRNG.
pub fn fill_random(out: &mut [u8]) {
    let mut rng = OsRng;
    rng.fill_bytes(out);
}

/// Return `len` random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    fill_random(&mut out);
    out
}

/// Copy `data` into a buffer of exactly `len` bytes, zero padding or truncating.
#[must_use]
pub fn zero_padded(data: &[u8], len: usize) -> Vec<u8> {
    let mut out = data.iter().copied().take(len).collect::<Vec<_>>();
    out.resize(len, 0);
    out
}
