//! Integrity fields of the DEX header.
//!
//! The SHA-1 signature covers bytes `32..` and the Adler-32 checksum covers
//! bytes `12..`, which includes the signature. Sealing therefore writes the
//! signature first and the checksum last.

use sha1::{Digest, Sha1};

use super::HEADER_SIZE;

const CHECKSUM_RANGE_START: usize = 12;
const SIGNATURE_RANGE_START: usize = 32;

/// Adler-32 over `bytes[12..]`.
pub fn compute_checksum(bytes: &[u8]) -> u32 {
    adler2::adler32_slice(&bytes[CHECKSUM_RANGE_START..])
}

/// SHA-1 over `bytes[32..]`.
pub fn compute_signature(bytes: &[u8]) -> [u8; 20] {
    let digest = Sha1::digest(&bytes[SIGNATURE_RANGE_START..]);
    let mut signature = [0u8; 20];
    signature.copy_from_slice(&digest);
    signature
}

/// Fill in signature and checksum of a fully laid out file.
pub fn seal(bytes: &mut [u8]) {
    assert!(bytes.len() >= HEADER_SIZE, "file shorter than its header");

    let signature = compute_signature(bytes);
    bytes[12..32].copy_from_slice(&signature);

    let checksum = compute_checksum(bytes);
    bytes[8..12].copy_from_slice(&checksum.to_le_bytes());
}
