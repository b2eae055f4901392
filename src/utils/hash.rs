//! Content fingerprints for cache-busting file names.

/// Hex fingerprint of `content`, truncated to `len` characters.
///
/// Uses blake3; the same bytes always give the same fingerprint.
pub fn fingerprint(content: &[u8], len: usize) -> String {
    let mut hex = hex::encode(blake3::hash(content).as_bytes());
    hex.truncate(len);
    hex
}
