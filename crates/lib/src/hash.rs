//! # Content Fingerprints
//!
//! A djb2 hash over the UTF-8 bytes of a string. The value is both the embedding
//! cache key and the document identity, so it must never change between releases.

/// The djb2 seed.
const DJB2_SEED: u32 = 5381;

/// Returns the 32-bit djb2 fingerprint of `text` (`h = h * 33 + byte`, wrapping).
pub fn hash_string(text: &str) -> u32 {
    text.bytes().fold(DJB2_SEED, |hash, byte| {
        (hash << 5).wrapping_add(hash).wrapping_add(u32::from(byte))
    })
}

/// The document-table key: the fingerprint rendered in decimal.
pub fn document_key(text: &str) -> String {
    hash_string(text).to_string()
}
