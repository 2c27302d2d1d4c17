//! Mirror hashing.
//!
//! The *mirror hash* is the plain SHA-256 of the canonical markdown bytes,
//! presented as lowercase 64-hex. It is the content-addressed key shared by
//! every document whose canonical text is identical, so the algorithm and
//! presentation here are part of the on-disk compatibility contract.

use sha2::{Digest, Sha256};

/// Hash canonical markdown text into its lowercase 64-hex mirror hash.
///
/// The input is hashed as-is; callers are expected to pass text that already
/// went through [`canonicalize`](crate::canonicalize).
///
/// ```rust
/// use canonical::mirror_hash;
///
/// let hash = mirror_hash("hello\n");
/// assert_eq!(
///     hash,
///     "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
/// );
/// ```
pub fn mirror_hash(canonical: &str) -> String {
    mirror_hash_bytes(canonical.as_bytes())
}

/// Hash raw bytes into a lowercase 64-hex SHA-256 digest.
///
/// Also used for source-byte hashes (`source_hash`), which share the digest
/// and presentation with mirror hashes.
pub fn mirror_hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(mirror_hash("abc\n"), mirror_hash("abc\n"));
        assert_ne!(mirror_hash("abc\n"), mirror_hash("abd\n"));
    }

    #[test]
    fn lowercase_64_hex() {
        let hash = mirror_hash("x\n");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
