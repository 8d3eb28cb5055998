//! SHA-1 content hashing.

use sha1::{Digest, Sha1};

/// Full hex SHA-1 over `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(40);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// First `len` hex characters of the SHA-1 over `bytes`.
pub fn short_hash(bytes: &[u8], len: usize) -> String {
    let mut hash = content_hash(bytes);
    hash.truncate(len);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // sha1("abc")
        assert_eq!(content_hash(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn short_hash_is_prefix() {
        let full = content_hash(b"peaque");
        assert_eq!(short_hash(b"peaque", 8), &full[..8]);
        assert_eq!(short_hash(b"peaque", 12), &full[..12]);
    }

    #[test]
    fn stable_across_calls() {
        assert_eq!(content_hash(b"same input"), content_hash(b"same input"));
    }
}
