//! SHA-512 integrity digests in the registry's `sha512-<base64>` form.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha512};

/// Incremental SHA-512 hasher for streamed downloads.
///
/// Bytes are fed chunk by chunk as they are written to disk, so a
/// tarball is hashed in the same single pass that persists it.
pub struct IntegrityHasher {
    hasher: Sha512,
}

impl IntegrityHasher {
    pub fn new() -> Self {
        IntegrityHasher { hasher: Sha512::new() }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Consumes the hasher and returns the `sha512-<base64>` string the
    /// registry declares in `dist.integrity`.
    pub fn finalize(self) -> String {
        format!("sha512-{}", BASE64.encode(self.hasher.finalize()))
    }
}

impl Default for IntegrityHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the integrity string of a complete byte slice.
pub fn integrity_of(bytes: &[u8]) -> String {
    let mut hasher = IntegrityHasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_digest() {
        // SHA-512 of the empty string, base64-encoded.
        assert_eq!(
            integrity_of(b""),
            "sha512-z4PhNX7vuL3xVChQ1m2AB9Yg5AULVxXcg/SpIdNs6c5H0NE8XYXysP+DGNKHfuwvY7kxvUdBeoGlODJ6+SfaPg=="
        );
    }

    #[test]
    fn chunked_and_whole_agree() {
        let mut chunked = IntegrityHasher::new();
        chunked.update(b"hello ");
        chunked.update(b"world");
        assert_eq!(chunked.finalize(), integrity_of(b"hello world"));
    }

    #[test]
    fn digest_is_prefixed() {
        assert!(integrity_of(b"x").starts_with("sha512-"));
    }
}
