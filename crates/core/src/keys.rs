//! Store key derivation.
//!
//! Keys have the shape `{namespace}:{tag}:{id}`. Where the identifying parts
//! are free-form (URLs, header values, cookie paths) the id is a SHA-256 over
//! the parts, newline-separated, so distinct part lists never collide by
//! concatenation.

use sha2::{Digest, Sha256};

/// Hash an ordered list of parts into a hex digest.
pub fn digest_parts<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(part.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Build a namespaced key whose id is the digest of `parts`.
pub fn hashed_key<S: AsRef<str>>(namespace: &str, tag: &str, parts: &[S]) -> String {
    format!("{namespace}:{tag}:{}", digest_parts(parts))
}

/// Build a namespaced key whose id is used literally.
pub fn literal_key(namespace: &str, tag: &str, id: &str) -> String {
    format!("{namespace}:{tag}:{id}")
}
