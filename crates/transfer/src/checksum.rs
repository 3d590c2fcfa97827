use sha2::{Digest, Sha256};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Canonical form of a content hash: lowercase hex without an algorithm
/// prefix (`sha256:ABC…` becomes `abc…`).
pub fn normalize_hash(hash: &str) -> String {
    let hash = hash.trim();
    let bare = hash.strip_prefix("sha256:").unwrap_or(hash);
    bare.to_ascii_lowercase()
}

/// Compares two content hashes after normalization.
pub fn hashes_match(a: &str, b: &str) -> bool {
    normalize_hash(a) == normalize_hash(b)
}
