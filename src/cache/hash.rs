//! Content hashes for cache keys and generated aliases.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the JSON form of `value` (64 lowercase characters).
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// First eight hex characters of [`compute_hash`], for alias suffixes.
pub fn short_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut digest = compute_hash(value)?;
    digest.truncate(8);
    Ok(digest)
}
