//! Manifest digest utilities
//!
//! Registries normally report a manifest's digest in the `Docker-Content-Digest`
//! header. Some proxies strip it, in which case the digest is recomputed from
//! the exact bytes the registry returned.

use crate::error::{RegistryError, Result};
use sha2::{Digest, Sha256};

pub const SHA256_PREFIX: &str = "sha256:";

/// Utilities for working with content digests
pub struct DigestUtils;

impl DigestUtils {
    /// Compute SHA256 hex digest from byte data
    pub fn compute_sha256(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Compute full content digest (with sha256: prefix) from byte data
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("{}{}", SHA256_PREFIX, Self::compute_sha256(data))
    }

    /// Validate SHA256 hex string (64 characters, all hex)
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Validate `algorithm:hex` digests for the algorithms registries accept
    pub fn is_valid_docker_digest(digest: &str) -> bool {
        match digest.split_once(':') {
            Some(("sha256", hex_part)) => Self::is_valid_sha256_hex(hex_part),
            Some(("sha512", hex_part)) => {
                hex_part.len() == 128 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
            }
            _ => false,
        }
    }

    /// Normalize digest to full format (add sha256: prefix if missing)
    pub fn normalize_digest(digest: &str) -> Result<String> {
        let digest = digest.trim();
        if Self::is_valid_docker_digest(digest) {
            return Ok(digest.to_string());
        }
        if Self::is_valid_sha256_hex(digest) {
            return Ok(format!("{}{}", SHA256_PREFIX, digest));
        }
        Err(RegistryError::Validation(format!(
            "Invalid digest: expected sha256:<64 hex characters>, got '{}'",
            digest
        )))
    }

    /// Format digest for display (truncated for readability)
    pub fn format_digest_short(digest: &str) -> String {
        digest.chars().take(19).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_compute_docker_digest() {
        let digest = DigestUtils::compute_docker_digest(b"hello world");
        assert_eq!(digest, format!("sha256:{}", HELLO));
    }

    #[test]
    fn test_validate_digest() {
        assert!(DigestUtils::is_valid_docker_digest(&format!("sha256:{}", HELLO)));
        assert!(!DigestUtils::is_valid_docker_digest("sha256:invalid"));
        assert!(!DigestUtils::is_valid_docker_digest(HELLO));
        assert!(!DigestUtils::is_valid_docker_digest(&format!("md5:{}", HELLO)));
    }

    #[test]
    fn test_normalize_digest() {
        let normalized = DigestUtils::normalize_digest(HELLO).unwrap();
        assert_eq!(normalized, format!("sha256:{}", HELLO));
        assert!(DigestUtils::normalize_digest("latest").is_err());
    }

    #[test]
    fn test_format_digest_short() {
        let short = DigestUtils::format_digest_short(&format!("sha256:{}", HELLO));
        assert_eq!(short, "sha256:b94d27b9934d");
    }
}
