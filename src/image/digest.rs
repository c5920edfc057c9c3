//! Content digest helpers
//!
//! Registry digests look like `sha256:<64 hex chars>`. The archive uses the
//! hex part as file and directory names, so it must be checked before it
//! ends up in a tar path.

use crate::error::{PullError, Result};

pub const SHA256_PREFIX: &str = "sha256:";

/// Utilities for working with digests in the Docker context
pub struct DigestUtils;

impl DigestUtils {
    /// Hex part of a digest, safe to use as a path component.
    ///
    /// Any `<algorithm>:` prefix is stripped; the remainder must be a
    /// non-empty run of lowercase hex digits.
    pub fn hex_part(digest: &str) -> Result<&str> {
        let hex = match digest.split_once(':') {
            Some((_, hex)) => hex,
            None => digest,
        };

        if hex.is_empty() || !hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(PullError::ArchiveBuild(format!(
                "digest {:?} cannot be used as an archive path",
                digest
            )));
        }

        Ok(hex)
    }

    /// Shortened digest for progress output (`sha256:` plus 12 hex chars)
    pub fn short(digest: &str) -> &str {
        let end = digest
            .char_indices()
            .nth(SHA256_PREFIX.len() + 12)
            .map(|(i, _)| i)
            .unwrap_or(digest.len());
        &digest[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_hex_part_strips_prefix() {
        assert_eq!(DigestUtils::hex_part(&format!("sha256:{HELLO}")).unwrap(), HELLO);
        assert_eq!(DigestUtils::hex_part(HELLO).unwrap(), HELLO);
    }

    #[test]
    fn test_hex_part_rejects_path_characters() {
        assert!(DigestUtils::hex_part("sha256:../../etc/passwd").is_err());
        assert!(DigestUtils::hex_part("sha256:").is_err());
        assert!(DigestUtils::hex_part("sha256:ABCDEF").is_err());
    }

    #[test]
    fn test_short_digest() {
        assert_eq!(
            DigestUtils::short(&format!("sha256:{HELLO}")),
            "sha256:b94d27b9934d"
        );
        assert_eq!(DigestUtils::short("sha256:ab"), "sha256:ab");
    }
}
