//! Artifact content checksums
//!
//! The manifest, the CDN propagation check and the host all identify a
//! release artifact by the MD5 of its packaged bytes. Every consumer must go
//! through [`compute_checksum`] so the digests are bit-identical.

use sdk::errors::DeployError;
use std::path::Path;

/// MD5 of `data` as 32 lowercase hex characters
pub fn compute_checksum(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Verify that the checksum of `data` matches `expected_hex` (case-insensitive)
pub fn verify_checksum(data: &[u8], expected_hex: &str) -> Result<(), DeployError> {
    let computed = compute_checksum(data);

    if !computed.eq_ignore_ascii_case(expected_hex) {
        return Err(DeployError::ChecksumMismatch {
            expected: expected_hex.to_string(),
            actual: computed,
        });
    }

    Ok(())
}

/// Re-read `path` and check it still hashes to `expected_hex`
pub async fn verify_file(path: &Path, expected_hex: &str) -> Result<(), DeployError> {
    let bytes = tokio::fs::read(path).await?;
    verify_checksum(&bytes, expected_hex)
}

/// Read a file and checksum its full contents
pub async fn checksum_file(path: &Path) -> Result<String, DeployError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(compute_checksum(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            compute_checksum(b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(compute_checksum(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_compute_and_verify() {
        let data = b"plugin bytes";
        let checksum = compute_checksum(data);
        assert!(verify_checksum(data, &checksum).is_ok());
        assert!(verify_checksum(data, &checksum.to_uppercase()).is_ok());
    }

    #[test]
    fn test_verify_mismatch() {
        let result = verify_checksum(b"plugin bytes", "00000000000000000000000000000000");
        assert!(matches!(result, Err(DeployError::ChecksumMismatch { .. })));
    }

    #[tokio::test]
    async fn test_file_checksum_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunnelfin_1.0.0.1.zip");
        tokio::fs::write(&path, b"zip payload").await.unwrap();

        let from_file = checksum_file(&path).await.unwrap();
        assert_eq!(from_file, compute_checksum(b"zip payload"));
    }

    #[tokio::test]
    async fn test_file_changed_after_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunnelfin_1.0.0.1.zip");
        tokio::fs::write(&path, b"zip payload").await.unwrap();
        let checksum = checksum_file(&path).await.unwrap();
        assert!(verify_file(&path, &checksum).await.is_ok());

        tokio::fs::write(&path, b"rebuilt payload").await.unwrap();
        let result = verify_file(&path, &checksum).await;
        assert!(matches!(result, Err(DeployError::ChecksumMismatch { .. })));
    }
}
