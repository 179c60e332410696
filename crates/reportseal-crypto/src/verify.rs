// Artifact verification against an expected digest

use anyhow::{anyhow, Result};

use crate::hash::{digest, ReportDigest};

/// Recomputes the digest of `bytes` and compares it to `expected`.
///
/// # Returns
/// The computed digest if it matches, an error naming both digests otherwise.
pub fn verify_artifact(bytes: &[u8], expected: &ReportDigest) -> Result<ReportDigest> {
    let computed = digest(bytes);
    if &computed != expected {
        return Err(anyhow!(
            "Hash mismatch: content does not match expected digest.\n\
             Expected: {}\n\
             Computed: {}",
            expected,
            computed
        ));
    }
    Ok(computed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_matching_content() {
        let bytes = b"report-v1";
        let expected = digest(bytes);
        let result = verify_artifact(bytes, &expected);
        assert_eq!(result.unwrap(), expected);
    }

    #[test]
    fn test_verify_fails_on_tampered_content() {
        let expected = digest(b"report-v1");
        let result = verify_artifact(b"report-v2", &expected);

        let err = result.unwrap_err().to_string();
        assert!(err.contains("Hash mismatch"));
        assert!(err.contains(&expected.to_string()));
    }
}
