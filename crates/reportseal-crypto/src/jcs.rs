// JCS (JSON Canonicalization Scheme) - RFC 8785
//
// Structured reports are hashed over their canonical JSON so that key order
// and whitespace never change the digest.

use anyhow::Result;
use serde::Serialize;

use crate::hash::{digest, ReportDigest};

/// Canonicalizes a serializable value according to RFC 8785 (JCS) and returns the UTF-8 bytes.
///
/// - Object keys are sorted lexicographically
/// - No insignificant whitespace
/// - Numbers are serialized consistently
pub fn jcs_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let canonical = serde_jcs::to_string(value)?;
    Ok(canonical.into_bytes())
}

/// Digest of the canonical JSON form of a structured report.
pub fn digest_json<T: Serialize>(value: &T) -> Result<ReportDigest> {
    let bytes = jcs_canonical_bytes(value)?;
    Ok(digest(&bytes))
}
