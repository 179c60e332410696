// Local file handling: digests and verified downloads

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use reportseal_crypto::{digest, digest_json, verify_artifact, ReportDigest};

/// Digest of a file's bytes, or of its canonical JSON form when `canonical_json` is set.
///
/// Canonical JSON digests are stable across key order and whitespace, so
/// two semantically equal report objects hash the same.
pub fn digest_file(path: &Path, canonical_json: bool) -> Result<ReportDigest> {
    let bytes = read_file(path)?;
    if canonical_json {
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| anyhow!("'{}' is not valid JSON: {}", path.display(), e))?;
        digest_json(&value)
    } else {
        Ok(digest(&bytes))
    }
}

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| anyhow!("Failed to read '{}': {}", path.display(), e))
}

/// File name to send with an upload.
pub fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "report.pdf".to_string())
}

/// `report-{cid}.pdf` in the current directory.
pub fn default_download_path(cid: &str) -> PathBuf {
    PathBuf::from(format!("report-{}.pdf", cid))
}

/// Writes downloaded bytes to `path`. With `expected`, the digest is checked
/// first and nothing is written on mismatch.
pub fn save_download(bytes: &[u8], path: &Path, expected: Option<&ReportDigest>) -> Result<ReportDigest> {
    let actual = match expected {
        Some(expected) => verify_artifact(bytes, expected)?,
        None => digest(bytes),
    };
    std::fs::write(path, bytes).map_err(|e| anyhow!("Failed to write '{}': {}", path.display(), e))?;
    Ok(actual)
}
