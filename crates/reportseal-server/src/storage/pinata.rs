//! Pinata pinning API and IPFS gateway client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use reportseal_crypto::{Cid, StorageReceipt};
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use super::{
    parse_cid, truncate_chars, ContentStore, DownloadStream, StorageError, UploadMetadata,
    DEFAULT_CONTENT_TYPE, GATEWAY_DETAILS_LIMIT,
};
use crate::config::{gateway_url, StorageConfig, StorageCredentials};

const PIN_FILE_PATH: &str = "/pinning/pinFileToIPFS";

/// Response fields that may carry the CID, in order of preference.
const CID_FIELDS: [&str; 3] = ["IpfsHash", "cid", "Hash"];

/// Client for the Pinata API.
///
/// Holds one pooled `reqwest::Client`; connections are released when the
/// client is dropped.
pub struct PinataClient {
    http: reqwest::Client,
    config: StorageConfig,
    timeout: Duration,
}

impl PinataClient {
    pub fn new(config: StorageConfig, timeout: Duration) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| StorageError::Unavailable {
                message: format!("Failed to build HTTP client: {}", e),
                status: None,
            })?;
        Ok(Self { http, config, timeout })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.credentials {
            StorageCredentials::Bearer(token) => request.bearer_auth(token.expose_secret()),
            StorageCredentials::KeyPair { api_key, secret_api_key } => request
                .header("pinata_api_key", api_key)
                .header("pinata_secret_api_key", secret_api_key.expose_secret()),
        }
    }
}

/// Pulls a human-readable message out of a Pinata error body.
fn error_message(body: &Value, status: StatusCode) -> String {
    match body.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(obj)) => {
            let reason = obj.get("reason").and_then(Value::as_str);
            let details = obj.get("details").and_then(Value::as_str);
            match (reason, details) {
                (Some(r), Some(d)) => format!("{}: {}", r, d),
                (Some(r), None) => r.to_string(),
                (None, Some(d)) => d.to_string(),
                (None, None) => status.to_string(),
            }
        }
        _ => body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string()),
    }
}

/// Maps a non-2xx upload response into the storage taxonomy.
pub(crate) fn classify_upload_failure(status: StatusCode, body: &str) -> StorageError {
    let parsed: Value = serde_json::from_str(body)
        .unwrap_or_else(|_| Value::String(truncate_chars(body, GATEWAY_DETAILS_LIMIT)));
    let message = error_message(&parsed, status);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || status.is_server_error() {
        StorageError::Unavailable {
            message,
            status: Some(status.as_u16()),
        }
    } else {
        StorageError::Rejected {
            status: status.as_u16(),
            message,
            details: parsed,
        }
    }
}

/// Extracts and validates the CID from a successful upload response.
pub(crate) fn cid_from_response(status: StatusCode, body: &str) -> Result<Cid, StorageError> {
    let rejected = |message: String, details: Value| StorageError::Rejected {
        status: status.as_u16(),
        message,
        details,
    };

    let parsed: Value = serde_json::from_str(body).map_err(|_| {
        rejected(
            "Malformed response from storage service".to_string(),
            Value::String(truncate_chars(body, GATEWAY_DETAILS_LIMIT)),
        )
    })?;

    let raw = CID_FIELDS
        .iter()
        .find_map(|field| parsed.get(*field).and_then(Value::as_str))
        .ok_or_else(|| rejected("Storage service response did not include a CID".to_string(), parsed.clone()))?;

    raw.parse::<Cid>()
        .map_err(|e| rejected(format!("Storage service returned an invalid CID: {}", e), parsed.clone()))
}

#[async_trait]
impl ContentStore for PinataClient {
    async fn upload(&self, bytes: Bytes, metadata: UploadMetadata) -> Result<StorageReceipt, StorageError> {
        let size = bytes.len();
        let pinata_metadata = json!({
            "name": metadata.name,
            "keyvalues": {
                "uploadedBy": metadata.uploaded_by,
                "digest": metadata.digest.to_string(),
            }
        });
        let form = Form::new()
            .part("file", Part::bytes(bytes.to_vec()).file_name(metadata.name.clone()))
            .text("pinataMetadata", pinata_metadata.to_string())
            .text("pinataOptions", json!({ "cidVersion": 0 }).to_string());

        tracing::info!(
            name = %metadata.name,
            size,
            digest = %metadata.digest,
            "Uploading artifact to pinning service"
        );

        let url = format!("{}{}", self.config.api_url, PIN_FILE_PATH);
        let response = self
            .authorize(self.http.post(&url))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable {
                message: format!("Upload request failed: {}", e),
                status: None,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| StorageError::Unavailable {
            message: format!("Failed to read upload response: {}", e),
            status: Some(status.as_u16()),
        })?;

        if !status.is_success() {
            let err = classify_upload_failure(status, &body);
            tracing::warn!(status = status.as_u16(), error = %err, "Pinning service refused upload");
            return Err(err);
        }

        let cid = cid_from_response(status, &body)?;
        let retrieval_url = self.retrieval_url(&cid);
        tracing::info!(cid = %cid, "Artifact pinned");

        Ok(StorageReceipt { cid, retrieval_url })
    }

    async fn download(&self, cid: &str) -> Result<DownloadStream, StorageError> {
        let cid = parse_cid(cid)?;
        let url = self.retrieval_url(&cid);
        tracing::debug!(cid = %cid, url = %url, "Fetching artifact from gateway");

        // Only the response head is bounded; the body streams for as long as the caller reads.
        let response = tokio::time::timeout(self.timeout, self.http.get(&url).send())
            .await
            .map_err(|_| StorageError::Unavailable {
                message: format!("Gateway did not respond within {:?}", self.timeout),
                status: None,
            })?
            .map_err(|e| StorageError::Unavailable {
                message: format!("Gateway request failed: {}", e),
                status: None,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound { cid: cid.to_string() });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(cid = %cid, status = status.as_u16(), "Gateway error");
            return Err(StorageError::Gateway {
                status: status.as_u16(),
                details: truncate_chars(&body, GATEWAY_DETAILS_LIMIT),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let content_length = response.content_length();

        let body = response
            .bytes_stream()
            .map_err(|e| StorageError::Unavailable {
                message: format!("Gateway stream interrupted: {}", e),
                status: None,
            })
            .boxed();

        Ok(DownloadStream {
            cid,
            content_type,
            content_length,
            body,
        })
    }

    fn retrieval_url(&self, cid: &Cid) -> String {
        gateway_url(&self.config.gateway, cid.as_str())
    }
}
