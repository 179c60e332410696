//! Integration tests for the Pinata store client.
//!
//! An in-process server stands in for both the pinning API and the IPFS
//! gateway, so the client's real HTTP path runs without network access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use reportseal_crypto::{digest, Cid};
use reportseal_server::config::StorageConfig;
use reportseal_server::storage::{ContentStore, PinataClient, StorageError, UploadMetadata};
use reportseal_server::Config;
use serde_json::{json, Value};

const OWNER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
const PDF: &[u8] = b"%PDF-1.4 report-v1";

/// One request seen by the pinning endpoint.
struct RecordedUpload {
    headers: HeaderMap,
    parts: Vec<String>,
    filename: Option<String>,
    metadata: Value,
    options: Value,
}

#[derive(Default)]
struct FakePinata {
    pinned: HashMap<String, Vec<u8>>,
    uploads: Vec<RecordedUpload>,
    gateway_hits: usize,
    /// Answer every upload with this status and body.
    upload_failure: Option<(StatusCode, String)>,
    /// Answer every gateway request with this status and body.
    gateway_failure: Option<(StatusCode, String)>,
    /// Content type the gateway sends; none when unset.
    content_type: Option<&'static str>,
}

type SharedPinata = Arc<Mutex<FakePinata>>;

async fn pin_file(State(fake): State<SharedPinata>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    let mut upload = RecordedUpload {
        headers,
        parts: Vec::new(),
        filename: None,
        metadata: Value::Null,
        options: Value::Null,
    };
    let mut file = Vec::new();

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                upload.filename = field.file_name().map(str::to_string);
                file = field.bytes().await.unwrap().to_vec();
            }
            "pinataMetadata" => upload.metadata = serde_json::from_str(&field.text().await.unwrap()).unwrap(),
            "pinataOptions" => upload.options = serde_json::from_str(&field.text().await.unwrap()).unwrap(),
            _ => {}
        }
        upload.parts.push(name);
    }

    let mut fake = fake.lock().unwrap();
    fake.uploads.push(upload);
    if let Some((status, body)) = fake.upload_failure.clone() {
        return (status, body).into_response();
    }

    let cid = Cid::v0_from_sha256(digest(&file).as_bytes()).to_string();
    let size = file.len();
    fake.pinned.insert(cid.clone(), file);
    Json(json!({
        "IpfsHash": cid,
        "PinSize": size,
        "Timestamp": "2024-01-01T00:00:00Z",
    }))
    .into_response()
}

async fn gateway(State(fake): State<SharedPinata>, Path(cid): Path<String>) -> Response {
    let mut fake = fake.lock().unwrap();
    fake.gateway_hits += 1;
    if let Some((status, body)) = fake.gateway_failure.clone() {
        return (status, body).into_response();
    }
    match fake.pinned.get(&cid) {
        Some(bytes) => {
            let mut response = Response::new(Body::from(bytes.clone()));
            if let Some(content_type) = fake.content_type {
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            response
        }
        None => (StatusCode::NOT_FOUND, "not pinned").into_response(),
    }
}

async fn spawn_pinata(fake: FakePinata) -> (String, SharedPinata) {
    let shared = Arc::new(Mutex::new(fake));
    let app = Router::new()
        .route("/pinning/pinFileToIPFS", post(pin_file))
        .route("/ipfs/{cid}", get(gateway))
        .with_state(shared.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), shared)
}

/// Storage section built the way the server builds it, pointed at `base_url`.
fn storage_config(base_url: &str, credentials: &[(&str, &str)]) -> StorageConfig {
    let mut env: HashMap<&str, &str> = HashMap::from([("PINATA_API_URL", base_url), ("PINATA_GATEWAY", base_url)]);
    env.extend(credentials.iter().copied());
    let config = Config::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();
    config.storage().unwrap().clone()
}

async fn client_for(fake: FakePinata, credentials: &[(&str, &str)]) -> (PinataClient, SharedPinata, String) {
    let (url, shared) = spawn_pinata(fake).await;
    let client = PinataClient::new(storage_config(&url, credentials), Duration::from_secs(5)).unwrap();
    (client, shared, url)
}

fn metadata(content: &[u8]) -> UploadMetadata {
    UploadMetadata {
        name: "report.pdf".to_string(),
        uploaded_by: OWNER.to_string(),
        digest: digest(content),
    }
}

#[tokio::test]
async fn test_upload_then_download_roundtrip() {
    let (client, fake, url) = client_for(FakePinata::default(), &[("PINATA_JWT", "test-jwt")]).await;

    let receipt = client.upload(Bytes::from_static(PDF), metadata(PDF)).await.unwrap();
    let expected_cid = Cid::v0_from_sha256(digest(PDF).as_bytes());
    assert_eq!(receipt.cid, expected_cid);
    assert_eq!(receipt.retrieval_url, format!("{}/ipfs/{}", url, expected_cid));

    let download = client.download(receipt.cid.as_str()).await.unwrap();
    assert_eq!(download.content_type, "application/pdf");
    assert_eq!(download.content_length, Some(PDF.len() as u64));
    assert_eq!(download.filename(), format!("report-{}.pdf", expected_cid));
    assert_eq!(download.into_bytes().await.unwrap(), PDF);

    assert_eq!(fake.lock().unwrap().gateway_hits, 1);
}

#[tokio::test]
async fn test_upload_sends_bearer_token_and_form_parts() {
    let (client, fake, _url) = client_for(FakePinata::default(), &[("PINATA_JWT", "test-jwt")]).await;

    client.upload(Bytes::from_static(PDF), metadata(PDF)).await.unwrap();

    let fake = fake.lock().unwrap();
    assert_eq!(fake.uploads.len(), 1);
    let upload = &fake.uploads[0];
    assert_eq!(upload.headers[header::AUTHORIZATION], "Bearer test-jwt");
    assert!(!upload.headers.contains_key("pinata_api_key"));
    assert_eq!(upload.parts, vec!["file", "pinataMetadata", "pinataOptions"]);
    assert_eq!(upload.filename.as_deref(), Some("report.pdf"));
    assert_eq!(upload.metadata["name"], "report.pdf");
    assert_eq!(upload.metadata["keyvalues"]["uploadedBy"], OWNER);
    assert_eq!(upload.metadata["keyvalues"]["digest"], digest(PDF).to_string());
    assert_eq!(upload.options, json!({ "cidVersion": 0 }));
}

#[tokio::test]
async fn test_upload_sends_key_pair_headers() {
    let (client, fake, _url) = client_for(
        FakePinata::default(),
        &[("PINATA_API_KEY", "key-123"), ("PINATA_SECRET_API_KEY", "secret-456")],
    )
    .await;

    client.upload(Bytes::from_static(PDF), metadata(PDF)).await.unwrap();

    let fake = fake.lock().unwrap();
    let headers = &fake.uploads[0].headers;
    assert_eq!(headers["pinata_api_key"], "key-123");
    assert_eq!(headers["pinata_secret_api_key"], "secret-456");
    assert!(!headers.contains_key(header::AUTHORIZATION));
}

#[tokio::test]
async fn test_upload_auth_failure_is_unavailable() {
    let fake = FakePinata {
        upload_failure: Some((
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"reason":"INVALID_CREDENTIALS","details":"Invalid API key"}}"#.to_string(),
        )),
        ..FakePinata::default()
    };
    let (client, _fake, _url) = client_for(fake, &[("PINATA_JWT", "expired")]).await;

    match client.upload(Bytes::from_static(PDF), metadata(PDF)).await.unwrap_err() {
        StorageError::Unavailable { message, status } => {
            assert_eq!(status, Some(401));
            assert_eq!(message, "INVALID_CREDENTIALS: Invalid API key");
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_client_error_is_rejected() {
    let fake = FakePinata {
        upload_failure: Some((StatusCode::BAD_REQUEST, r#"{"error":"Invalid file"}"#.to_string())),
        ..FakePinata::default()
    };
    let (client, _fake, _url) = client_for(fake, &[("PINATA_JWT", "test-jwt")]).await;

    match client.upload(Bytes::from_static(PDF), metadata(PDF)).await.unwrap_err() {
        StorageError::Rejected { status, message, details } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid file");
            assert_eq!(details["error"], "Invalid file");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_pinning_service() {
    let config = storage_config("http://127.0.0.1:1", &[("PINATA_JWT", "test-jwt")]);
    let client = PinataClient::new(config, Duration::from_secs(2)).unwrap();

    let err = client.upload(Bytes::from_static(PDF), metadata(PDF)).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable { status: None, .. }));
}

#[tokio::test]
async fn test_gateway_content_type_is_forwarded() {
    let fake = FakePinata {
        content_type: Some("application/octet-stream"),
        ..FakePinata::default()
    };
    let (client, _fake, _url) = client_for(fake, &[("PINATA_JWT", "test-jwt")]).await;

    let receipt = client.upload(Bytes::from_static(PDF), metadata(PDF)).await.unwrap();
    let download = client.download(receipt.cid.as_str()).await.unwrap();
    assert_eq!(download.content_type, "application/octet-stream");
}

#[tokio::test]
async fn test_gateway_404_is_not_found() {
    let (client, _fake, _url) = client_for(FakePinata::default(), &[("PINATA_JWT", "test-jwt")]).await;
    let unknown = Cid::v0_from_sha256(digest(b"never pinned").as_bytes());

    match client.download(unknown.as_str()).await.unwrap_err() {
        StorageError::NotFound { cid } => assert_eq!(cid, unknown.to_string()),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_cid_skips_the_gateway() {
    let (client, fake, _url) = client_for(FakePinata::default(), &[("PINATA_JWT", "test-jwt")]).await;

    let err = client.download("bogus-cid").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
    assert_eq!(fake.lock().unwrap().gateway_hits, 0);
}

#[tokio::test]
async fn test_gateway_error_body_is_truncated() {
    let fake = FakePinata {
        gateway_failure: Some((StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(800))),
        ..FakePinata::default()
    };
    let (client, _fake, _url) = client_for(fake, &[("PINATA_JWT", "test-jwt")]).await;
    let cid = Cid::v0_from_sha256(digest(PDF).as_bytes());

    match client.download(cid.as_str()).await.unwrap_err() {
        StorageError::Gateway { status, details } => {
            assert_eq!(status, 500);
            assert_eq!(details.len(), 500);
        }
        other => panic!("expected Gateway, got {:?}", other),
    }
}
