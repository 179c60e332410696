// HTTP client for the ReportSeal API
//
// Blocking calls; the CLI does one request per command. JSON calls go through
// ureq, file uploads through reqwest's multipart encoder.

use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::Url;
use serde_json::{json, Value};

/// Artifacts larger than this are refused on download.
const MAX_DOWNLOAD_BYTES: u64 = 256 * 1024 * 1024;

pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
    uploads: reqwest::blocking::Client,
}

impl ApiClient {
    pub fn new(server: &str, timeout: Duration) -> Result<Self> {
        let uploads = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            base_url: format!("{}/api/v1", server.trim_end_matches('/')),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            uploads,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL with each segment percent-encoded, so owners and digests stay one path segment.
    pub fn segment_url(&self, segments: &[&str]) -> Result<String> {
        let mut url = Url::parse(&self.base_url).map_err(|e| anyhow!("Invalid server URL '{}': {}", self.base_url, e))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Server URL '{}' cannot have a path", self.base_url))?
            .extend(segments);
        Ok(url.into())
    }

    /// POST /verify with the file as multipart.
    pub fn verify(&self, filename: &str, bytes: &[u8]) -> Result<Value> {
        let form = Form::new().part("file", report_part(filename, bytes)?);
        self.send_form("/verify", form)
    }

    /// POST /storage/upload: pins, anchors and records the file.
    pub fn upload(&self, filename: &str, bytes: &[u8], owner: &str) -> Result<Value> {
        let form = Form::new()
            .part("file", report_part(filename, bytes)?)
            .text("ownerIdentity", owner.to_string());
        self.send_form("/storage/upload", form)
    }

    pub fn anchor(&self, digest: &str, owner: Option<&str>) -> Result<Value> {
        let mut payload = json!({ "digest": digest });
        if let Some(owner) = owner {
            payload["ownerIdentity"] = json!(owner);
        }
        json_response(self.agent.post(&self.url("/anchor")).send_json(payload))
    }

    pub fn lookup(&self, digest: &str) -> Result<Value> {
        json_response(self.agent.get(&self.segment_url(&["ledger", digest])?).call())
    }

    pub fn reports(&self, owner: &str) -> Result<Value> {
        json_response(self.agent.get(&self.segment_url(&["reports", owner])?).call())
    }

    pub fn diagnostics(&self) -> Result<Value> {
        json_response(self.agent.get(&self.url("/diagnostics")).call())
    }

    /// GET /storage/download, read fully into memory.
    pub fn download(&self, cid: &str) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.url("/storage/download"))
            .query("cid", cid)
            .call()
            .map_err(api_error)?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_DOWNLOAD_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| anyhow!("Failed to read download body: {}", e))?;
        if bytes.len() as u64 > MAX_DOWNLOAD_BYTES {
            return Err(anyhow!("Download exceeds {} bytes", MAX_DOWNLOAD_BYTES));
        }
        Ok(bytes)
    }

    fn send_form(&self, path: &str, form: Form) -> Result<Value> {
        let response = self
            .uploads
            .post(self.url(path))
            .multipart(form)
            .send()
            .map_err(|e| anyhow!("Could not reach server: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| anyhow!("Failed to read server response: {}", e))?;
        if !status.is_success() {
            return Err(anyhow!(describe_error_body(status.as_u16(), &body)));
        }
        serde_json::from_str(&body).map_err(|e| anyhow!("Server returned invalid JSON: {}", e))
    }
}

fn report_part(filename: &str, bytes: &[u8]) -> Result<Part> {
    Part::bytes(bytes.to_vec())
        .file_name(filename.to_string())
        .mime_str("application/pdf")
        .map_err(|e| anyhow!("Invalid content type: {}", e))
}

fn json_response(result: Result<ureq::Response, ureq::Error>) -> Result<Value> {
    let response = result.map_err(api_error)?;
    response
        .into_json::<Value>()
        .map_err(|e| anyhow!("Server returned invalid JSON: {}", e))
}

/// Turns a failed call into an error carrying the server's `kind` and message.
fn api_error(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            anyhow!(describe_error_body(status, &body))
        }
        ureq::Error::Transport(transport) => anyhow!("Could not reach server: {}", transport),
    }
}

/// Formats a structured error body, falling back to the raw text.
pub fn describe_error_body(status: u16, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            let kind = value["kind"].as_str().unwrap_or("Error");
            let message = value["error"].as_str().unwrap_or(body);
            let mut text = format!("{} ({}): {}", kind, status, message);
            if let Some(cid) = value["details"]["cid"].as_str() {
                text.push_str(&format!("\n  Pinned as {}; retry with `reportseal anchor --digest`", cid));
            }
            text
        }
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => format!("HTTP {}: {}", status, body.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    /// Accepts one request, answers with `status_line` and `body`, and hands
    /// back the raw request bytes.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !multipart_complete(&request) {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            request
        });
        (format!("http://{}", addr), handle)
    }

    fn boundary_of(request: &str) -> Option<String> {
        let start = request.find("boundary=")? + "boundary=".len();
        Some(
            request[start..]
                .chars()
                .take_while(|c| !c.is_whitespace() && *c != ';')
                .collect(),
        )
    }

    fn multipart_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        match boundary_of(&text) {
            Some(boundary) => text.contains(&format!("--{}--", boundary)),
            None => false,
        }
    }

    #[test]
    fn test_base_url() {
        let client = ApiClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/verify"), "http://localhost:8080/api/v1/verify");
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let client = ApiClient::new("http://localhost:8080", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.segment_url(&["reports", "team/a b?c"]).unwrap(),
            "http://localhost:8080/api/v1/reports/team%2Fa%20b%3Fc"
        );
        assert_eq!(
            client.segment_url(&["ledger", "0xabc"]).unwrap(),
            "http://localhost:8080/api/v1/ledger/0xabc"
        );
    }

    #[test]
    fn test_upload_sends_file_and_owner() {
        let (server, handle) = serve_once("200 OK", r#"{"success":true,"cid":"QmcJeHfgcbKdRgGZjnh3nG93GSaViFHaGkVq9NLksST1Hi"}"#);
        let client = ApiClient::new(&server, Duration::from_secs(5)).unwrap();
        // Payload containing a boundary-looking line must survive intact
        let payload: &[u8] = b"%PDF-1.4\r\n----reportseal-boundary\r\nbinary";

        let result = client.upload("audit.pdf", payload, "0xabc").unwrap();
        assert_eq!(result["cid"], "QmcJeHfgcbKdRgGZjnh3nG93GSaViFHaGkVq9NLksST1Hi");

        let request = String::from_utf8_lossy(&handle.join().unwrap()).to_string();
        assert!(request.starts_with("POST /api/v1/storage/upload "));
        let boundary = boundary_of(&request).unwrap();
        assert!(!String::from_utf8_lossy(payload).contains(&boundary));
        assert!(request.contains("name=\"file\"; filename=\"audit.pdf\""));
        assert!(request.contains(&*String::from_utf8_lossy(payload)));
        assert!(request.contains("name=\"ownerIdentity\"\r\n\r\n0xabc\r\n"));
    }

    #[test]
    fn test_verify_error_uses_structured_body() {
        let (server, handle) = serve_once(
            "503 Service Unavailable",
            r#"{"success":false,"error":"Ledger unavailable","kind":"LedgerUnavailable","statusCode":503,"details":null}"#,
        );
        let client = ApiClient::new(&server, Duration::from_secs(5)).unwrap();

        let err = client.verify("report.pdf", b"report-v1").unwrap_err();
        assert_eq!(err.to_string(), "LedgerUnavailable (503): Ledger unavailable");
        handle.join().unwrap();
    }

    #[test]
    fn test_describe_structured_error() {
        let body = r#"{"success":false,"error":"Missing required configuration: AVALANCHE_CONTRACT_ADDRESS is not set","kind":"Misconfigured","statusCode":500,"details":{"variable":"AVALANCHE_CONTRACT_ADDRESS"}}"#;
        let text = describe_error_body(500, body);
        assert!(text.starts_with("Misconfigured (500): "));
        assert!(text.contains("AVALANCHE_CONTRACT_ADDRESS"));
    }

    #[test]
    fn test_describe_partial_error_mentions_cid() {
        let body = r#"{"success":false,"error":"Report stored but not anchored","kind":"LedgerUnavailable","statusCode":503,"details":{"cid":"QmcJeHfgcbKdRgGZjnh3nG93GSaViFHaGkVq9NLksST1Hi"}}"#;
        let text = describe_error_body(503, body);
        assert!(text.contains("Pinned as QmcJeHfgcbKdRgGZjnh3nG93GSaViFHaGkVq9NLksST1Hi"));
    }

    #[test]
    fn test_describe_plain_error() {
        assert_eq!(describe_error_body(502, "bad gateway"), "HTTP 502: bad gateway");
        assert_eq!(describe_error_body(404, ""), "HTTP 404");
    }
}
