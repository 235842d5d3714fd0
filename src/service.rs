use crate::error::ServiceError;
use crate::types::*;
use crate::upload_slots::UploadSlots;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The remote beat-analysis backend. It does the DTW work; this crate
/// only consumes its HTTP contract.
pub trait AnalysisService: Send + Sync {
    fn upload(&self, slots: &UploadSlots) -> Result<UploadResponse, ServiceError>;
    fn analyze(&self, session_id: &str, beat_index: usize) -> Result<AnalysisResult, ServiceError>;
    fn get_beat(&self, session_id: &str, beat_index: usize) -> Result<BeatData, ServiceError>;
    fn cleanup(&self, session_id: &str) -> Result<CleanupReceipt, ServiceError>;
    fn health(&self) -> Result<HealthStatus, ServiceError>;
}

/// Connection settings for [`HttpAnalysisService`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Blocking HTTP client for the backend.
pub struct HttpAnalysisService {
    agent: ureq::Agent,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl HttpAnalysisService {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout.min(Duration::from_secs(10)))
            .timeout(config.timeout)
            .build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a ureq outcome into a decoded body or a classified error.
/// `fallback` is the message used when a rejection carries no `error` field.
fn finish<T: DeserializeOwned>(
    result: Result<ureq::Response, ureq::Error>,
    fallback: &str,
) -> Result<T, ServiceError> {
    match result {
        Ok(resp) => serde_json::from_reader(resp.into_reader())
            .map_err(|e| ServiceError::Decode(e.to_string())),
        Err(ureq::Error::Status(status, resp)) => {
            let message = resp
                .into_string()
                .ok()
                .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
                .and_then(|b| b.error)
                .unwrap_or_else(|| fallback.to_string());
            Err(ServiceError::Rejected { status, message })
        }
        Err(ureq::Error::Transport(t)) => Err(ServiceError::Connectivity(t.to_string())),
    }
}

impl AnalysisService for HttpAnalysisService {
    fn upload(&self, slots: &UploadSlots) -> Result<UploadResponse, ServiceError> {
        let boundary = make_boundary();
        let body = encode_multipart(slots, &boundary);
        debug!("POST /upload ({} bytes, {} parts)", body.len(), slots.iter().count());
        let result = self
            .agent
            .post(&self.url("/upload"))
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body);
        finish(result, "Upload failed")
    }

    fn analyze(&self, session_id: &str, beat_index: usize) -> Result<AnalysisResult, ServiceError> {
        let path = format!("/analyze/{}/{}", session_id, beat_index);
        debug!("GET {}", path);
        finish(self.agent.get(&self.url(&path)).call(), "Analysis failed")
    }

    fn get_beat(&self, session_id: &str, beat_index: usize) -> Result<BeatData, ServiceError> {
        let path = format!("/get_beat/{}/{}", session_id, beat_index);
        debug!("GET {}", path);
        finish(self.agent.get(&self.url(&path)).call(), "Failed to get beat")
    }

    fn cleanup(&self, session_id: &str) -> Result<CleanupReceipt, ServiceError> {
        let path = format!("/cleanup/{}", session_id);
        debug!("DELETE {}", path);
        finish(self.agent.delete(&self.url(&path)).call(), "Cleanup failed")
    }

    fn health(&self) -> Result<HealthStatus, ServiceError> {
        // Any non-2xx counts as "not available", whatever the body says.
        match self.agent.get(&self.url("/health")).call() {
            Ok(resp) => serde_json::from_reader(resp.into_reader())
                .map_err(|e| ServiceError::Decode(e.to_string())),
            Err(ureq::Error::Status(status, _)) => Err(ServiceError::Rejected {
                status,
                message: "Backend is not available".into(),
            }),
            Err(ureq::Error::Transport(t)) => Err(ServiceError::Connectivity(t.to_string())),
        }
    }
}

// ─── multipart/form-data ────────────────────────────────────────────────────

fn make_boundary() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("----ecgworkflow{:x}", nanos)
}

/// Encode every populated slot as a file part named after its extension
/// (`atr`, `dat`, `hea`, `xws`).
pub fn encode_multipart(slots: &UploadSlots, boundary: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (kind, file) in slots.iter() {
        let filename = file.name.replace(['"', '\r', '\n'], "_");
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                kind.part_name(),
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}
