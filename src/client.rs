//! Blocking HTTP client for the defect-detection service.
//!
//! The client is responsible for:
//! - Sending a validated `SelectedFile` to `POST {API_URL}/detect` as
//!   multipart form data (field `file`) with `Accept: application/json`
//! - Mapping every outcome onto `ClientError`
//! - Bounding the wait with an explicit timeout
//!
//! The client MUST NOT:
//! - Retry a failed request
//! - Alter the uploaded bytes

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::detection::DetectionResponse;
use crate::error::ClientError;
use crate::intake::SelectedFile;
use crate::multipart::{self, FilePart};

pub const UPLOAD_FIELD: &str = "file";
pub const BATCH_UPLOAD_FIELD: &str = "files";

/// `GET /` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub classes: Option<u32>,
}

/// `GET /classes` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassCatalog {
    pub classes: Vec<String>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub high_risk: Vec<String>,
    #[serde(default)]
    pub medium_risk: Vec<String>,
    #[serde(default)]
    pub low_risk: Vec<String>,
}

/// One entry of a `POST /detect-batch` reply. The service reports either a
/// result or an error string per file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<DetectionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    pub fn outcome(&self) -> Result<&DetectionResponse, ClientError> {
        match (&self.result, &self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(ClientError::ServerError {
                status: 200,
                message: error.clone(),
            }),
            (None, None) => Err(ClientError::MalformedResponse(format!(
                "no result for {}",
                self.filename
            ))),
        }
    }
}

/// `POST /detect-batch` payload, one item per uploaded file in upload order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItem>,
}

/// Anything that can turn a selected file into detections.
///
/// `DetectClient` is the HTTP implementation; the session drives uploads
/// through this trait so it can run them on worker threads.
pub trait Detector: Send + Sync {
    fn detect(&self, file: &SelectedFile) -> Result<DetectionResponse, ClientError>;
}

#[derive(Clone, Debug)]
pub struct DetectClient {
    agent: ureq::Agent,
    config: ClientConfig,
}

impl DetectClient {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            agent,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Uploads `file` and parses the detections.
    pub fn detect(&self, file: &SelectedFile) -> Result<DetectionResponse, ClientError> {
        let url = self.config.endpoint("detect");
        let body = multipart::encode_file(UPLOAD_FIELD, &file.name, &file.mime, &file.bytes);
        log::info!("sending {} ({} bytes) to {}", file.name, file.size(), url);

        let result = self
            .agent
            .post(&url)
            .set("Accept", "application/json")
            .set("Content-Type", &body.content_type())
            .send_bytes(&body.bytes);
        let raw = self.read_success(result)?;
        let response: DetectionResponse = serde_json::from_str(&raw)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        log::debug!("{} detections for {}", response.detections.len(), file.name);
        Ok(response)
    }

    /// Uploads every file in one request. The caller validates each file
    /// first; an empty slice sends nothing.
    pub fn detect_batch(&self, files: &[SelectedFile]) -> Result<BatchResponse, ClientError> {
        if files.is_empty() {
            return Ok(BatchResponse::default());
        }
        let url = self.config.endpoint("detect-batch");
        let parts: Vec<FilePart<'_>> = files
            .iter()
            .map(|file| FilePart {
                field: BATCH_UPLOAD_FIELD,
                file_name: &file.name,
                mime: &file.mime,
                data: &file.bytes,
            })
            .collect();
        let body = multipart::encode_files(&parts);
        let total: u64 = files.iter().map(SelectedFile::size).sum();
        log::info!("sending {} files ({} bytes) to {}", files.len(), total, url);

        let result = self
            .agent
            .post(&url)
            .set("Accept", "application/json")
            .set("Content-Type", &body.content_type())
            .send_bytes(&body.bytes);
        let raw = self.read_success(result)?;
        let response: BatchResponse = serde_json::from_str(&raw)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        if response.results.len() != files.len() {
            return Err(ClientError::MalformedResponse(format!(
                "expected {} batch results, got {}",
                files.len(),
                response.results.len()
            )));
        }
        Ok(response)
    }

    /// Service health check.
    pub fn health(&self) -> Result<ServiceHealth, ClientError> {
        self.get_json("")
    }

    /// Classes the deployed model can report, grouped by risk.
    pub fn classes(&self) -> Result<ClassCatalog, ClientError> {
        self.get_json("classes")
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.config.endpoint(path);
        log::debug!("GET {}", url);
        let result = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .call();
        let raw = self.read_success(result)?;
        serde_json::from_str(&raw).map_err(|e| ClientError::MalformedResponse(e.to_string()))
    }

    fn read_success(
        &self,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<String, ClientError> {
        match result {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .map_err(|e| self.map_io_error(e))?;
                if (200..300).contains(&status) {
                    log::debug!("response status {}", status);
                    Ok(body)
                } else {
                    log::warn!("unexpected response status {}", status);
                    Err(ClientError::from_status(status, Some(&body)))
                }
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().ok();
                let err = ClientError::from_status(status, body.as_deref());
                log::warn!("server rejected request ({}): {}", status, err);
                Err(err)
            }
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    log::warn!("request timed out: {}", transport);
                    Err(ClientError::TimeoutError(self.config.timeout))
                } else {
                    log::warn!("transport failure: {}", transport);
                    Err(ClientError::TransportError(transport.to_string()))
                }
            }
        }
    }

    fn map_io_error(&self, err: io::Error) -> ClientError {
        if is_timeout_kind(err.kind()) {
            ClientError::TimeoutError(self.config.timeout)
        } else {
            ClientError::TransportError(err.to_string())
        }
    }
}

impl Detector for DetectClient {
    fn detect(&self, file: &SelectedFile) -> Result<DetectionResponse, ClientError> {
        DetectClient::detect(self, file)
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if is_timeout_kind(io_err.kind()) {
                return true;
            }
        }
        source = err.source();
    }
    transport.to_string().contains("timed out")
}

fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Clamp for callers that accept a user-provided timeout in seconds.
pub fn timeout_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
