use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to the user for a single upload cycle.
///
/// None of these are fatal: the session stays usable and the next selection
/// starts a fresh cycle. Intake errors (`InvalidType`, `TooLarge`,
/// `InvalidImage`) are raised before any request is sent.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("unsupported file type '{mime}'; expected an image")]
    InvalidType { mime: String },
    #[error("file is {size} bytes; the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("image could not be decoded: {0}")]
    InvalidImage(String),
    #[error("failed to read selected file: {0}")]
    Io(#[from] std::io::Error),
    #[error("{message}")]
    ServerError { status: u16, message: String },
    #[error("request failed: {0}")]
    TransportError(String),
    #[error("request timed out after {}s", .0.as_secs_f64())]
    TimeoutError(Duration),
    #[error("malformed detection response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    /// Builds a `ServerError` from a non-2xx status and its (optional) body.
    ///
    /// A body of the form `{"detail": "<non-empty string>"}` supplies the
    /// message verbatim; anything else yields `Server error: <status>`.
    pub fn from_status(status: u16, body: Option<&str>) -> Self {
        let message = body
            .and_then(|raw| serde_json::from_str::<ErrorBody>(raw).ok())
            .and_then(|parsed| parsed.detail)
            .filter(|detail| !detail.is_empty())
            .unwrap_or_else(|| format!("Server error: {}", status));
        ClientError::ServerError { status, message }
    }

    /// True for errors raised before any network request was attempted.
    pub fn is_intake(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidType { .. }
                | ClientError::TooLarge { .. }
                | ClientError::InvalidImage(_)
                | ClientError::Io(_)
        )
    }
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default, deserialize_with = "string_detail")]
    detail: Option<String>,
}

// FastAPI validation failures return `detail` as a list; only strings count.
fn string_detail<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: serde_json::Value = serde::Deserialize::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(detail) => Some(detail),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_surfaced_verbatim() {
        let err = ClientError::from_status(415, Some(r#"{"detail":"unsupported format"}"#));
        assert_eq!(err.to_string(), "unsupported format");
    }

    #[test]
    fn unparsable_body_synthesizes_message() {
        let err = ClientError::from_status(500, Some("<html>Internal Server Error</html>"));
        assert_eq!(err.to_string(), "Server error: 500");
        let err = ClientError::from_status(502, None);
        assert_eq!(err.to_string(), "Server error: 502");
    }

    #[test]
    fn non_string_or_empty_detail_falls_back() {
        let err = ClientError::from_status(
            422,
            Some(r#"{"detail":[{"loc":["body","file"],"msg":"field required"}]}"#),
        );
        assert_eq!(err.to_string(), "Server error: 422");
        let err = ClientError::from_status(400, Some(r#"{"detail":""}"#));
        assert_eq!(err.to_string(), "Server error: 400");
    }

    #[test]
    fn intake_classification() {
        assert!(ClientError::InvalidType {
            mime: "text/plain".into()
        }
        .is_intake());
        assert!(!ClientError::TransportError("refused".into()).is_intake());
    }
}
