//! Minimal `multipart/form-data` encoder for file uploads.

use rand::distributions::Alphanumeric;
use rand::Rng;

const BOUNDARY_PREFIX: &str = "----defect-inspector-";
const BOUNDARY_RANDOM_LEN: usize = 24;

/// An encoded form body together with its `Content-Type` header value.
#[derive(Debug)]
pub struct MultipartBody {
    pub boundary: String,
    pub bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// One file part of a form body.
#[derive(Clone, Copy, Debug)]
pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub mime: &'a str,
    pub data: &'a [u8],
}

/// Encodes one file part under `field`.
pub fn encode_file(field: &str, file_name: &str, mime: &str, data: &[u8]) -> MultipartBody {
    encode_files(&[FilePart {
        field,
        file_name,
        mime,
        data,
    }])
}

/// Encodes every part in order; repeated field names form a list.
pub fn encode_files(parts: &[FilePart<'_>]) -> MultipartBody {
    let mut boundary = random_boundary();
    while parts
        .iter()
        .any(|part| contains(part.data, boundary.as_bytes()))
    {
        boundary = random_boundary();
    }

    let payload: usize = parts.iter().map(|part| part.data.len() + 256).sum();
    let mut bytes = Vec::with_capacity(payload + 64);
    for part in parts {
        bytes.extend_from_slice(b"--");
        bytes.extend_from_slice(boundary.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                escape_quoted(part.field),
                escape_quoted(part.file_name)
            )
            .as_bytes(),
        );
        bytes.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.mime).as_bytes());
        bytes.extend_from_slice(part.data);
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(b"--");
    bytes.extend_from_slice(boundary.as_bytes());
    bytes.extend_from_slice(b"--\r\n");

    MultipartBody { boundary, bytes }
}

fn random_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", BOUNDARY_PREFIX, suffix)
}

fn escape_quoted(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '"' => "%22".to_string(),
            '\r' => "%0D".to_string(),
            '\n' => "%0A".to_string(),
            other => other.to_string(),
        })
        .collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
