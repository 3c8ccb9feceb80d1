//! File intake.
//!
//! This module turns a user selection into a `SelectedFile`, validates it and
//! decodes a local `Preview` before any network call is made.
//!
//! Intake is responsible for:
//! - Reading the selected file and determining its MIME type
//! - Rejecting non-image types and oversized files
//! - Decoding the image at its natural size for preview and annotation
//!
//! Intake MUST NOT:
//! - Resize, recompress or otherwise alter the bytes that get uploaded
//! - Issue any request for a file that failed validation

use image::{DynamicImage, ImageFormat, RgbaImage};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::ClientError;

/// Largest accepted upload: 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";
const SNIFF_LEN: usize = 64;

/// The raw image chosen by the user, alive for one upload cycle.
#[derive(Clone, Debug)]
pub struct SelectedFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Reads a file from disk under the default 10 MiB limit.
    pub fn from_path(path: &Path) -> Result<Self, ClientError> {
        Self::from_path_with_limit(path, MAX_UPLOAD_BYTES)
    }

    /// Reads a file from disk. The MIME type comes from the extension, or
    /// from the first bytes when the extension says nothing useful.
    ///
    /// Type and size are checked against file metadata before the content
    /// is buffered, so an oversized selection is never read into memory.
    pub fn from_path_with_limit(path: &Path, limit: u64) -> Result<Self, ClientError> {
        let mut handle = File::open(path)?;
        let size = handle.metadata()?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mime = match mime_guess::from_path(path).first() {
            Some(m) => m.essence_str().to_string(),
            None => {
                let mut head = Vec::with_capacity(SNIFF_LEN);
                (&mut handle).take(SNIFF_LEN as u64).read_to_end(&mut head)?;
                handle.seek(SeekFrom::Start(0))?;
                sniff_mime(&head).unwrap_or_else(|| OCTET_STREAM.to_string())
            }
        };
        if !mime.starts_with("image/") {
            return Err(ClientError::InvalidType { mime });
        }
        if size > limit {
            return Err(ClientError::TooLarge { size, limit });
        }

        // The file may grow between the metadata call and the read.
        let mut bytes = Vec::with_capacity(size as usize);
        handle.take(limit + 1).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > limit {
            return Err(ClientError::TooLarge {
                size: bytes.len() as u64,
                limit,
            });
        }
        Ok(Self { name, mime, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<String> {
    let format = image::guess_format(bytes).ok()?;
    Some(format.to_mime_type().to_string())
}

/// Validates a selection against the default 10 MiB limit.
pub fn validate(file: &SelectedFile) -> Result<(), ClientError> {
    validate_with_limit(file, MAX_UPLOAD_BYTES)
}

/// Type is checked before size; a file exactly at `limit` is accepted.
pub fn validate_with_limit(file: &SelectedFile, limit: u64) -> Result<(), ClientError> {
    if !file.mime.starts_with("image/") {
        return Err(ClientError::InvalidType {
            mime: file.mime.clone(),
        });
    }
    if file.size() > limit {
        return Err(ClientError::TooLarge {
            size: file.size(),
            limit,
        });
    }
    Ok(())
}

/// Locally decoded copy of the selected image.
#[derive(Clone, Debug)]
pub struct Preview {
    image: RgbaImage,
    format: Option<ImageFormat>,
}

impl Preview {
    pub fn decode(file: &SelectedFile) -> Result<Self, ClientError> {
        let format = image::guess_format(&file.bytes).ok();
        let image = image::load_from_memory(&file.bytes)
            .map_err(|e| ClientError::InvalidImage(format!("{}: {}", file.name, e)))?;
        Ok(Self::from_image(image, format))
    }

    pub fn from_image(image: DynamicImage, format: Option<ImageFormat>) -> Self {
        Self {
            image: image.into_rgba8(),
            format,
        }
    }

    /// Natural (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }
}
