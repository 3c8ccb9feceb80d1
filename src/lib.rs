//! Defect Inspector
//!
//! Client for a remote defect-detection service. A selected image is
//! validated, previewed locally, uploaded to `POST {API_URL}/detect`, and the
//! returned detections are rendered as a text list and an annotated copy of
//! the image.
//!
//! # Module Structure
//!
//! - `intake`: selection, validation (type, 10 MiB limit) and preview decode
//! - `client`: multipart upload, error mapping, explicit timeout
//! - `detection`: response model, severity colors, inspection status
//! - `render`: the textual detection list
//! - `annotate`: outlines, label backgrounds and label text on the canvas
//! - `session`: display state; stale results are discarded by ticket
//! - `ui`: loading indicator and alerts
//! - `config`: file + environment configuration

pub mod annotate;
pub mod client;
pub mod config;
pub mod detection;
pub mod error;
pub mod intake;
mod multipart;
pub mod render;
pub mod session;
pub mod ui;

pub use annotate::Annotator;
pub use client::{BatchItem, BatchResponse, ClassCatalog, DetectClient, Detector, ServiceHealth};
pub use config::{ClientConfig, RenderSettings};
pub use detection::{
    Detection, DetectionResponse, InspectionStatus, Severity, SeveritySummary,
};
pub use error::ClientError;
pub use intake::{Preview, SelectedFile, MAX_UPLOAD_BYTES};
pub use render::{render_list, DetectionList, ListEntry, NO_DEFECTS_PLACEHOLDER};
pub use session::{Completion, DisplayState, Phase, Session, UploadTicket};
