//! Detection results returned by the defect-detection service.
//!
//! The service answers `POST /detect` with:
//!
//! ```json
//! { "detections": [ { "class_name": "track_crack", "severity": "HIGH",
//!                     "confidence": 0.87, "x": 10, "y": 20,
//!                     "width": 100, "height": 50 } ] }
//! ```
//!
//! Boxes are in image pixel coordinates, origin top-left. Order is preserved
//! as received. Severity strings outside HIGH/MEDIUM/LOW are kept verbatim
//! and render in a neutral color rather than failing the response.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::render::round_half_up;

/// More detections than this (with no HIGH among them) means repairs are due.
pub const NEEDS_REPAIR_THRESHOLD: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    High,
    Medium,
    Low,
    Other(String),
}

impl Severity {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            "LOW" => Severity::Low,
            other => Severity::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Other(raw) => raw,
        }
    }

    /// Display color as `#RRGGBB`.
    pub fn color_hex(&self) -> &'static str {
        match self {
            Severity::High => "#FF6B6B",
            Severity::Medium => "#FFA500",
            Severity::Low => "#4ECDC4",
            Severity::Other(_) => "#FFFFFF",
        }
    }

    /// Display color as RGB components.
    pub fn color_rgb(&self) -> [u8; 3] {
        match self {
            Severity::High => [0xFF, 0x6B, 0x6B],
            Severity::Medium => [0xFF, 0xA5, 0x00],
            Severity::Low => [0x4E, 0xCD, 0xC4],
            Severity::Other(_) => [0xFF, 0xFF, 0xFF],
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Severity::parse(&raw))
    }
}

/// One identified defect instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub severity: Severity,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Detection {
    /// Canvas label, e.g. `crack (87%)`.
    pub fn label(&self) -> String {
        format!(
            "{} ({}%)",
            self.class_name,
            round_half_up(self.confidence * 100.0)
        )
    }
}

/// Body of a successful `/detect` response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_status: Option<ReportedStatus>,
}

impl DetectionResponse {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn summary(&self) -> SeveritySummary {
        SeveritySummary::from_detections(&self.detections)
    }

    /// Status reported by the service, or derived from the detections when
    /// the service left it out (or sent a value we do not recognise).
    pub fn status(&self) -> InspectionStatus {
        self.inspection_status
            .as_ref()
            .and_then(|reported| InspectionStatus::parse(&reported.status))
            .unwrap_or_else(|| self.summary().status())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Detection>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Detection>>::deserialize(deserializer)?.unwrap_or_default())
}

/// `inspection_status` block as the service sends it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportedStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InspectionStatus {
    Safe,
    NeedsRepair,
    Danger,
}

impl InspectionStatus {
    /// Accepts both the service's Indonesian labels and the English names.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "AMAN" | "SAFE" => Some(InspectionStatus::Safe),
            "PERLU PERBAIKAN" | "NEEDS_REPAIR" | "NEEDS REPAIR" => {
                Some(InspectionStatus::NeedsRepair)
            }
            "BAHAYA" | "DANGER" => Some(InspectionStatus::Danger),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Safe => "SAFE",
            InspectionStatus::NeedsRepair => "NEEDS_REPAIR",
            InspectionStatus::Danger => "DANGER",
        }
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeveritySummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub other: usize,
}

impl SeveritySummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut summary = Self::default();
        for detection in detections {
            match detection.severity {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Other(_) => summary.other += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low + self.other
    }

    pub fn status(&self) -> InspectionStatus {
        if self.high > 0 {
            InspectionStatus::Danger
        } else if self.total() > NEEDS_REPAIR_THRESHOLD {
            InspectionStatus::NeedsRepair
        } else {
            InspectionStatus::Safe
        }
    }
}
