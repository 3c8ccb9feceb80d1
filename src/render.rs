//! Textual rendering of detection results.

use serde::Serialize;
use std::fmt;

use crate::detection::{Detection, DetectionResponse};

pub const NO_DEFECTS_PLACEHOLDER: &str = "No defects detected ✓";

/// Rounds half-way values toward positive infinity (`-2.5` → `-2`).
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Percentage with one decimal, ties rounded up (`0.8125` → `81.3`).
pub fn percent_one_decimal(fraction: f64) -> String {
    let tenths = round_half_up(fraction * 1000.0);
    format!("{:.1}", tenths as f64 / 10.0)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub class_name: String,
    pub severity_badge: String,
    pub confidence: String,
    pub position: String,
    pub size: String,
}

impl ListEntry {
    pub fn from_detection(detection: &Detection) -> Self {
        Self {
            class_name: detection.class_name.clone(),
            severity_badge: detection.severity.as_str().to_string(),
            confidence: format!(
                "Confidence: {}%",
                percent_one_decimal(detection.confidence)
            ),
            position: format!(
                "Position: x={}, y={}",
                round_half_up(detection.x),
                round_half_up(detection.y)
            ),
            size: format!(
                "Size: {}×{}px",
                round_half_up(detection.width),
                round_half_up(detection.height)
            ),
        }
    }
}

/// Either the placeholder or one entry per detection, in response order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectionList {
    Empty,
    Entries(Vec<ListEntry>),
}

impl DetectionList {
    pub fn entries(&self) -> &[ListEntry] {
        match self {
            DetectionList::Empty => &[],
            DetectionList::Entries(entries) => entries,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        match self {
            DetectionList::Empty => vec![NO_DEFECTS_PLACEHOLDER.to_string()],
            DetectionList::Entries(entries) => entries
                .iter()
                .flat_map(|entry| {
                    [
                        format!("{} [{}]", entry.class_name, entry.severity_badge),
                        format!("  {}", entry.confidence),
                        format!("  {}", entry.position),
                        format!("  {}", entry.size),
                    ]
                })
                .collect(),
        }
    }
}

impl fmt::Display for DetectionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

pub fn render_list(response: &DetectionResponse) -> DetectionList {
    if response.detections.is_empty() {
        return DetectionList::Empty;
    }
    DetectionList::Entries(
        response
            .detections
            .iter()
            .map(ListEntry::from_detection)
            .collect(),
    )
}

/// One-line severity tally, e.g. `Total: 3 | HIGH: 1 | MEDIUM: 1 | LOW: 1 | Status: DANGER`.
pub fn summary_line(response: &DetectionResponse) -> String {
    let summary = response.summary();
    let mut line = format!(
        "Total: {} | HIGH: {} | MEDIUM: {} | LOW: {}",
        summary.total(),
        summary.high,
        summary.medium,
        summary.low
    );
    if summary.other > 0 {
        line.push_str(&format!(" | OTHER: {}", summary.other));
    }
    line.push_str(&format!(" | Status: {}", response.status()));
    line
}
