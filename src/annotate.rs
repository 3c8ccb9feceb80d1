//! Canvas annotation.
//!
//! Draws detections over a copy of the preview, in response order:
//! outline, then label background, then label text. Later detections
//! overlay earlier ones. Anything outside the canvas is clipped.

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

use crate::config::RenderSettings;
use crate::detection::{Detection, Severity, SeveritySummary};
use crate::intake::Preview;
use crate::render::round_half_up;

pub const LABEL_FONT_PX: f32 = 14.0;
pub const OUTLINE_WIDTH: u32 = 3;
const LABEL_HEIGHT: i64 = LABEL_FONT_PX as i64 + 6;
const LABEL_GAP: i64 = 4;
const LABEL_PADDING: i64 = 4;
/// Average advance used to size label backgrounds when no font is loaded.
const FALLBACK_ADVANCE_EM: f32 = 0.6;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

pub fn severity_color(severity: &Severity) -> Rgba<u8> {
    let [r, g, b] = severity.color_rgb();
    Rgba([r, g, b, 255])
}

pub struct Annotator {
    font: Option<FontVec>,
    summary_panel: bool,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// An annotator without a font: label backgrounds are drawn, text is not.
    pub fn new() -> Self {
        Self {
            font: None,
            summary_panel: false,
        }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_summary_panel(mut self, enabled: bool) -> Self {
        self.summary_panel = enabled;
        self
    }

    /// An explicitly configured font must load; otherwise well-known system
    /// fonts are tried and a missing font only disables label text.
    pub fn load(settings: &RenderSettings) -> Result<Self> {
        let annotator = Self::new().with_summary_panel(settings.summary_panel);
        if let Some(path) = &settings.font_path {
            let font = load_font(path)?;
            log::debug!("label font loaded from {}", path.display());
            return Ok(annotator.with_font(font));
        }
        for candidate in SYSTEM_FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.is_file() {
                continue;
            }
            match load_font(path) {
                Ok(font) => {
                    log::debug!("label font loaded from {}", candidate);
                    return Ok(annotator.with_font(font));
                }
                Err(err) => log::debug!("skipping font {}: {:#}", candidate, err),
            }
        }
        log::warn!("no label font found; set DEFECT_FONT_PATH to draw label text");
        Ok(annotator)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Pixel width of `text` at the label size.
    pub fn text_width(&self, text: &str) -> u32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(LABEL_FONT_PX), font, text).0,
            None => (text.chars().count() as f32 * LABEL_FONT_PX * FALLBACK_ADVANCE_EM).round()
                as u32,
        }
    }

    /// Redraws the preview at natural size and overlays every detection.
    pub fn annotate(&self, preview: &Preview, detections: &[Detection]) -> RgbaImage {
        let mut canvas = preview.image().clone();
        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }
        if self.summary_panel {
            self.draw_summary_panel(&mut canvas, &SeveritySummary::from_detections(detections));
        }
        canvas
    }

    fn draw_detection(&self, canvas: &mut RgbaImage, detection: &Detection) {
        let color = severity_color(&detection.severity);
        let x = round_half_up(detection.x);
        let y = round_half_up(detection.y);
        let w = round_half_up(detection.width);
        let h = round_half_up(detection.height);

        draw_outline(canvas, x, y, w, h, color);

        let label = detection.label();
        let label_width = self.text_width(&label) as i64 + 2 * LABEL_PADDING;
        if let Some(background) = rect(x, y - LABEL_HEIGHT - LABEL_GAP, label_width, LABEL_HEIGHT) {
            draw_filled_rect_mut(canvas, background, color);
        }

        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                WHITE,
                clamp_i32(x + LABEL_PADDING),
                clamp_i32(y - LABEL_HEIGHT),
                PxScale::from(LABEL_FONT_PX),
                font,
                &label,
            );
        }
    }

    fn draw_summary_panel(&self, canvas: &mut RgbaImage, summary: &SeveritySummary) {
        if let Some(panel) = rect(10, 10, 241, 91) {
            draw_filled_rect_mut(canvas, panel, BLACK);
        }
        for inset in 0..2 {
            if let Some(border) = rect(10 + inset, 10 + inset, 241 - 2 * inset, 91 - 2 * inset) {
                draw_hollow_rect_mut(canvas, border, WHITE);
            }
        }

        let Some(font) = &self.font else {
            return;
        };
        draw_text_mut(
            canvas,
            WHITE,
            20,
            20,
            PxScale::from(18.0),
            font,
            &format!("Total: {}", summary.total()),
        );
        let rows = [
            (Severity::High, summary.high),
            (Severity::Medium, summary.medium),
            (Severity::Low, summary.low),
        ];
        for (row, (severity, count)) in rows.iter().enumerate() {
            draw_text_mut(
                canvas,
                severity_color(severity),
                20,
                46 + 18 * row as i32,
                PxScale::from(LABEL_FONT_PX),
                font,
                &format!("{}: {}", severity, count),
            );
        }
    }
}

/// Stroke of `OUTLINE_WIDTH` pixels centred on the box edge.
fn draw_outline(canvas: &mut RgbaImage, x: i64, y: i64, w: i64, h: i64, color: Rgba<u8>) {
    // Negative extents mirror the box, as a canvas stroke does.
    let (x, w) = if w < 0 { (x + w, -w) } else { (x, w) };
    let (y, h) = if h < 0 { (y + h, -h) } else { (y, h) };
    let half = (OUTLINE_WIDTH / 2) as i64;
    for offset in -half..=half {
        if let Some(ring) = rect(x - offset, y - offset, w + 1 + 2 * offset, h + 1 + 2 * offset) {
            draw_hollow_rect_mut(canvas, ring, color);
        }
    }
}

fn rect(x: i64, y: i64, w: i64, h: i64) -> Option<Rect> {
    if w <= 0 || h <= 0 {
        return None;
    }
    Some(Rect::at(clamp_i32(x), clamp_i32(y)).of_size(clamp_u32(w), clamp_u32(h)))
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64 / 2, i32::MAX as i64 / 2) as i32
}

fn clamp_u32(value: i64) -> u32 {
    value.clamp(1, i32::MAX as i64 / 2) as u32
}

fn load_font(path: &Path) -> Result<FontVec> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read font file {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|_| anyhow!("unable to parse font {}", path.display()))
}
