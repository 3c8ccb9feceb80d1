//! Display state for a sequence of uploads.
//!
//! All mutation goes through `Session::begin` (a new selection) and
//! `Session::complete` (an upload finished). Each selection gets a ticket
//! with a strictly increasing sequence number; a completion carrying any
//! ticket other than the latest is discarded, so only the most recent
//! upload's result is ever shown even when responses arrive out of order.

use image::RgbaImage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::annotate::Annotator;
use crate::client::Detector;
use crate::detection::DetectionResponse;
use crate::error::ClientError;
use crate::intake::{self, Preview, SelectedFile, MAX_UPLOAD_BYTES};
use crate::render::{render_list, DetectionList};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Showing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadTicket {
    pub seq: u64,
}

#[derive(Debug)]
pub enum Completion {
    Shown,
    Failed(ClientError),
    /// A newer selection superseded this upload; nothing changed.
    Stale,
}

#[derive(Debug)]
pub struct DisplayState {
    pub phase: Phase,
    pub file_name: Option<String>,
    pub preview: Option<Preview>,
    pub response: Option<DetectionResponse>,
    pub list: Option<DetectionList>,
    pub canvas: Option<RgbaImage>,
    pub last_error: Option<String>,
}

impl DisplayState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            file_name: None,
            preview: None,
            response: None,
            list: None,
            canvas: None,
            last_error: None,
        }
    }

    fn clear_results(&mut self) {
        self.response = None;
        self.list = None;
        self.canvas = None;
    }
}

/// List and canvas for `response` over `preview`.
pub fn render_view(
    annotator: &Annotator,
    preview: &Preview,
    response: &DetectionResponse,
) -> (DetectionList, RgbaImage) {
    (
        render_list(response),
        annotator.annotate(preview, &response.detections),
    )
}

type CompletionMessage = (UploadTicket, Result<DetectionResponse, ClientError>);

pub struct Session {
    state: DisplayState,
    annotator: Annotator,
    max_upload_bytes: u64,
    latest: u64,
    completions_tx: Sender<CompletionMessage>,
    completions_rx: Receiver<CompletionMessage>,
}

impl Session {
    pub fn new(annotator: Annotator) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        Self {
            state: DisplayState::new(),
            annotator,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            latest: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state.phase == Phase::Loading
    }

    /// Starts an upload cycle for `file`.
    ///
    /// Validation failures leave the current display untouched. On success
    /// the previous results are cleared, the preview is decoded and the
    /// session enters `Loading`.
    pub fn begin(&mut self, file: &SelectedFile) -> Result<UploadTicket, ClientError> {
        if let Err(err) = intake::validate_with_limit(file, self.max_upload_bytes) {
            self.state.last_error = Some(err.to_string());
            return Err(err);
        }

        self.latest += 1;
        let ticket = UploadTicket { seq: self.latest };
        self.state.clear_results();
        self.state.last_error = None;
        self.state.file_name = Some(file.name.clone());
        self.state.phase = Phase::Loading;

        match Preview::decode(file) {
            Ok(preview) => {
                self.state.preview = Some(preview);
                Ok(ticket)
            }
            Err(err) => {
                self.state.preview = None;
                self.state.phase = Phase::Idle;
                self.state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Applies the outcome of the upload identified by `ticket`.
    pub fn complete(
        &mut self,
        ticket: UploadTicket,
        result: Result<DetectionResponse, ClientError>,
    ) -> Completion {
        if ticket.seq != self.latest || self.state.phase != Phase::Loading {
            log::debug!(
                "discarding stale result for upload #{} (latest #{})",
                ticket.seq,
                self.latest
            );
            return Completion::Stale;
        }

        match result {
            Ok(response) => {
                let Some(preview) = self.state.preview.as_ref() else {
                    self.state.phase = Phase::Idle;
                    return Completion::Stale;
                };
                let (list, canvas) = render_view(&self.annotator, preview, &response);
                self.state.list = Some(list);
                self.state.canvas = Some(canvas);
                self.state.response = Some(response);
                self.state.phase = Phase::Showing;
                Completion::Shown
            }
            Err(err) => {
                self.state.last_error = Some(err.to_string());
                self.state.phase = Phase::Idle;
                Completion::Failed(err)
            }
        }
    }

    /// Begins an upload and runs it on a worker thread.
    pub fn submit(
        &mut self,
        file: SelectedFile,
        detector: Arc<dyn Detector>,
    ) -> Result<UploadTicket, ClientError> {
        let ticket = self.begin(&file)?;
        let tx = self.completions_tx.clone();
        std::thread::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| detector.detect(&file)))
                .unwrap_or_else(|_| {
                    Err(ClientError::TransportError("upload worker panicked".to_string()))
                });
            // The session may already be gone; nothing left to update then.
            let _ = tx.send((ticket, result));
        });
        Ok(ticket)
    }

    /// Blocks until the latest submitted upload resolves, discarding any
    /// stale completions that arrive first. Returns immediately when no
    /// upload is in flight.
    pub fn wait(&mut self) -> Result<(), ClientError> {
        while self.is_loading() {
            let (ticket, result) = match self.completions_rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            };
            match self.complete(ticket, result) {
                Completion::Shown => return Ok(()),
                Completion::Failed(err) => return Err(err),
                Completion::Stale => continue,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, Severity};
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;
    use std::time::Duration;

    fn png_file(name: &str) -> SelectedFile {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(64, 64)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        SelectedFile::from_bytes(name, "image/png", out.into_inner())
    }

    fn response_for(class_name: &str) -> DetectionResponse {
        DetectionResponse {
            detections: vec![Detection {
                class_name: class_name.to_string(),
                severity: Severity::High,
                confidence: 0.9,
                x: 4.0,
                y: 30.0,
                width: 10.0,
                height: 10.0,
            }],
            inspection_status: None,
        }
    }

    #[test]
    fn stale_completion_is_discarded() {
        let mut session = Session::new(Annotator::new());
        let first = session.begin(&png_file("a.png")).unwrap();
        let second = session.begin(&png_file("b.png")).unwrap();
        assert!(second.seq > first.seq);

        assert!(matches!(
            session.complete(first, Ok(response_for("from_a"))),
            Completion::Stale
        ));
        assert!(session.is_loading());
        assert!(session.state().list.is_none());

        assert!(matches!(
            session.complete(second, Ok(response_for("from_b"))),
            Completion::Shown
        ));
        let state = session.state();
        assert_eq!(state.phase, Phase::Showing);
        assert_eq!(state.file_name.as_deref(), Some("b.png"));
        assert_eq!(
            state.list.as_ref().unwrap().entries()[0].class_name,
            "from_b"
        );

        // A late duplicate after showing changes nothing.
        assert!(matches!(
            session.complete(second, Ok(response_for("again"))),
            Completion::Stale
        ));
    }

    #[test]
    fn new_upload_clears_previous_results() {
        let mut session = Session::new(Annotator::new());
        let ticket = session.begin(&png_file("a.png")).unwrap();
        session.complete(ticket, Ok(response_for("crack")));
        assert!(session.state().canvas.is_some());

        session.begin(&png_file("b.png")).unwrap();
        let state = session.state();
        assert_eq!(state.phase, Phase::Loading);
        assert!(state.list.is_none());
        assert!(state.canvas.is_none());
        assert!(state.response.is_none());
    }

    #[test]
    fn rejected_selection_keeps_display() {
        let mut session = Session::new(Annotator::new());
        let ticket = session.begin(&png_file("a.png")).unwrap();
        session.complete(ticket, Ok(response_for("crack")));

        let err = session
            .begin(&SelectedFile::from_bytes("a.txt", "text/plain", vec![1]))
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidType { .. }));
        let state = session.state();
        assert_eq!(state.phase, Phase::Showing);
        assert!(state.canvas.is_some());
        assert!(state.last_error.is_some());
    }

    #[test]
    fn failure_returns_to_idle() {
        let mut session = Session::new(Annotator::new());
        let ticket = session.begin(&png_file("a.png")).unwrap();
        let outcome = session.complete(ticket, Err(ClientError::from_status(500, None)));
        assert!(matches!(outcome, Completion::Failed(_)));
        let state = session.state();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.last_error.as_deref(), Some("Server error: 500"));
        assert!(state.list.is_none());
    }

    #[test]
    fn custom_upload_limit_applies() {
        let mut session = Session::new(Annotator::new()).with_max_upload_bytes(16);
        let err = session.begin(&png_file("a.png")).unwrap_err();
        assert!(matches!(err, ClientError::TooLarge { limit: 16, .. }));
        assert_eq!(session.state().phase, Phase::Idle);
    }

    struct NamedDetector;

    impl Detector for NamedDetector {
        fn detect(&self, file: &SelectedFile) -> Result<DetectionResponse, ClientError> {
            if file.name.starts_with("slow") {
                std::thread::sleep(Duration::from_millis(300));
            }
            Ok(response_for(&file.name))
        }
    }

    #[test]
    fn worker_results_out_of_order_show_latest() {
        let detector: Arc<dyn Detector> = Arc::new(NamedDetector);
        let mut session = Session::new(Annotator::new());
        session.submit(png_file("slow.png"), detector.clone()).unwrap();
        session.submit(png_file("fast.png"), detector).unwrap();
        session.wait().unwrap();
        assert_eq!(
            session.state().list.as_ref().unwrap().entries()[0].class_name,
            "fast.png"
        );

        // The slow upload lands later and must not replace the display.
        std::thread::sleep(Duration::from_millis(500));
        session.wait().unwrap();
        assert_eq!(
            session.state().response.as_ref().unwrap().detections[0].class_name,
            "fast.png"
        );
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn detect(&self, _file: &SelectedFile) -> Result<DetectionResponse, ClientError> {
            panic!("detector exploded");
        }
    }

    #[test]
    fn panicking_worker_surfaces_error() {
        let mut session = Session::new(Annotator::new());
        session
            .submit(png_file("a.png"), Arc::new(PanickingDetector))
            .unwrap();
        assert!(matches!(
            session.wait().unwrap_err(),
            ClientError::TransportError(_)
        ));
        assert_eq!(session.state().phase, Phase::Idle);
    }
}
