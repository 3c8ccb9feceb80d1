//! defect_inspect - upload images to the defect-detection service and annotate them
//!
//! For every image given to `detect`:
//! 1. Validates the selection (image type, 10 MiB limit)
//! 2. Decodes a local preview
//! 3. Uploads it to `POST {API_URL}/detect`
//! 4. Prints the detection list and writes `<stem>.annotated.png`
//!
//! A failed image is reported and the next one is still processed. With
//! `--batch` every valid image goes out in one `POST {API_URL}/detect-batch`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use defect_inspector::client::timeout_from_secs;
use defect_inspector::intake::validate_with_limit;
use defect_inspector::render::summary_line;
use defect_inspector::session::render_view;
use defect_inspector::ui::{Ui, UiMode};
use defect_inspector::{
    Annotator, ClassCatalog, ClientConfig, DetectClient, DetectionList, DetectionResponse,
    Detector, Preview, SelectedFile, Session,
};
use image::RgbaImage;

#[derive(Parser, Debug)]
#[command(
    name = "defect_inspect",
    author,
    version,
    about = "Detect and annotate defects via a remote detection service"
)]
struct Args {
    /// Base URL of the detection service (overrides DEFECT_CONFIG).
    #[arg(long, global = true, env = "DEFECT_API_URL")]
    api_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, global = true, env = "DEFECT_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload images and write annotated copies
    Detect {
        /// Images to inspect; each one replaces the previous result.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directory for annotated images and JSON output.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Also write `<stem>.detections.json`.
        #[arg(long)]
        json: bool,
        /// Draw the severity summary panel in the top-left corner.
        #[arg(long)]
        summary_panel: bool,
        /// Font used for label text.
        #[arg(long, env = "DEFECT_FONT_PATH")]
        font: Option<PathBuf>,
        /// Send all images in one batch request.
        #[arg(long)]
        batch: bool,
        /// UI mode for stderr progress (auto|plain|pretty)
        #[arg(long, default_value = "auto", value_name = "MODE")]
        ui: String,
    },

    /// Check that the detection service is online
    Health,

    /// List the classes the detection service reports
    Classes,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ClientConfig::load()?;
    if let Some(url) = args.api_url {
        cfg.api_url = url;
    }
    if let Some(secs) = args.timeout_secs {
        cfg.timeout = timeout_from_secs(secs);
    }

    match args.command {
        Command::Detect {
            files,
            out_dir,
            json,
            summary_panel,
            font,
            batch,
            ui,
        } => {
            if font.is_some() {
                cfg.render.font_path = font;
            }
            cfg.render.summary_panel |= summary_panel;
            cfg.validate()?;
            let ui = Ui::new(UiMode::parse(Some(&ui)), std::io::stderr().is_terminal());
            let opts = OutputOptions { out_dir, json };
            let failures = if batch {
                run_batch(&cfg, &ui, &files, &opts)?
            } else {
                run_detect(&cfg, &ui, &files, &opts)?
            };
            if failures > 0 {
                log::warn!("{} of {} images failed", failures, files.len());
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Health => {
            cfg.validate()?;
            let health = DetectClient::new(&cfg).health()?;
            println!("{}: {}", cfg.api_url, health.status);
            if let Some(message) = health.message {
                println!("  {}", message);
            }
            if let Some(model) = health.model {
                println!("  model: {}", model);
            }
            if let Some(classes) = health.classes {
                println!("  classes: {}", classes);
            }
            Ok(())
        }
        Command::Classes => {
            cfg.validate()?;
            let catalog = DetectClient::new(&cfg).classes()?;
            for class in &catalog.classes {
                println!("{} [{}]", class, risk_of(&catalog, class));
            }
            println!("total: {}", catalog.total.unwrap_or(catalog.classes.len() as u32));
            Ok(())
        }
    }
}

fn risk_of(catalog: &ClassCatalog, class: &str) -> &'static str {
    if catalog.high_risk.iter().any(|c| c == class) {
        "HIGH"
    } else if catalog.medium_risk.iter().any(|c| c == class) {
        "MEDIUM"
    } else if catalog.low_risk.iter().any(|c| c == class) {
        "LOW"
    } else {
        "-"
    }
}

struct OutputOptions {
    out_dir: PathBuf,
    json: bool,
}

/// What one finished image leaves behind.
struct Outcome<'a> {
    name: &'a str,
    list: &'a DetectionList,
    canvas: &'a RgbaImage,
    response: &'a DetectionResponse,
}

fn run_detect(cfg: &ClientConfig, ui: &Ui, files: &[PathBuf], opts: &OutputOptions) -> Result<usize> {
    prepare_out_dir(&opts.out_dir)?;

    log::info!("detection service: {}", cfg.api_url);
    let detector: Arc<dyn Detector> = Arc::new(DetectClient::new(cfg));
    let annotator = Annotator::load(&cfg.render)?;
    let mut session = Session::new(annotator).with_max_upload_bytes(cfg.max_upload_bytes);

    let mut failures = 0;
    for path in files {
        let file = match SelectedFile::from_path_with_limit(path, cfg.max_upload_bytes) {
            Ok(file) => file,
            Err(err) => {
                log::warn!("cannot read {}: {}", path.display(), err);
                ui.alert(&err);
                failures += 1;
                continue;
            }
        };
        let name = file.name.clone();

        if let Err(err) = session.submit(file, detector.clone()) {
            ui.alert(&err);
            failures += 1;
            continue;
        }
        let loading = ui.loading(&name);
        match session.wait() {
            Ok(()) => {
                let state = session.state();
                let (Some(list), Some(canvas), Some(response)) =
                    (&state.list, &state.canvas, &state.response)
                else {
                    loading.fail();
                    failures += 1;
                    continue;
                };
                loading.succeed(&format!("({} detections)", response.detections.len()));
                let outcome = Outcome {
                    name: &name,
                    list,
                    canvas,
                    response,
                };
                if !write_reported(&outcome, path, opts) {
                    failures += 1;
                }
            }
            Err(err) => {
                loading.fail();
                ui.alert(&err);
                failures += 1;
            }
        }
    }
    Ok(failures)
}

fn run_batch(cfg: &ClientConfig, ui: &Ui, files: &[PathBuf], opts: &OutputOptions) -> Result<usize> {
    prepare_out_dir(&opts.out_dir)?;

    log::info!("detection service: {} (batch)", cfg.api_url);
    let client = DetectClient::new(cfg);
    let annotator = Annotator::load(&cfg.render)?;

    let mut failures = 0;
    let mut accepted: Vec<(&PathBuf, SelectedFile, Preview)> = Vec::new();
    for path in files {
        let checked = SelectedFile::from_path_with_limit(path, cfg.max_upload_bytes)
            .and_then(|file| {
                validate_with_limit(&file, cfg.max_upload_bytes)?;
                let preview = Preview::decode(&file)?;
                Ok((file, preview))
            });
        match checked {
            Ok((file, preview)) => accepted.push((path, file, preview)),
            Err(err) => {
                log::warn!("skipping {}: {}", path.display(), err);
                ui.alert(&err);
                failures += 1;
            }
        }
    }
    if accepted.is_empty() {
        return Ok(failures);
    }

    let uploads: Vec<SelectedFile> = accepted.iter().map(|(_, file, _)| file.clone()).collect();
    let loading = ui.loading(&format!("{} images", uploads.len()));
    let batch = match client.detect_batch(&uploads) {
        Ok(batch) => {
            loading.succeed(&format!("({} results)", batch.results.len()));
            batch
        }
        Err(err) => {
            loading.fail();
            ui.alert(&err);
            return Ok(failures + accepted.len());
        }
    };

    for ((path, file, preview), item) in accepted.iter().zip(&batch.results) {
        match item.outcome() {
            Ok(response) => {
                let (list, canvas) = render_view(&annotator, preview, response);
                let outcome = Outcome {
                    name: &file.name,
                    list: &list,
                    canvas: &canvas,
                    response,
                };
                if !write_reported(&outcome, path, opts) {
                    failures += 1;
                }
            }
            Err(err) => {
                log::warn!("{} failed on the service: {}", file.name, err);
                ui.alert(&err);
                failures += 1;
            }
        }
    }
    Ok(failures)
}

fn prepare_out_dir(out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create output directory {}", out_dir.display()))
}

/// Prints and writes one outcome; a write failure is reported, not raised.
fn write_reported(outcome: &Outcome<'_>, source: &Path, opts: &OutputOptions) -> bool {
    match write_outputs(outcome, source, opts) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("cannot write results for {}: {:#}", outcome.name, err);
            eprintln!("Error: {:#}", err);
            false
        }
    }
}

fn output_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

fn write_outputs(outcome: &Outcome<'_>, source: &Path, opts: &OutputOptions) -> Result<()> {
    let stem = output_stem(source);

    println!("== {}", outcome.name);
    print!("{}", outcome.list);
    println!("{}", summary_line(outcome.response));

    let path = opts.out_dir.join(format!("{}.annotated.png", stem));
    outcome
        .canvas
        .save(&path)
        .with_context(|| format!("write annotated image {}", path.display()))?;
    log::info!("annotated image written to {}", path.display());

    if opts.json {
        let path = opts.out_dir.join(format!("{}.detections.json", stem));
        let body = serde_json::to_string_pretty(outcome.response)?;
        std::fs::write(&path, body)
            .with_context(|| format!("write detections {}", path.display()))?;
        log::info!("detections written to {}", path.display());
    }
    Ok(())
}
