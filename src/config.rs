use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::intake::MAX_UPLOAD_BYTES;

pub const DEFAULT_API_URL: &str = "https://deteksi-kerusakan-backend.up.railway.app";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    api_url: Option<String>,
    request: Option<RequestConfigFile>,
    render: Option<RenderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct RequestConfigFile {
    timeout_secs: Option<u64>,
    max_upload_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    font_path: Option<PathBuf>,
    summary_panel: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub timeout: Duration,
    pub max_upload_bytes: u64,
    pub render: RenderSettings,
}

#[derive(Debug, Clone, Default)]
pub struct RenderSettings {
    pub font_path: Option<PathBuf>,
    pub summary_panel: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            render: RenderSettings::default(),
        }
    }
}

impl ClientConfig {
    /// File named by `DEFECT_CONFIG` (if any), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DEFECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Self {
        let defaults = Self::default();
        let api_url = file.api_url.unwrap_or(defaults.api_url);
        let timeout = file
            .request
            .as_ref()
            .and_then(|request| request.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let max_upload_bytes = file
            .request
            .as_ref()
            .and_then(|request| request.max_upload_bytes)
            .unwrap_or(defaults.max_upload_bytes);
        let render = RenderSettings {
            font_path: file
                .render
                .as_ref()
                .and_then(|render| render.font_path.clone()),
            summary_panel: file
                .render
                .and_then(|render| render.summary_panel)
                .unwrap_or(false),
        };
        Self {
            api_url,
            timeout,
            max_upload_bytes,
            render,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DEFECT_API_URL") {
            if !url.trim().is_empty() {
                self.api_url = url.trim().to_string();
            }
        }
        if let Ok(timeout) = std::env::var("DEFECT_TIMEOUT_SECS") {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("DEFECT_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.timeout = Duration::from_secs(seconds);
        }
        if let Ok(limit) = std::env::var("DEFECT_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = limit
                .trim()
                .parse()
                .map_err(|_| anyhow!("DEFECT_MAX_UPLOAD_BYTES must be an integer byte count"))?;
        }
        if let Ok(path) = std::env::var("DEFECT_FONT_PATH") {
            if !path.trim().is_empty() {
                self.render.font_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    /// Checks the settings and normalises the API URL (no trailing slash).
    pub fn validate(&mut self) -> Result<()> {
        let parsed = url::Url::parse(&self.api_url)
            .map_err(|e| anyhow!("invalid api url '{}': {}", self.api_url, e))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported api url scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        self.api_url = self.api_url.trim_end_matches('/').to_string();

        if self.timeout.is_zero() {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max upload size must be greater than zero"));
        }
        Ok(())
    }

    /// `{api_url}/{path}`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
