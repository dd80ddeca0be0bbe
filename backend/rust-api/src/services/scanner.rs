//! Boundary to the external OMR scanner.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

use crate::config::ScannerSettings;
use crate::error::GradingError;
use crate::metrics::{SCANS_TOTAL, SCAN_DURATION_SECONDS};
use crate::models::ScanResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    AnswerKey,
    Sheet,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::AnswerKey => "answer_key",
            ScanMode::Sheet => "sheet",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Path relative to the upload directory.
    pub image_path: String,
    /// Expected mark per question, in question order.
    pub expected: Vec<u8>,
    pub script: Option<String>,
    pub mode: ScanMode,
}

#[async_trait]
pub trait ScanProcessor: Send + Sync {
    async fn process(&self, request: &ScanRequest) -> Result<ScanResult, GradingError>;
}

/// Runs `<interpreter> <script_dir>/<script>.py <image> <expected-json>` and parses
/// the JSON it prints. The child is killed if it outlives the configured timeout.
pub struct SubprocessScanner {
    settings: ScannerSettings,
}

impl SubprocessScanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self { settings }
    }

    fn resolve_script(&self, requested: Option<&str>) -> Result<(String, PathBuf), GradingError> {
        let name = requested
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.settings.default_script);

        if !self.settings.allowed_scripts.iter().any(|s| s == name) {
            return Err(GradingError::validation(
                "scanner",
                format!(
                    "unknown scanner '{}', expected one of: {}",
                    name,
                    self.settings.allowed_scripts.join(", ")
                ),
            ));
        }

        let path = self.settings.script_dir.join(format!("{}.py", name));
        Ok((name.to_string(), path))
    }

    fn resolve_image(&self, raw: &str) -> Result<PathBuf, GradingError> {
        let relative = Path::new(raw);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if raw.trim().is_empty() || escapes {
            return Err(GradingError::validation(
                "imagePath",
                "imagePath must be a relative path inside the upload directory",
            ));
        }
        Ok(self.settings.upload_dir.join(relative))
    }

    async fn run(
        &self,
        script: &Path,
        image: &Path,
        expected: &[u8],
    ) -> Result<ScanResult, GradingError> {
        let expected_json = serde_json::to_string(expected)
            .map_err(|e| GradingError::processing(format!("failed to encode key: {}", e), None))?;

        let mut cmd = Command::new(&self.settings.interpreter);
        cmd.arg(script)
            .arg(image)
            .arg(expected_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.settings.timeout, cmd.output()).await {
            Err(_) => {
                return Err(GradingError::processing(
                    format!(
                        "scanner timed out after {}s",
                        self.settings.timeout.as_secs_f64()
                    ),
                    None,
                ))
            }
            Ok(Err(e)) => {
                return Err(GradingError::processing(
                    format!("failed to start scanner: {}", e),
                    None,
                ))
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostics = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(GradingError::processing(
                format!("scanner failed to process the image ({})", output.status),
                Some(diagnostics),
            ));
        }

        parse_scan_output(&stdout)
    }
}

#[async_trait]
impl ScanProcessor for SubprocessScanner {
    async fn process(&self, request: &ScanRequest) -> Result<ScanResult, GradingError> {
        let (script_name, script) = self.resolve_script(request.script.as_deref())?;
        let image = self.resolve_image(&request.image_path)?;
        if !tokio::fs::try_exists(&image).await.unwrap_or(false) {
            return Err(GradingError::not_found("image", &request.image_path));
        }

        tracing::info!(
            script = %script_name,
            image = %image.display(),
            mode = request.mode.as_str(),
            questions = request.expected.len(),
            "Running OMR scanner"
        );

        let started = Instant::now();
        let result = self.run(&script, &image, &request.expected).await;
        SCAN_DURATION_SECONDS
            .with_label_values(&[&script_name])
            .observe(started.elapsed().as_secs_f64());

        let status = if result.is_ok() { "success" } else { "error" };
        SCANS_TOTAL
            .with_label_values(&[request.mode.as_str(), status])
            .inc();

        if let Err(e) = &result {
            tracing::warn!(script = %script_name, "OMR scanner failed: {}", e);
        }
        result
    }
}

/// Accepts the whole output as JSON, or the last JSON line when the script logs
/// before printing its result.
pub fn parse_scan_output(raw: &str) -> Result<ScanResult, GradingError> {
    let trimmed = raw.trim();
    if let Ok(result) = serde_json::from_str::<ScanResult>(trimmed) {
        return Ok(result);
    }

    trimmed
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .and_then(|line| serde_json::from_str::<ScanResult>(line).ok())
        .ok_or_else(|| {
            GradingError::processing("failed to parse scanner output", Some(trimmed.to_string()))
        })
}
