use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::error::PipelineError;
use crate::ocr::layout_builder::OcrLayoutBuilder;
use crate::ocr::{OcrEngine, OcrOutput, OcrRequest};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Runs the `tesseract` binary as a subprocess and parses its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractBridge {
    binary: PathBuf,
    timeout: Duration,
    psm: Option<u8>,
}

impl Default for TesseractBridge {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            timeout: Duration::from_secs(120),
            psm: None,
        }
    }
}

impl TesseractBridge {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_psm(mut self, psm: Option<u8>) -> Self {
        self.psm = psm;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, image: &Path, request: &OcrRequest) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg(image).arg("stdout").arg("-l").arg(&request.language);
        if let Some(psm) = self.psm {
            command.arg("--psm").arg(psm.to_string());
        }
        if request.preserve_layout {
            command.arg("-c").arg("preserve_interword_spaces=1");
        }
        command.arg("tsv");
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Waits for the child, killing it once `timeout` has elapsed.
    fn wait_with_timeout(&self, child: &mut Child) -> Result<std::process::ExitStatus, PipelineError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(binary = %self.binary.display(), "OCR timed out, killing process");
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::OcrTimeout {
                    seconds: self.timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buffer);
        }
        buffer
    })
}

impl OcrEngine for TesseractBridge {
    fn recognize(&self, image: &Path, request: &OcrRequest) -> Result<OcrOutput, PipelineError> {
        debug!(image = %image.display(), lang = %request.language, "invoking tesseract");
        let mut child = self.command(image, request).spawn().map_err(|err| {
            PipelineError::OcrUnavailable(format!("{}: {err}", self.binary.display()))
        })?;

        // pipes are drained concurrently so a chatty child cannot block on a full buffer
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait_with_timeout(&mut child)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            let message = String::from_utf8_lossy(&stderr).trim().to_string();
            warn!(%status, "tesseract failed: {message}");
            return Ok(OcrOutput::failed(format!("tesseract exited with {status}: {message}")));
        }

        let tsv = String::from_utf8_lossy(&stdout);
        let output = OcrLayoutBuilder::new(request.preserve_layout).build(&tsv);
        info!(
            confidence = output.confidence,
            lines = output.lines.len(),
            "OCR complete"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_unavailable() {
        let bridge = TesseractBridge::new("/nonexistent/scanstruct-tesseract");
        let err = bridge
            .recognize(Path::new("page.png"), &OcrRequest::new("eng"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::OcrUnavailable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn slow_engine_is_killed_after_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let script = std::env::temp_dir().join(format!("scanstruct-slow-ocr-{}.sh", std::process::id()));
        std::fs::write(&script, "#!/bin/sh\nexec sleep 5\n").expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let bridge = TesseractBridge::new(&script).with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = bridge
            .recognize(Path::new("page.png"), &OcrRequest::new("eng"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::OcrTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
        let _ = std::fs::remove_file(&script);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_soft_failure() {
        let bridge = TesseractBridge::new("false");
        let output = bridge
            .recognize(Path::new("page.png"), &OcrRequest::new("eng"))
            .expect("process ran");
        assert!(!output.success);
        assert!(output.error.is_some());
    }

    #[test]
    #[ignore = "requires tesseract on PATH"]
    fn recognizes_with_installed_tesseract() {
        let bridge = TesseractBridge::default();
        let err = bridge.recognize(Path::new("/nonexistent.png"), &OcrRequest::new("eng"));
        assert!(matches!(err, Ok(OcrOutput { success: false, .. })));
    }
}
