//! Medicine label OCR via the `tesseract` command-line tool.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const OCR_TIMEOUT: Duration = Duration::from_secs(60);
/// Labels in Bangladesh mix English and Bangla print.
const LANGUAGES: &str = "eng+ben";

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR engine '{0}' not found. Install tesseract with the 'ben' language pack or set TESSERACT_CMD.")]
    NotInstalled(String),

    #[error("OCR timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("OCR failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("no text recognised in image")]
    NoText,

    #[error("OCR I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct Ocr {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Ocr {
    /// Reads the image from stdin and writes recognised text to stdout.
    pub fn tesseract(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: ["stdin", "stdout", "-l", LANGUAGES]
                .map(String::from)
                .to_vec(),
            timeout: OCR_TIMEOUT,
        }
    }

    pub async fn extract_text(&self, image: &[u8]) -> Result<String, OcrError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => OcrError::NotInstalled(self.program.clone()),
                _ => OcrError::Io(e),
            })?;

        // Writing the image counts against the timeout too.
        let run = async {
            if let Some(mut stdin) = child.stdin.take() {
                // Early exit closes the pipe; report the exit status instead.
                if let Err(e) = stdin.write_all(image).await
                    && e.kind() != io::ErrorKind::BrokenPipe
                {
                    return Err(OcrError::Io(e));
                }
            }
            Ok(child.wait_with_output().await?)
        };
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| OcrError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr)
                    .trim()
                    .chars()
                    .take(200)
                    .collect(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(bytes = image.len(), chars = text.len(), "OCR complete");
        if text.is_empty() {
            return Err(OcrError::NoText);
        }
        Ok(text)
    }
}
