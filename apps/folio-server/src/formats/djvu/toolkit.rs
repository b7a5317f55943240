//! DjVuLibre command-line tools
//!
//! `djvused` counts pages, `djvutxt` dumps the hidden text layer and
//! `ddjvu` rasterizes pages for OCR. All three run as child processes that
//! are killed when the awaiting future is dropped or the per-call timeout
//! expires.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// DjVu tool errors
#[derive(Debug, thiserror::Error)]
pub enum DjvuToolError {
    #[error("DjVu tools are not installed")]
    Unavailable,

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("{tool} did not finish within {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("Unexpected output from {0}")]
    Output(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the DjVu extractor needs from an external toolkit
#[async_trait]
pub trait DjvuToolkit: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn page_count(&self, path: &Path) -> Result<usize, DjvuToolError>;

    /// Text layer of the whole document, pages separated by form feeds
    async fn extract_text(&self, path: &Path) -> Result<String, DjvuToolError>;

    /// Render one page (0-based) to PNG
    async fn render_page(&self, path: &Path, index: usize) -> Result<Vec<u8>, DjvuToolError>;
}

/// DjVuLibre binaries found on `PATH` (or configured explicitly)
#[derive(Debug, Clone)]
pub struct CliDjvuToolkit {
    djvused: PathBuf,
    djvutxt: PathBuf,
    ddjvu: PathBuf,
    /// Render resolution for OCR, in dots per inch
    dpi: u32,
    /// Upper bound on one tool invocation
    timeout: Duration,
}

impl Default for CliDjvuToolkit {
    fn default() -> Self {
        Self {
            djvused: PathBuf::from("djvused"),
            djvutxt: PathBuf::from("djvutxt"),
            ddjvu: PathBuf::from("ddjvu"),
            dpi: 300,
            timeout: Duration::from_secs(120),
        }
    }
}

impl CliDjvuToolkit {
    /// Look for the tools in `dir` instead of `PATH`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            djvused: dir.join("djvused"),
            djvutxt: dir.join("djvutxt"),
            ddjvu: dir.join("ddjvu"),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, tool: &Path, args: &[&std::ffi::OsStr]) -> Result<Vec<u8>, DjvuToolError> {
        let child = Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| DjvuToolError::Timeout {
                tool: tool.display().to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DjvuToolError::Unavailable,
                _ => DjvuToolError::Io(e),
            })?;

        if !output.status.success() {
            return Err(DjvuToolError::Tool {
                tool: tool.display().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl DjvuToolkit for CliDjvuToolkit {
    async fn is_available(&self) -> bool {
        for tool in [&self.djvused, &self.djvutxt, &self.ddjvu] {
            let spawned = Command::new(tool)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await;
            if spawned.is_err() {
                return false;
            }
        }
        true
    }

    async fn page_count(&self, path: &Path) -> Result<usize, DjvuToolError> {
        let stdout = self
            .run(&self.djvused, &["-e".as_ref(), "n".as_ref(), path.as_os_str()])
            .await?;
        String::from_utf8_lossy(&stdout)
            .trim()
            .parse()
            .map_err(|_| DjvuToolError::Output("djvused".to_string()))
    }

    async fn extract_text(&self, path: &Path) -> Result<String, DjvuToolError> {
        let stdout = self.run(&self.djvutxt, &[path.as_os_str()]).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn render_page(&self, path: &Path, index: usize) -> Result<Vec<u8>, DjvuToolError> {
        let page = format!("-page={}", index + 1);
        let scale = format!("-scale={}", self.dpi);
        let stdout = self
            .run(
                &self.ddjvu,
                &[
                    "-format=pnm".as_ref(),
                    page.as_ref(),
                    scale.as_ref(),
                    path.as_os_str(),
                ],
            )
            .await?;
        pnm_to_png(&stdout)
    }
}

/// Re-encode a PNM raster as PNG
pub fn pnm_to_png(pnm: &[u8]) -> Result<Vec<u8>, DjvuToolError> {
    let img = image::load_from_memory_with_format(pnm, image::ImageFormat::Pnm)
        .map_err(|e| DjvuToolError::Image(e.to_string()))?;
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
        .map_err(|e| DjvuToolError::Image(e.to_string()))?;
    Ok(output)
}
