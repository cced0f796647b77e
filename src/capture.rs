//! Screen capture
//!
//! Shells out to the platform screenshot tool, which writes an image to
//! stdout: `grim` on Wayland, `import` (`ImageMagick`) on X11, `screencapture`
//! on macOS. Any other command with the same contract can be configured.

use async_trait::async_trait;

use crate::{Error, Result};

/// A captured screen image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    bytes: Vec<u8>,
    mime_type: &'static str,
}

impl Screenshot {
    /// Wrap raw image bytes, detecting the MIME type from magic bytes
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        let mime_type = sniff_mime(&bytes);
        Self { bytes, mime_type }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        self.mime_type
    }
}

/// Detect PNG/JPEG/WebP from magic bytes, defaulting to PNG
#[must_use]
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

/// Source of screenshots
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Capture the primary screen
    ///
    /// # Errors
    ///
    /// Returns `Error::Capture` if no image could be taken
    async fn capture(&self) -> Result<Screenshot>;
}

/// Captures by running an external command that prints an image to stdout
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
}

impl CommandCapture {
    /// Create from an argv list (`["grim", "-"]`)
    ///
    /// # Errors
    ///
    /// Returns error if `argv` is empty
    pub fn new(argv: Vec<String>) -> Result<Self> {
        let mut argv = argv.into_iter();
        let program = argv
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::Config("capture command must not be empty".to_string()))?;

        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    /// Pick the screenshot tool for the current platform
    #[must_use]
    pub fn platform_default() -> Self {
        let argv: &[&str] = if cfg!(target_os = "macos") {
            &["screencapture", "-x", "-t", "png", "/dev/stdout"]
        } else if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            &["grim", "-"]
        } else {
            &["import", "-window", "root", "png:-"]
        };

        Self {
            program: argv[0].to_string(),
            args: argv[1..].iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ScreenCapture for CommandCapture {
    async fn capture(&self) -> Result<Screenshot> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Capture(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Capture(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(Error::Capture(format!("{} produced no image", self.program)));
        }

        tracing::debug!(bytes = output.stdout.len(), program = %self.program, "screen captured");
        Ok(Screenshot::new(output.stdout))
    }
}
