//! HEIC conversion strategies
//!
//! Each strategy turns HEIC bytes into JPEG bytes or fails. Two of them shell
//! out to converter programs that may or may not be installed; the last one
//! asks the `image` crate to load the file directly, which only works when a
//! codec for the encoding is compiled in.

use imageproc::image::{DynamicImage, ImageError, ImageReader};
use tempfile::NamedTempFile;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::encode::compress_to_jpeg;
use crate::config::{ConverterCommand, DEFAULT_JPEG_QUALITY, DEFAULT_NATIVE_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StrategyKind {
    #[strum(to_string = "library")]
    Library,
    #[strum(to_string = "native")]
    Native,
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    /// The capability does not exist in this environment
    #[error("{0} is not available")]
    Missing(String),
    #[error("format not supported: {0}")]
    Unsupported(String),
    #[error("decoder resources not loaded: {0}")]
    ResourceLoad(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("{0}")]
    Failed(String),
}

pub trait DecodeStrategy {
    fn name(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    /// Convert HEIC bytes to JPEG bytes.
    fn convert(&self, bytes: &[u8]) -> Result<Vec<u8>, StrategyError>;
}

/// A converter program invoked as `<program> <args..> <input> <output>`.
pub struct ExternalConverter {
    name: String,
    command: ConverterCommand,
}

impl ExternalConverter {
    pub fn new(name: impl Into<String>, command: ConverterCommand) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }
}

impl DecodeStrategy for ExternalConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Library
    }

    fn convert(&self, bytes: &[u8]) -> Result<Vec<u8>, StrategyError> {
        let dir = tempfile::tempdir().map_err(|e| StrategyError::Failed(e.to_string()))?;
        let input = dir.path().join("input.heic");
        let output = dir.path().join("output.jpg");

        std::fs::write(&input, bytes).map_err(|e| StrategyError::Failed(e.to_string()))?;

        let result = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(&input)
            .arg(&output)
            .output();

        let result = match result {
            Ok(result) => result,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StrategyError::Missing(self.command.program.clone()));
            }
            Err(e) => {
                return Err(StrategyError::ResourceLoad(format!(
                    "failed to start {}: {e}",
                    self.command.program
                )));
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stdout = String::from_utf8_lossy(&result.stdout);
            let message = format!("{} {}", stderr.trim(), stdout.trim()).trim().to_string();
            return Err(classify_output(result.status.code(), message));
        }

        std::fs::read(&output).map_err(|e| {
            StrategyError::Failed(format!("{} produced no output: {e}", self.command.program))
        })
    }
}

fn classify_output(code: Option<i32>, message: String) -> StrategyError {
    let lower = message.to_lowercase();

    if lower.contains("not supported") || lower.contains("unsupported") {
        StrategyError::Unsupported(message)
    } else if lower.contains("not loaded")
        || lower.contains("fetch")
        || lower.contains("no decode delegate")
    {
        StrategyError::ResourceLoad(message)
    } else {
        StrategyError::Failed(format!("exited with code {code:?}: {message}"))
    }
}

type Loader = fn(&Path) -> Result<DynamicImage, ImageError>;

/// Load the file through the `image` crate's own codecs, bounded by a timeout.
///
/// The bytes are staged in a temp file that is removed when the attempt
/// returns, including on timeout.
pub struct NativeDecoder {
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
    loader: Loader,
}

impl NativeDecoder {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            scratch_dir: None,
            loader: load_with_guessed_format,
        }
    }

    /// Stage temp files in `dir` instead of the system temp directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    #[cfg(test)]
    fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = loader;
        self
    }

    fn stage(&self, bytes: &[u8]) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("squareframe-").suffix(".heic");

        let mut handle = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        handle.write_all(bytes)?;
        handle.flush()?;
        Ok(handle)
    }
}

impl Default for NativeDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_NATIVE_TIMEOUT)
    }
}

impl DecodeStrategy for NativeDecoder {
    fn name(&self) -> &str {
        "native"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Native
    }

    fn convert(&self, bytes: &[u8]) -> Result<Vec<u8>, StrategyError> {
        let handle = self
            .stage(bytes)
            .map_err(|e| StrategyError::Failed(format!("failed to stage input: {e}")))?;

        let path = handle.path().to_path_buf();
        let loader = self.loader;
        let result = run_with_timeout(self.timeout, move || loader(&path));

        // `handle` is dropped on every return path below, removing the file
        let img = match result? {
            Ok(img) => img,
            Err(ImageError::Unsupported(e)) => {
                return Err(StrategyError::Unsupported(e.to_string()));
            }
            Err(e) => return Err(StrategyError::Failed(e.to_string())),
        };

        let mut jpeg = Vec::new();
        compress_to_jpeg(&img, &mut jpeg, DEFAULT_JPEG_QUALITY)
            .map_err(|e| StrategyError::Failed(e.to_string()))?;
        Ok(jpeg)
    }
}

fn load_with_guessed_format(path: &Path) -> Result<DynamicImage, ImageError> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

/// Run `f` on a worker thread and wait at most `timeout` for it.
///
/// A worker that outlives the timeout is abandoned; its result is dropped.
pub fn run_with_timeout<T, F>(timeout: Duration, f: F) -> Result<T, StrategyError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("squareframe-decode".to_string())
        .spawn(move || {
            tx.send(f()).ok();
        })
        .map_err(|e| StrategyError::Failed(format!("failed to spawn worker: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(StrategyError::TimedOut(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(StrategyError::Failed("decode worker panicked".to_string()))
        }
    }
}
