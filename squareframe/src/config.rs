use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use crate::image::{ImageFormat, PngCompression};

pub const DEFAULT_BORDER_PERCENTAGE: f64 = 2.5;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
// HEIC files above this size are rejected before any conversion attempt
pub const DEFAULT_MAX_HEIC_BYTES: u64 = 15 * 1024 * 1024;
pub const DEFAULT_NATIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// An external converter program and the arguments placed before
/// `<input> <output>` on its command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ConverterCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub border_percentage: f64,
    pub max_heic_bytes: u64,
    #[serde(rename = "native_timeout_secs", with = "duration_secs")]
    pub native_timeout: Duration,
    pub jpeg_quality: u8,
    pub png_compression: PngCompression,
    pub primary_converter: ConverterCommand,
    pub fallback_converter: ConverterCommand,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            border_percentage: DEFAULT_BORDER_PERCENTAGE,
            max_heic_bytes: DEFAULT_MAX_HEIC_BYTES,
            native_timeout: DEFAULT_NATIVE_TIMEOUT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            png_compression: PngCompression::Default,
            // libheif's converter, full-featured
            primary_converter: ConverterCommand::new("heif-convert", &["-q", "90"]),
            // ImageMagick, lower quality default
            fallback_converter: ConverterCommand::new("magick", &["-quality", "80"]),
        }
    }
}

impl FrameConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Like [`FrameConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::metadata(path) {
            Ok(_) => Self::load(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
        }
    }

    /// `~/.config/squareframe/config.json`
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::home_dir()?;
        Some(home.join(".config").join("squareframe").join("config.json"))
    }

    /// Output format for a source, following the "match the input family,
    /// otherwise JPEG" rule.
    pub fn output_format(&self, source_is_png: bool) -> ImageFormat {
        if source_is_png {
            ImageFormat::Png {
                compression: self.png_compression,
            }
        } else {
            ImageFormat::Jpeg {
                quality: self.jpeg_quality,
            }
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
