use anyhow::{Context, Result};

use std::fmt;
use std::path::Path;

const HEIC_MIME_TYPES: [&str; 2] = ["image/heic", "image/heif"];
const HEIC_EXTENSIONS: [&str; 2] = [".heic", ".heif"];
const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

/// The declared type of a source file, as a MIME string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType(String);

impl MediaType {
    pub fn new(mime: &str) -> Self {
        Self(mime.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_image(&self) -> bool {
        self.0.starts_with("image/")
    }

    pub fn is_png(&self) -> bool {
        self.0 == "image/png"
    }

    pub fn is_jpeg(&self) -> bool {
        self.0 == "image/jpeg"
    }

    pub fn is_heic(&self) -> bool {
        HEIC_MIME_TYPES.contains(&self.0.as_str())
    }

    /// Sniff from magic bytes, then fall back to the file extension.
    pub fn detect(bytes: &[u8], file_name: &str) -> Self {
        if let Some(kind) = infer::get(bytes) {
            return Self::new(kind.mime_type());
        }

        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let mime = match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "heic" => "image/heic",
            "heif" => "image/heif",
            _ => UNKNOWN_MIME_TYPE,
        };
        Self::new(mime)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user-selected file. Never modified after construction; conversion
/// produces a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    bytes: Vec<u8>,
    media_type: MediaType,
    file_name: String,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, media_type: MediaType, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type,
            file_name: file_name.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let media_type = MediaType::detect(&bytes, &file_name);

        log::debug!("Selected {file_name} ({media_type}, {} bytes)", bytes.len());

        Ok(Self::new(bytes, media_type, file_name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// HEIC by declared type or by file extension.
    pub fn is_heic(&self) -> bool {
        let name = self.file_name.to_ascii_lowercase();
        self.media_type.is_heic() || HEIC_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
    }

    /// Whether this file can be selected at all.
    pub fn is_accepted(&self) -> bool {
        self.is_heic() || self.media_type.is_image()
    }

    /// File name up to its first dot, used to name the framed output.
    pub fn base_name(&self) -> &str {
        match self.file_name.split('.').next() {
            Some(base) if !base.is_empty() => base,
            _ => "image",
        }
    }

    /// The source as it looks after a HEIC conversion: JPEG bytes, a JPEG
    /// type and the extension swapped for `.jpg`.
    pub fn converted(&self, jpeg_bytes: Vec<u8>) -> Self {
        let lower = self.file_name.to_ascii_lowercase();
        let file_name = match HEIC_EXTENSIONS.iter().find(|ext| lower.ends_with(*ext)) {
            Some(ext) => format!("{}.jpg", &self.file_name[..self.file_name.len() - ext.len()]),
            None => self.file_name.clone(),
        };

        Self::new(jpeg_bytes, MediaType::new("image/jpeg"), file_name)
    }
}
