//! The single in-memory editing session: one selected file, one decoded image.

use std::fmt;

use crate::config::FrameConfig;
use crate::image::decode::Decoded;
use crate::image::{
    self, megabytes, CanvasTooLarge, DecodeError, Decoder, EncodedImage, FramedImage,
    FramingParameters,
};
use crate::source::SourceImage;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Please select a valid image file (JPEG, PNG, WebP, HEIC): {0} is {1}")]
    NotAnImage(String, String),

    #[error("No image loaded")]
    NoImage,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    CanvasTooLarge(#[from] CanvasTooLarge),
}

/// Session state. Every transition consumes the old value; a failed
/// selection leaves the caller with a fresh [`Session::Empty`].
#[derive(Debug, Clone, Default)]
pub enum Session {
    #[default]
    Empty,
    Loaded(Loaded),
}

#[derive(Debug, Clone)]
pub struct Loaded {
    decoded: Decoded,
    original_size: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a new file, replacing whatever was loaded before.
    pub fn select(self, source: SourceImage, decoder: &Decoder) -> Result<Session, SessionError> {
        if !source.is_accepted() {
            return Err(SessionError::NotAnImage(
                source.file_name().to_string(),
                source.media_type().to_string(),
            ));
        }

        let original_size = source.size();
        let decoded = decoder.decode(source)?;

        log::debug!(
            "Loaded {} ({}x{})",
            decoded.source.file_name(),
            decoded.image.width(),
            decoded.image.height()
        );

        Ok(Session::Loaded(Loaded {
            decoded,
            original_size,
        }))
    }

    pub fn reset(self) -> Session {
        Session::Empty
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Session::Loaded(_))
    }

    fn loaded(&self) -> Result<&Loaded, SessionError> {
        match self {
            Session::Loaded(loaded) => Ok(loaded),
            Session::Empty => Err(SessionError::NoImage),
        }
    }

    /// The effective source: the converted JPEG for HEIC inputs.
    pub fn source(&self) -> Option<&SourceImage> {
        self.loaded().ok().map(|l| &l.decoded.source)
    }

    /// Frame the loaded image. Recomputed from scratch on every call.
    pub fn frame(&self, params: &FramingParameters) -> Result<FramedImage, SessionError> {
        let loaded = self.loaded()?;
        Ok(image::frame(&loaded.decoded.image, params)?)
    }

    /// Frame and encode, ready to be written under its download name.
    pub fn save(
        &self,
        params: &FramingParameters,
        config: &FrameConfig,
    ) -> Result<EncodedImage, SessionError> {
        let framed = self.frame(params)?;
        self.encode(&framed, config)
    }

    /// Encode an already framed image in the format matching the source.
    pub fn encode(
        &self,
        framed: &FramedImage,
        config: &FrameConfig,
    ) -> Result<EncodedImage, SessionError> {
        let source = &self.loaded()?.decoded.source;
        let format = config.output_format(source.media_type().is_png());

        Ok(image::encode(framed, source, format))
    }

    pub fn source_info(&self) -> Option<SourceInfo> {
        let loaded = self.loaded().ok()?;
        let decoded = &loaded.decoded;
        let (width, height) = decoded.image.dimensions();

        Some(SourceInfo {
            width,
            height,
            size: decoded.source.size(),
            original_size: loaded.original_size,
            media_type: decoded.source.media_type().to_string(),
            converted_by: decoded.converted_by.clone(),
        })
    }
}

/// Summary of the selected file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub size: u64,
    /// Size of the file as selected, before any HEIC conversion
    pub original_size: u64,
    pub media_type: String,
    pub converted_by: Option<String>,
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dimensions: {} × {}px", self.width, self.height)?;
        writeln!(f, "File Size: {:.2} MB", megabytes(self.size))?;
        write!(f, "Format: {}", self.media_type)?;
        if self.converted_by.is_some() {
            write!(
                f,
                " (converted from HEIC, originally {:.2} MB)",
                megabytes(self.original_size)
            )?;
        }
        Ok(())
    }
}

/// Summary of the framed result.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameInfo {
    pub side: u32,
    pub border_size: i64,
    pub border_percentage: f64,
    pub size: u64,
    pub format: image::ImageFormat,
}

impl FrameInfo {
    pub fn new(framed: &FramedImage, params: &FramingParameters, encoded: &EncodedImage) -> Self {
        Self {
            side: framed.side(),
            border_size: framed.geometry().border_size,
            border_percentage: params.border_percentage,
            size: encoded.data.len() as u64,
            format: encoded.format,
        }
    }
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dimensions: {0} × {0}px (Square)", self.side)?;
        writeln!(
            f,
            "Border Size: {}px ({}%)",
            self.border_size, self.border_percentage
        )?;
        writeln!(f, "Estimated Size: {:.2} MB", megabytes(self.size))?;
        write!(f, "Format: {}", self.format)
    }
}
