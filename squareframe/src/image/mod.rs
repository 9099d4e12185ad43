//! Image pipeline: decode (with the HEIC fallback chain), frame, encode

pub mod decode;
mod encode;
mod frame;
pub mod strategy;

// Re-export public API
pub use decode::{DecodeError, Decoder};
pub use encode::{compress_to_jpeg, compress_to_png, encode, EncodedImage, PngCompression};
pub use frame::{frame, CanvasTooLarge, FrameGeometry, FramedImage, FramingParameters};

use imageproc::image::{DynamicImage, GenericImageView};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, strum::Display)]
pub enum ImageFormat {
    #[strum(to_string = "JPEG")]
    Jpeg { quality: u8 },
    #[strum(to_string = "PNG")]
    Png { compression: PngCompression },
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "jpg",
            ImageFormat::Png { .. } => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "image/jpeg",
            ImageFormat::Png { .. } => "image/png",
        }
    }
}

/// A raster produced from a [`crate::SourceImage`]. Framing only ever borrows it.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: DynamicImage,
}

impl DecodedImage {
    pub fn new(pixels: DynamicImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }
}

impl From<DynamicImage> for DecodedImage {
    fn from(pixels: DynamicImage) -> Self {
        Self::new(pixels)
    }
}

/// Bytes to megabytes, as shown in the info panels.
pub(crate) fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_and_extensions() {
        let jpeg = ImageFormat::Jpeg { quality: 90 };
        let png = ImageFormat::Png {
            compression: PngCompression::Best,
        };

        assert_eq!(jpeg.to_string(), "JPEG");
        assert_eq!(png.to_string(), "PNG");
        assert_eq!(jpeg.extension(), "jpg");
        assert_eq!(png.extension(), "png");
        assert_eq!(png.mime_type(), "image/png");
    }
}
