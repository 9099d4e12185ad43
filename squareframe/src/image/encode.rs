//! Image encoding: JPEG, PNG

use anyhow::{Context, Result};
use imageproc::image::{ColorType, DynamicImage, GenericImageView};

use super::{FramedImage, ImageFormat};
use crate::source::SourceImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

/// Compress an image to JPEG format with the specified quality
pub fn compress_to_jpeg<W>(img: &DynamicImage, writer: &mut W, quality: u8) -> Result<()>
where
    W: std::io::Write,
{
    let mut encoder =
        imageproc::image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality);

    // JPEG has no alpha channel
    let rgb;
    let img = match img.color() {
        ColorType::L8 | ColorType::Rgb8 => img,
        _ => {
            rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            &rgb
        }
    };

    encoder
        .encode_image(img)
        .with_context(|| "Failed to compress image to JPEG")?;

    Ok(())
}

/// Compress an image to PNG format with the specified compression level
pub fn compress_to_png<W>(
    img: &DynamicImage,
    writer: &mut W,
    compression: PngCompression,
) -> Result<()>
where
    W: std::io::Write,
{
    use imageproc::image::codecs::png::{CompressionType, FilterType, PngEncoder};
    use imageproc::image::ImageEncoder;

    let compression_type = match compression {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    };

    let is_grayscale = img.color() == ColorType::L8 || img.color() == ColorType::La8;

    let encoder = PngEncoder::new_with_quality(
        writer,
        compression_type,
        if is_grayscale {
            FilterType::NoFilter
        } else {
            FilterType::Adaptive
        },
    );

    encoder
        .write_image(
            img.as_bytes(),
            img.width(),
            img.height(),
            img.color().into(),
        )
        .with_context(|| "Failed to compress image to PNG")?;

    Ok(())
}

/// A framed image ready to be written out under its download name.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub file_name: String,
    pub data: Vec<u8>,
    pub dimensions: (u32, u32),
    pub format: ImageFormat,
}

/// Encode a framed image in `format`, named after the source it came from.
pub fn encode(framed: &FramedImage, source: &SourceImage, format: ImageFormat) -> EncodedImage {
    let file_name = format!(
        "{}_square_framed.{}",
        source.base_name(),
        format.extension()
    );

    let img = framed.to_dynamic();
    let dimensions = img.dimensions();

    let encoded = EncodedImage {
        file_name,
        data: encode_image(&img, &format),
        dimensions,
        format,
    };

    log::trace!("Encoded image: {}", encoded.file_name);
    encoded
}

fn encode_image(img: &DynamicImage, format: &ImageFormat) -> Vec<u8> {
    let (width, height) = img.dimensions();
    let mut buffer = Vec::with_capacity((width * height) as usize);

    match format {
        ImageFormat::Jpeg { quality } => {
            compress_to_jpeg(img, &mut buffer, *quality).expect("Writing to vec should never fail");
        }
        ImageFormat::Png { compression } => {
            compress_to_png(img, &mut buffer, *compression)
                .expect("Writing to vec should never fail");
        }
    }

    buffer
}
