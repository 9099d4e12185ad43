//! Square framing: centre the image inside a white border and pad to a square

use imageproc::image::{imageops, DynamicImage, RgbImage, Rgba, RgbaImage};

use super::DecodedImage;
use crate::config::DEFAULT_BORDER_PERCENTAGE;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Largest canvas `frame` will allocate, counted in RGBA bytes.
pub const MAX_CANVAS_BYTES: u64 = 1 << 30;

#[derive(Debug, thiserror::Error)]
#[error("Framed image would be {side} × {side}px, too large to allocate")]
pub struct CanvasTooLarge {
    pub side: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramingParameters {
    /// Border thickness as a percentage of the image's longer side.
    /// Not bounds-checked: negative values shrink the canvas and clip the image.
    pub border_percentage: f64,
}

impl FramingParameters {
    /// Non-finite input (NaN, infinities) falls back to the default percentage.
    pub fn new(border_percentage: f64) -> Self {
        if border_percentage.is_finite() {
            Self { border_percentage }
        } else {
            Self::default()
        }
    }
}

impl Default for FramingParameters {
    fn default() -> Self {
        Self {
            border_percentage: DEFAULT_BORDER_PERCENTAGE,
        }
    }
}

/// Layout of a framed image, computed without touching any pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub max_dimension: i64,
    pub border_size: i64,
    pub width_with_border: i64,
    pub height_with_border: i64,
    /// Side of the square before clamping to a drawable size
    pub square_dimension: i64,
    pub x_offset: i64,
    pub y_offset: i64,
    /// Top-left corner of the original image on the canvas
    pub image_x: i64,
    pub image_y: i64,
}

impl FrameGeometry {
    pub fn compute(width: u32, height: u32, params: &FramingParameters) -> Self {
        let (width, height) = (i64::from(width), i64::from(height));
        let max_dimension = width.max(height);
        let border_size = round_half_up(max_dimension as f64 * params.border_percentage / 100.0);

        let width_with_border = width.saturating_add(border_size.saturating_mul(2));
        let height_with_border = height.saturating_add(border_size.saturating_mul(2));
        let square_dimension = width_with_border.max(height_with_border);

        let x_offset = (square_dimension - width_with_border) / 2;
        let y_offset = (square_dimension - height_with_border) / 2;

        Self {
            max_dimension,
            border_size,
            width_with_border,
            height_with_border,
            square_dimension,
            x_offset,
            y_offset,
            image_x: x_offset + border_size,
            image_y: y_offset + border_size,
        }
    }

    /// Side length of the canvas to allocate, at least one pixel, or `None`
    /// when it would not fit in [`MAX_CANVAS_BYTES`].
    pub fn side(&self) -> Option<u32> {
        let side = u32::try_from(self.square_dimension.max(1)).ok()?;
        let bytes = u64::from(side).checked_mul(u64::from(side))?.checked_mul(4)?;
        (bytes <= MAX_CANVAS_BYTES).then_some(side)
    }
}

// Math.round semantics: halves go towards positive infinity
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[derive(Debug, Clone)]
pub struct FramedImage {
    pixels: RgbImage,
    geometry: FrameGeometry,
}

impl FramedImage {
    pub fn side(&self) -> u32 {
        self.pixels.width()
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.pixels.clone())
    }
}

/// Paint `image` at native resolution onto a white square canvas.
///
/// Translucent pixels are blended onto the white fill, so the result is
/// always opaque. The decoded image is only borrowed.
pub fn frame(
    image: &DecodedImage,
    params: &FramingParameters,
) -> Result<FramedImage, CanvasTooLarge> {
    let (width, height) = image.dimensions();
    let geometry = FrameGeometry::compute(width, height, params);
    let side = geometry.side().ok_or(CanvasTooLarge {
        side: geometry.square_dimension,
    })?;

    log::debug!(
        "Framing {width}x{height} with {}% border: {side}x{side} canvas, image at ({}, {})",
        params.border_percentage,
        geometry.image_x,
        geometry.image_y
    );

    let mut canvas = RgbaImage::from_pixel(side, side, WHITE);
    imageops::overlay(&mut canvas, image.pixels(), geometry.image_x, geometry.image_y);

    Ok(FramedImage {
        pixels: DynamicImage::ImageRgba8(canvas).into_rgb8(),
        geometry,
    })
}
