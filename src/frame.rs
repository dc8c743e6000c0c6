use image::{DynamicImage, ImageReader, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{DigitizeError, Result};
use crate::models::Color;

/// Immutable RGB raster the pipeline runs on
///
/// Cloning is cheap; the pixels are shared.
#[derive(Clone, Debug)]
pub struct ImageFrame {
    pixels: Arc<RgbImage>,
}

impl ImageFrame {
    /// Wrap an RGB buffer
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels: Arc::new(pixels) }
    }

    /// Normalize any decoded image to RGB; alpha is composited over white
    pub fn from_dynamic(img: DynamicImage) -> Self {
        if !img.color().has_alpha() {
            return Self::new(img.to_rgb8());
        }

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let rgb = RgbImage::from_fn(width, height, |x, y| {
            let px = rgba.get_pixel(x, y);
            let alpha = px[3] as u32;
            let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
            image::Rgb([blend(px[0]), blend(px[1]), blend(px[2])])
        });
        Self::new(rgb)
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

    pub fn color_at(&self, x: u32, y: u32) -> Color {
        Color::from_rgb(self.pixels.get_pixel(x, y))
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Copy out a rectangle, clamped to the frame
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
        let x = x.min(self.width().saturating_sub(1));
        let y = y.min(self.height().saturating_sub(1));
        let width = width.min(self.width() - x);
        let height = height.min(self.height() - y);
        image::imageops::crop_imm(self.pixels.as_ref(), x, y, width, height).to_image()
    }
}

/// Where an image comes from
#[derive(Debug, Clone)]
pub enum FrameInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Turns encoded image data into an [`ImageFrame`]
pub trait FrameDecoder: Send + Sync {
    fn load(&self, input: FrameInput) -> Result<ImageFrame>;
}

/// Decoder backed by the `image` crate's format detection
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl FrameDecoder for ImageCrateDecoder {
    fn load(&self, input: FrameInput) -> Result<ImageFrame> {
        let img = match input {
            FrameInput::Path(path) => ImageReader::open(&path)
                .map_err(|e| DigitizeError::Decode(format!("{}: {}", path.display(), e)))?
                .with_guessed_format()
                .map_err(|e| DigitizeError::Decode(format!("{}: {}", path.display(), e)))?
                .decode()?,
            FrameInput::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(DigitizeError::Decode("input image data is empty".to_string()));
                }
                ImageReader::new(Cursor::new(bytes))
                    .with_guessed_format()
                    .map_err(|e| DigitizeError::Decode(e.to_string()))?
                    .decode()?
            }
        };

        if img.width() == 0 || img.height() == 0 {
            return Err(DigitizeError::Decode("image has zero size".to_string()));
        }

        Ok(ImageFrame::from_dynamic(img))
    }
}
