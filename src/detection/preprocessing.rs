use image::{DynamicImage, GrayImage, Luma, RgbImage};

use crate::config::AxisConfig;
use crate::frame::ImageFrame;
use crate::models::Color;

/// Dark, achromatic pixels as used for axes, ticks and label text
pub fn is_axis_color(color: Color, config: &AxisConfig) -> bool {
    color.luma() <= config.axis_max_luma as f32 && color.chroma() <= config.axis_max_chroma
}

/// Binary mask (255 = axis-colored) over the whole frame
pub fn axis_mask(frame: &ImageFrame, config: &AxisConfig) -> GrayImage {
    let (width, height) = frame.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if is_axis_color(frame.color_at(x, y), config) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Longest run of `true` values, bridging gaps of up to `max_gap` misses.
///
/// Returns inclusive (start, end) indices of the run.
pub fn longest_run(values: impl IntoIterator<Item = bool>, max_gap: u32) -> Option<(u32, u32)> {
    let mut best: Option<(u32, u32)> = None;
    let mut current: Option<(u32, u32)> = None;
    let mut gap = 0u32;

    for (i, hit) in values.into_iter().enumerate() {
        let i = i as u32;
        if hit {
            current = match current {
                Some((start, _)) => Some((start, i)),
                None => Some((i, i)),
            };
            gap = 0;
        } else if let Some(run) = current {
            gap += 1;
            if gap > max_gap {
                best = longer(best, run);
                current = None;
                gap = 0;
            }
        }
    }

    if let Some(run) = current {
        best = longer(best, run);
    }
    best
}

fn longer(best: Option<(u32, u32)>, run: (u32, u32)) -> Option<(u32, u32)> {
    match best {
        Some((s, e)) if e - s >= run.1 - run.0 => Some((s, e)),
        _ => Some(run),
    }
}

/// Length of the unbroken run of `true` values from the start, stopping at `limit + 1`
pub fn leading_run(values: impl IntoIterator<Item = bool>, limit: u32) -> u32 {
    let mut len = 0;
    for hit in values {
        if !hit || len > limit {
            break;
        }
        len += 1;
    }
    len
}

/// Scale a label crop into a square white canvas so small text reaches OCR-friendly size
pub fn prepare_for_ocr(crop: &RgbImage, target_size: u32) -> DynamicImage {
    let (width, height) = crop.dimensions();
    if width == 0 || height == 0 {
        return DynamicImage::ImageRgb8(RgbImage::from_pixel(
            target_size,
            target_size,
            image::Rgb([255, 255, 255]),
        ));
    }

    // Leave a border so glyphs do not touch the canvas edge
    let inner = (target_size as f32 * 0.8).max(1.0);
    let scale = (inner / width as f32).min(inner / height as f32);
    let scaled_w = ((width as f32 * scale) as u32).max(1);
    let scaled_h = ((height as f32 * scale) as u32).max(1);

    let scaled = image::imageops::resize(crop, scaled_w, scaled_h, image::imageops::FilterType::CatmullRom);

    let mut canvas = RgbImage::from_pixel(target_size, target_size, image::Rgb([255, 255, 255]));
    let offset_x = (target_size - scaled_w) / 2;
    let offset_y = (target_size - scaled_h) / 2;
    image::imageops::overlay(&mut canvas, &scaled, offset_x.into(), offset_y.into());

    DynamicImage::ImageRgb8(canvas)
}
