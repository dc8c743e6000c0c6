//! Debug renderings of intermediate pipeline results.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::detection::trace::TracedPath;
use crate::frame::ImageFrame;
use crate::models::{AxisFrame, CurveCluster};

const FRAME_BLUE: Rgb<u8> = Rgb([0, 90, 255]);
const TICK_GREEN: Rgb<u8> = Rgb([0, 200, 0]);

/// The input with the plot box and detected ticks drawn over it
pub fn axes_overlay(frame: &ImageFrame, axes: &AxisFrame) -> RgbImage {
    let mut canvas = frame.pixels().clone();
    let b = axes.plot_box;
    draw_hollow_rect_mut(
        &mut canvas,
        Rect::at(b.left as i32, b.top as i32).of_size(b.width(), b.height()),
        FRAME_BLUE,
    );

    let x_row = axes.x_axis.band.1 as f32;
    for &tick in &axes.x_axis.ticks {
        draw_line_segment_mut(&mut canvas, (tick as f32, x_row), (tick as f32, x_row + 6.0), TICK_GREEN);
    }
    let y_col = axes.y_axis.band.0 as f32;
    for &tick in &axes.y_axis.ticks {
        draw_line_segment_mut(&mut canvas, (y_col - 6.0, tick as f32), (y_col, tick as f32), TICK_GREEN);
    }
    canvas
}

/// Every cluster painted in its representative color on white
pub fn clusters_image(width: u32, height: u32, clusters: &[CurveCluster]) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for cluster in clusters {
        let color = cluster.color.to_rgb();
        for &(x, y) in &cluster.pixels {
            canvas.put_pixel(x, y, color);
        }
    }
    canvas
}

/// Traced paths as polylines with a dot per point
pub fn paths_image(width: u32, height: u32, paths: &[TracedPath]) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for path in paths {
        let color = path.color.to_rgb();
        let points: Vec<(f32, f32)> = path.iter().map(|p| (p.x as f32, p.y as f32)).collect();
        for pair in points.windows(2) {
            draw_line_segment_mut(&mut canvas, pair[0], pair[1], color);
        }
        for &(x, y) in &points {
            draw_filled_circle_mut(&mut canvas, (x.round() as i32, y.round() as i32), 1, Rgb([0, 0, 0]));
        }
    }
    canvas
}
