use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use std::collections::HashMap;
use std::sync::Arc;

use plotscan::detection::{LabelRegion, Recognition, TextRecognizer};
use plotscan::{AxisKind, ImageFrame};

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 230;
/// Row of the x axis line
pub const X_AXIS_ROW: u32 = 200;
/// Column of the y axis line
pub const Y_AXIS_COL: u32 = 10;
/// Top end of the y axis line
pub const Y_AXIS_TOP: u32 = 20;
/// Right end of the x axis line
pub const X_AXIS_RIGHT: u32 = 150;

/// (pixel column, label value) of each x tick
pub const X_TICKS: [(u32, f64); 3] = [(10, 0.0), (60, 5.0), (110, 10.0)];
/// (pixel row, label value) of each y tick
pub const Y_TICKS: [(u32, f64); 4] = [(200, 0.0), (150, 5.0), (100, 10.0), (50, 15.0)];

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const GRID_GRAY: Rgb<u8> = Rgb([200, 200, 200]);

/// White canvas without any plot elements
pub fn blank_canvas() -> RgbImage {
    RgbImage::from_pixel(WIDTH, HEIGHT, WHITE)
}

/// White canvas with both axes and outward tick marks (no labels, no data)
///
/// One x tick is 10 px and one y tick is 50 px apart in pixels, 5 units apart
/// in data, so the data transform is x = (px - 10) / 10 and y = (200 - py) / 10.
pub fn plot_canvas() -> RgbImage {
    let mut img = blank_canvas();
    draw_segment(&mut img, (Y_AXIS_COL, X_AXIS_ROW), (X_AXIS_RIGHT, X_AXIS_ROW), BLACK);
    draw_segment(&mut img, (Y_AXIS_COL, Y_AXIS_TOP), (Y_AXIS_COL, X_AXIS_ROW), BLACK);
    for (x, _) in X_TICKS {
        draw_segment(&mut img, (x, X_AXIS_ROW + 1), (x, X_AXIS_ROW + 5), BLACK);
    }
    for (y, _) in Y_TICKS {
        draw_segment(&mut img, (Y_AXIS_COL - 5, y), (Y_AXIS_COL - 1, y), BLACK);
    }
    img
}

/// [`plot_canvas`] closed by 3 px top and right spines
pub fn framed_canvas() -> RgbImage {
    let mut img = plot_canvas();
    for y in Y_AXIS_TOP..Y_AXIS_TOP + 3 {
        draw_segment(&mut img, (Y_AXIS_COL, y), (X_AXIS_RIGHT, y), BLACK);
    }
    for x in X_AXIS_RIGHT - 2..=X_AXIS_RIGHT {
        draw_segment(&mut img, (x, Y_AXIS_TOP), (x, X_AXIS_ROW), BLACK);
    }
    img
}

pub fn draw_segment(img: &mut RgbImage, from: (u32, u32), to: (u32, u32), color: Rgb<u8>) {
    draw_line_segment_mut(
        img,
        (from.0 as f32, from.1 as f32),
        (to.0 as f32, to.1 as f32),
        color,
    );
}

/// Light gridlines on every tick, inside the plot area
pub fn draw_gridlines(img: &mut RgbImage, color: Rgb<u8>) {
    for (y, _) in Y_TICKS.iter().filter(|(y, _)| *y != X_AXIS_ROW) {
        draw_segment(img, (Y_AXIS_COL + 1, *y), (X_AXIS_RIGHT, *y), color);
    }
    for (x, _) in X_TICKS.iter().filter(|(x, _)| *x != Y_AXIS_COL) {
        draw_segment(img, (*x, Y_AXIS_TOP), (*x, X_AXIS_ROW - 1), color);
    }
}

/// The line y = x for x in [1, 10], in data coordinates
pub fn draw_identity_curve(img: &mut RgbImage, color: Rgb<u8>) {
    draw_segment(img, (20, 190), (110, 100), color);
}

/// Plot of y = x in red
pub fn identity_plot() -> ImageFrame {
    let mut img = plot_canvas();
    draw_identity_curve(&mut img, RED);
    ImageFrame::new(img)
}

/// Data pixel column to x value
pub fn x_value(px: f64) -> f64 {
    (px - 10.0) / 10.0
}

/// Data pixel row to y value
pub fn y_value(py: f64) -> f64 {
    (200.0 - py) / 10.0
}

/// Recognizer answering from a fixed table keyed by axis and tick position
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    labels: HashMap<(AxisKind, i64), String>,
    pub confidence: f32,
}

impl MockRecognizer {
    pub fn empty() -> Self {
        Self {
            labels: HashMap::new(),
            confidence: 0.95,
        }
    }

    /// Reads every tick label of [`plot_canvas`] correctly
    pub fn for_plot() -> Self {
        let mut mock = Self::empty();
        for (x, value) in X_TICKS {
            mock = mock.with_label(AxisKind::X, x as f64, &value.to_string());
        }
        for (y, value) in Y_TICKS {
            mock = mock.with_label(AxisKind::Y, y as f64, &value.to_string());
        }
        mock
    }

    pub fn with_label(mut self, axis: AxisKind, tick: f64, text: &str) -> Self {
        self.labels.insert((axis, tick.round() as i64), text.to_string());
        self
    }

    pub fn without(mut self, axis: AxisKind, tick: f64) -> Self {
        self.labels.remove(&(axis, tick.round() as i64));
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn shared(self) -> Arc<dyn TextRecognizer> {
        Arc::new(self)
    }
}

impl TextRecognizer for MockRecognizer {
    fn recognize(&self, region: &LabelRegion) -> Option<Recognition> {
        let text = self.labels.get(&(region.axis, region.tick.round() as i64))?;
        Some(Recognition {
            text: text.clone(),
            confidence: self.confidence,
        })
    }
}
