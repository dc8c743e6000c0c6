use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two plot axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    X,
    Y,
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisKind::X => write!(f, "x"),
            AxisKind::Y => write!(f, "y"),
        }
    }
}

/// Scale of an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisScale {
    #[default]
    Linear,
    Log,
}

/// Pixel direction along which a curve progresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndependentAxis {
    #[default]
    Horizontal,
    Vertical,
}

/// RGB color, used as a curve's signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_rgb(px: &image::Rgb<u8>) -> Self {
        Self::new(px[0], px[1], px[2])
    }

    pub fn to_rgb(self) -> image::Rgb<u8> {
        image::Rgb([self.r, self.g, self.b])
    }

    /// Packed 24-bit value, used for deterministic tie-breaking
    pub fn packed(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    /// Euclidean distance in RGB space
    pub fn distance(self, other: Color) -> f32 {
        let dr = self.r as f32 - other.r as f32;
        let dg = self.g as f32 - other.g as f32;
        let db = self.b as f32 - other.b as f32;
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// Rec. 709 luma, matching `image`'s grayscale conversion
    pub fn luma(self) -> f32 {
        0.2126 * self.r as f32 + 0.7152 * self.g as f32 + 0.0722 * self.b as f32
    }

    /// Spread between the strongest and weakest channel
    pub fn chroma(self) -> u8 {
        let max = self.r.max(self.g).max(self.b);
        let min = self.r.min(self.g).min(self.b);
        max - min
    }

    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Inclusive pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// Shrink by `margin` on every side, or None if nothing is left
    pub fn inset(&self, margin: u32) -> Option<PixelBox> {
        let left = self.left + margin;
        let top = self.top + margin;
        let right = self.right.checked_sub(margin)?;
        let bottom = self.bottom.checked_sub(margin)?;
        if left > right || top > bottom {
            return None;
        }
        Some(PixelBox { left, top, right, bottom })
    }

    /// Grow to include (x, y)
    pub fn include(&mut self, x: u32, y: u32) {
        self.left = self.left.min(x);
        self.top = self.top.min(y);
        self.right = self.right.max(x);
        self.bottom = self.bottom.max(y);
    }

    pub fn at(x: u32, y: u32) -> Self {
        Self { left: x, top: y, right: x, bottom: y }
    }
}

/// A detected axis line and its ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisLine {
    pub kind: AxisKind,
    /// First and last pixel row (x axis) or column (y axis) of the line's thickness
    pub band: (u32, u32),
    /// First and last pixel covered by the line along its own direction
    pub extent: (u32, u32),
    /// Tick positions along the axis, ascending
    pub ticks: Vec<f64>,
    pub scale: AxisScale,
}

impl AxisLine {
    /// Median distance between neighbouring ticks
    pub fn median_tick_spacing(&self) -> Option<f64> {
        let mut gaps: Vec<f64> = self.ticks.windows(2).map(|w| w[1] - w[0]).collect();
        if gaps.is_empty() {
            return None;
        }
        gaps.sort_by(f64::total_cmp);
        Some(gaps[gaps.len() / 2])
    }
}

/// Located coordinate frame of a plot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisFrame {
    /// Interior of the plot, excluding the axis lines
    pub plot_box: PixelBox,
    pub x_axis: AxisLine,
    pub y_axis: AxisLine,
}

impl AxisFrame {
    pub fn axis(&self, kind: AxisKind) -> &AxisLine {
        match kind {
            AxisKind::X => &self.x_axis,
            AxisKind::Y => &self.y_axis,
        }
    }
}

/// A tick position paired with its recognized value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickLabel {
    pub pixel: f64,
    pub value: f64,
    pub confidence: f32,
    pub text: String,
}

/// Pixel to data transform for one axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AxisTransform {
    /// value = offset + slope * pixel
    Linear { offset: f64, slope: f64 },
    /// log10(value) = offset + slope * pixel
    Log { offset: f64, slope: f64 },
}

impl AxisTransform {
    pub fn apply(&self, pixel: f64) -> f64 {
        match *self {
            AxisTransform::Linear { offset, slope } => offset + slope * pixel,
            AxisTransform::Log { offset, slope } => 10f64.powf(offset + slope * pixel),
        }
    }

    pub fn scale(&self) -> AxisScale {
        match self {
            AxisTransform::Linear { .. } => AxisScale::Linear,
            AxisTransform::Log { .. } => AxisScale::Log,
        }
    }
}

/// Fitted calibration of one axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    pub axis: AxisKind,
    pub transform: AxisTransform,
    /// In [0, 1]
    pub confidence: f64,
    /// Largest absolute residual over the fitted labels, in data units
    pub max_residual: f64,
    /// RMS residual relative to the fitted value range (log space for log axes)
    pub relative_residual: f64,
    pub labels: Vec<TickLabel>,
}

impl AxisCalibration {
    pub fn apply(&self, pixel: f64) -> f64 {
        self.transform.apply(pixel)
    }
}

/// Pixels believed to belong to one curve
#[derive(Debug, Clone, PartialEq)]
pub struct CurveCluster {
    pub id: usize,
    pub color: Color,
    /// Pixel coordinates in scan order (row-major)
    pub pixels: Vec<(u32, u32)>,
    pub bbox: PixelBox,
}

impl CurveCluster {
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }
}

/// A sub-pixel position in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

/// Digitized curve in data units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSeries {
    pub curve_id: usize,
    pub color: Color,
    pub points: Vec<DataPoint>,
    pub confidence: f64,
}

/// Why a cluster did not produce a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    TooFewPoints { points: usize, required: usize },
    MultiValued { fraction: f64 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::TooFewPoints { points, required } => {
                write!(f, "only {} traced points (need {})", points, required)
            }
            FailureReason::MultiValued { fraction } => write!(
                f,
                "{:.0}% of steps hold several separate runs (merged curves?)",
                fraction * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDiagnostic {
    pub curve_id: usize,
    pub color: Color,
    pub pixel_count: usize,
    pub reason: FailureReason,
}

/// Result of a full pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digitization {
    pub axes: AxisFrame,
    pub x_calibration: AxisCalibration,
    pub y_calibration: AxisCalibration,
    pub series: Vec<DataSeries>,
    pub failures: Vec<ClusterDiagnostic>,
}
