use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DigitizeError, Result};
use crate::models::IndependentAxis;

/// Tunables for every pipeline stage
///
/// All sections fall back to their defaults when missing from a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitizerConfig {
    pub axes: AxisConfig,
    pub calibration: CalibrationConfig,
    pub segmentation: SegmentationConfig,
    pub trace: TraceConfig,
}

impl DigitizerConfig {
    /// Load from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: DigitizerConfig =
            serde_json::from_str(text).map_err(|e| DigitizeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        let a = &self.axes;
        if !(a.min_axis_fraction > 0.0 && a.min_axis_fraction <= 1.0) {
            return Err(DigitizeError::Config("axes.min_axis_fraction must be in (0, 1]".into()));
        }
        if a.min_tick_len == 0 || a.min_tick_len > a.max_tick_len {
            return Err(DigitizeError::Config(
                "axes.min_tick_len must be positive and at most axes.max_tick_len".into(),
            ));
        }

        let c = &self.calibration;
        if c.max_relative_residual <= 0.0 {
            return Err(DigitizeError::Config(
                "calibration.max_relative_residual must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.min_ocr_confidence) {
            return Err(DigitizeError::Config(
                "calibration.min_ocr_confidence must be in [0, 1]".into(),
            ));
        }
        if c.label_depth == 0 || c.label_half_span == 0 {
            return Err(DigitizeError::Config("calibration label region must not be empty".into()));
        }

        let s = &self.segmentation;
        if s.color_threshold <= 0.0 {
            return Err(DigitizeError::Config("segmentation.color_threshold must be positive".into()));
        }
        if !(s.gridline_fraction > 0.0 && s.gridline_fraction <= 1.0) {
            return Err(DigitizeError::Config(
                "segmentation.gridline_fraction must be in (0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&s.min_series_span) {
            return Err(DigitizeError::Config(
                "segmentation.min_series_span must be in [0, 1]".into(),
            ));
        }
        if s.link_radius == 0 {
            return Err(DigitizeError::Config("segmentation.link_radius must be at least 1".into()));
        }

        let t = &self.trace;
        if t.min_points < 2 {
            return Err(DigitizeError::Config("trace.min_points must be at least 2".into()));
        }
        if !(0.0..=1.0).contains(&t.max_multivalued_fraction) {
            return Err(DigitizeError::Config(
                "trace.max_multivalued_fraction must be in [0, 1]".into(),
            ));
        }

        Ok(())
    }
}

/// Axis line and tick mark detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    /// Darkest allowed luma for axis pixels
    pub axis_max_luma: u8,
    /// Largest channel spread for axis pixels (axes are gray/black)
    pub axis_max_chroma: u8,
    /// Minimum run length of an axis line, as a fraction of the image size
    pub min_axis_fraction: f64,
    /// Gaps up to this many pixels do not break an axis run
    pub max_run_gap: u32,
    pub min_tick_len: u32,
    pub max_tick_len: u32,
    /// Tick candidates closer than this are one tick
    pub min_tick_spacing: f64,
    /// Tick spacing coefficient of variation above which a log progression is looked for
    pub log_spacing_cv: f64,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            axis_max_luma: 100,
            axis_max_chroma: 40,
            min_axis_fraction: 0.3,
            max_run_gap: 1,
            min_tick_len: 2,
            max_tick_len: 12,
            min_tick_spacing: 3.0,
            log_spacing_cv: 0.25,
        }
    }
}

/// Tick label reading and transform fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// How far past the axis band a label may reach
    pub label_depth: u32,
    /// Half-width of a label region along the axis, capped at half the tick spacing
    pub label_half_span: u32,
    /// Side length labels are upscaled to before OCR
    pub ocr_target_size: u32,
    pub min_ocr_confidence: f32,
    /// Allowed relative deviation of Δvalue/Δpixel from its median for a linear axis
    pub linear_tolerance: f64,
    /// Largest acceptable relative RMS residual of a fit
    pub max_relative_residual: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            label_depth: 40,
            label_half_span: 30,
            ocr_target_size: 100,
            min_ocr_confidence: 0.5,
            linear_tolerance: 0.05,
            max_relative_residual: 0.05,
        }
    }
}

/// Curve pixel isolation and grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Pixels kept clear of the axis lines inside the plot box
    pub axis_margin: u32,
    /// Minimum RGB distance from the background for a foreground pixel
    pub background_distance: f32,
    /// Maximum RGB distance for a color to join a palette entry
    pub color_threshold: f32,
    /// Minimum pixel count for a color to start its own palette entry
    pub min_seed_pixels: usize,
    /// Light pixels covering this fraction of a row/column form a gridline
    pub gridline_fraction: f64,
    /// Luma above which a foreground pixel may belong to a gridline
    pub gridline_min_luma: u8,
    /// Achromatic dark components no larger than this in both directions may be text; 0 disables
    pub max_text_extent: u32,
    /// Compact components of one color closer than this chain together
    pub series_link_gap: u32,
    /// A chain with at least this many compact components can be a marker or dash series
    pub min_series_marks: usize,
    /// Fraction of the plot width or height a chain must span to be kept as a series
    pub min_series_span: f64,
    /// Morphological closing radius applied per color before grouping; 0 disables
    pub close_gaps: u8,
    /// Chebyshev distance linking same-colored pixels into one component
    pub link_radius: u32,
    pub min_component_pixels: usize,
    pub min_cluster_pixels: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            axis_margin: 2,
            background_distance: 60.0,
            color_threshold: 40.0,
            min_seed_pixels: 10,
            gridline_fraction: 0.4,
            gridline_min_luma: 150,
            max_text_extent: 12,
            series_link_gap: 16,
            min_series_marks: 3,
            min_series_span: 0.25,
            close_gaps: 0,
            link_radius: 2,
            min_component_pixels: 4,
            min_cluster_pixels: 20,
        }
    }
}

/// How a cluster's pixels collapse into one value per step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceEstimator {
    #[default]
    Median,
    Mean,
}

/// Curve tracing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub independent: IndependentAxis,
    pub estimator: TraceEstimator,
    pub min_points: usize,
    /// Pixels of gap that split one step into separate runs
    pub run_gap: u32,
    /// Fraction of multi-run steps above which a cluster is rejected
    pub max_multivalued_fraction: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            independent: IndependentAxis::Horizontal,
            estimator: TraceEstimator::Median,
            min_points: 2,
            run_gap: 3,
            max_multivalued_fraction: 0.5,
        }
    }
}
