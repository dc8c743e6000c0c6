pub mod preprocessing;
pub mod contours;
pub mod axes;
pub mod ocr;
pub mod calibration;
pub mod segmentation;
pub mod trace;
pub mod mapping;
pub mod render;

use std::sync::Arc;

use crate::config::DigitizerConfig;
use crate::error::Result;
use crate::pipeline::Digitizer;

pub use axes::AxisDetector;
pub use calibration::{fit_axis, parse_tick_value, CalibratedAxes, TickCalibrator};
pub use mapping::CoordinateMapper;
pub use ocr::{LabelRegion, OcrsRecognizer, Recognition, TextRecognizer};
pub use segmentation::CurveSegmenter;
pub use trace::{CurveTracer, TraceIter, TraceStep, TracedPath};

/// Build a digitizer that reads tick labels with the default `ocrs` models
pub fn build_standard_digitizer(config: DigitizerConfig) -> Result<Digitizer> {
    let recognizer = OcrsRecognizer::from_default_models()?;
    Ok(Digitizer::new(config).with_recognizer(Arc::new(recognizer)))
}
