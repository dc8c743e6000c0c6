#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from plotscan for tests
pub use plotscan::detection::{LabelRegion, Recognition, TextRecognizer};
pub use plotscan::{
    AxisFrame, AxisKind, AxisScale, Color, CurveCluster, DigitizeError, Digitizer, DigitizerConfig,
    ImageFrame, PipelineContext,
};
