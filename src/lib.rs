pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod models;
pub mod pipeline;

pub use config::DigitizerConfig;
pub use error::{DigitizeError, Result};
pub use frame::{FrameDecoder, FrameInput, ImageCrateDecoder, ImageFrame};
pub use models::{
    AxisCalibration, AxisFrame, AxisKind, AxisScale, ClusterDiagnostic, Color, CurveCluster, DataPoint,
    DataSeries, Digitization, IndependentAxis,
};
pub use pipeline::{DebugConfig, Digitizer, PartialRun, PipelineContext, Stage};
