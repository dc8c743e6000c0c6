use thiserror::Error;

use crate::models::AxisKind;

/// Errors that end a single image's digitization run.
///
/// None of these are fatal to the process; the caller decides how to report
/// them.
#[derive(Error, Debug)]
pub enum DigitizeError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("No plot frame found: {0}")]
    AxisNotFound(String),

    #[error("Not enough readable tick labels on the {axis} axis ({valid} valid, need 2)")]
    CalibrationInsufficient { axis: AxisKind, valid: usize },

    #[error(
        "Tick labels on the {axis} axis fit neither a linear ({linear_residual:.4}) nor a log ({log_residual:.4}) scale"
    )]
    CalibrationAmbiguous {
        axis: AxisKind,
        linear_residual: f64,
        log_residual: f64,
    },

    #[error("No curves left after segmentation")]
    NoCurvesDetected,

    #[error("Processing deadline exceeded after {elapsed_ms} ms (during {stage})")]
    DeadlineExceeded { stage: String, elapsed_ms: u128 },

    #[error("OCR engine error: {0}")]
    Ocr(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for DigitizeError {
    fn from(err: image::ImageError) -> Self {
        DigitizeError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DigitizeError>;
