use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{DigitizeError, Result};
use crate::models::{AxisKind, PixelBox};

/// A tick label crop handed to the OCR collaborator
#[derive(Debug, Clone)]
pub struct LabelRegion {
    pub axis: AxisKind,
    /// Tick position along the axis this label belongs to
    pub tick: f64,
    /// Where the crop was taken from in the frame
    pub bbox: PixelBox,
    /// The crop, already padded and upscaled
    pub image: DynamicImage,
}

/// Text read from a label crop
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// In [0, 1]
    pub confidence: f32,
}

/// OCR collaborator.
///
/// Best effort: `None` means nothing was read, and only drops that label.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, region: &LabelRegion) -> Option<Recognition>;
}

/// Recognizer backed by the `ocrs` engine
pub struct OcrsRecognizer {
    engine: OcrEngine,
    /// Reported for every non-empty read; `get_text` exposes no per-line score
    confidence: f32,
}

impl OcrsRecognizer {
    /// Load the detection and recognition models from the standard cache location
    pub fn from_default_models() -> Result<Self> {
        let home_dir = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| DigitizeError::Ocr("cannot locate home directory".to_string()))?;
        Self::from_model_dir(&Path::new(&home_dir).join(".cache/ocrs"))
    }

    pub fn from_model_dir(cache_dir: &Path) -> Result<Self> {
        let detection_model_path = cache_dir.join("text-detection.rten");
        let recognition_model_path = cache_dir.join("text-recognition.rten");

        if !detection_model_path.exists() || !recognition_model_path.exists() {
            return Err(DigitizeError::Ocr(format!(
                "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
                 Expected locations:\n  - {}\n  - {}",
                detection_model_path.display(),
                recognition_model_path.display()
            )));
        }

        let detection_model = load_model(&detection_model_path)?;
        let recognition_model = load_model(&recognition_model_path)?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| DigitizeError::Ocr(e.to_string()))?;

        info!("OCR engine initialized from {}", cache_dir.display());
        Ok(Self { engine, confidence: 0.9 })
    }
}

fn load_model(path: &PathBuf) -> Result<Model> {
    Model::load_file(path).map_err(|e| DigitizeError::Ocr(format!("{}: {}", path.display(), e)))
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&self, region: &LabelRegion) -> Option<Recognition> {
        let img = region.image.to_rgb8();

        let img_source = ImageSource::from_bytes(img.as_raw(), img.dimensions()).ok()?;
        let ocr_input = self.engine.prepare_input(img_source).ok()?;

        match self.engine.get_text(&ocr_input) {
            Ok(text) => {
                let text = text.trim().to_string();
                debug!(axis = %region.axis, tick = region.tick, %text, "ocr read");
                if text.is_empty() {
                    None
                } else {
                    Some(Recognition { text, confidence: self.confidence })
                }
            }
            Err(_) => None,
        }
    }
}
