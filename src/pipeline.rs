use image::DynamicImage;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::DigitizerConfig;
use crate::detection::axes::AxisDetector;
use crate::detection::calibration::{CalibratedAxes, TickCalibrator};
use crate::detection::mapping::CoordinateMapper;
use crate::detection::ocr::TextRecognizer;
use crate::detection::render;
use crate::detection::segmentation::CurveSegmenter;
use crate::detection::trace::{CurveTracer, TracedPath};
use crate::error::{DigitizeError, Result};
use crate::frame::ImageFrame;
use crate::models::{AxisFrame, AxisKind, CurveCluster, Digitization};

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context available to all pipeline stages
#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
    started: Instant,
    deadline: Option<Duration>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self {
            debug: None,
            started: Instant::now(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_debug(mut self, debug: Option<DebugConfig>) -> Self {
        self.debug = debug;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| self.elapsed() >= d)
    }

    /// Fail the whole run once the deadline has passed
    pub fn check_deadline(&self, stage: &str) -> Result<()> {
        if self.deadline_passed() {
            return Err(DigitizeError::DeadlineExceeded {
                stage: stage.to_string(),
                elapsed_ms: self.elapsed().as_millis(),
            });
        }
        Ok(())
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.is_some()
    }

    /// Write an image under `<debug dir>/<step_dir>/<filename>` when debug mode is on
    pub fn save_debug_image(&self, step_dir: &str, filename: &str, image: &DynamicImage) -> Result<()> {
        let Some(debug_config) = &self.debug else {
            return Ok(());
        };

        let dir = debug_config.output_dir.join(step_dir);
        std::fs::create_dir_all(&dir)?;
        image
            .save(dir.join(filename))
            .map_err(|e| DigitizeError::Io(std::io::Error::other(format!("Failed to save debug image: {}", e))))?;
        debug!("Debug: saved {}/{}", step_dir, filename);
        Ok(())
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of the digitization chain.
///
/// Each stage consumes its input and hands a fresh artifact to the next one.
pub trait Stage: Send + Sync {
    type Input;
    type Output;

    fn process(&self, input: Self::Input, context: &PipelineContext) -> Result<Self::Output>;

    /// Human-readable name for this stage (used in logs)
    fn name(&self) -> &str;
}

/// Intermediate results of a run stopped after a given number of stages
#[derive(Debug, Default)]
pub struct PartialRun {
    pub axes: Option<AxisFrame>,
    pub calibration: Option<CalibratedAxes>,
    pub clusters: Option<Vec<CurveCluster>>,
    pub paths: Option<Vec<TracedPath>>,
    pub digitization: Option<Digitization>,
}

/// Runs the full image-to-data chain on one frame at a time
pub struct Digitizer {
    config: DigitizerConfig,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    manual_ticks: Vec<(AxisKind, Vec<(f64, f64)>)>,
    debug: Option<DebugConfig>,
    deadline: Option<Duration>,
}

impl Digitizer {
    /// Axis detection, calibration, segmentation, tracing and mapping
    pub const STAGE_COUNT: usize = 5;

    pub fn new(config: DigitizerConfig) -> Self {
        Self {
            config,
            recognizer: None,
            manual_ticks: Vec::new(),
            debug: None,
            deadline: None,
        }
    }

    pub fn config(&self) -> &DigitizerConfig {
        &self.config
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Calibrate `axis` from known (pixel, value) pairs instead of OCR
    pub fn with_manual_ticks(mut self, axis: AxisKind, pairs: Vec<(f64, f64)>) -> Self {
        self.manual_ticks.retain(|(a, _)| *a != axis);
        self.manual_ticks.push((axis, pairs));
        self
    }

    /// Fail any run that takes longer than `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(DigitizeError::Config(format!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    fn context(&self) -> PipelineContext {
        PipelineContext::new()
            .with_deadline(self.deadline)
            .with_debug(self.debug.clone())
    }

    fn calibrator(&self) -> TickCalibrator {
        let mut calibrator = TickCalibrator::new(self.config.calibration.clone(), self.config.axes.clone());
        if let Some(recognizer) = &self.recognizer {
            calibrator = calibrator.with_recognizer(recognizer.clone());
        }
        for (axis, pairs) in &self.manual_ticks {
            calibrator = calibrator.with_manual_ticks(*axis, pairs.clone());
        }
        calibrator
    }

    /// Digitize every curve in the frame
    pub fn run(&self, frame: ImageFrame) -> Result<Digitization> {
        self.execute(frame, Self::STAGE_COUNT)?
            .digitization
            .ok_or(DigitizeError::NoCurvesDetected)
    }

    /// Run only the first `num_stages` stages (useful for debugging)
    pub fn run_partial(&self, frame: ImageFrame, num_stages: usize) -> Result<PartialRun> {
        self.execute(frame, num_stages)
    }

    fn execute(&self, frame: ImageFrame, num_stages: usize) -> Result<PartialRun> {
        let context = self.context();
        let mut partial = PartialRun::default();
        let (width, height) = frame.dimensions();
        info!("Digitizing {}x{} image", width, height);

        context.save_debug_image("00_input", "frame.png", &DynamicImage::ImageRgb8(frame.pixels().clone()))?;

        // Stage 1: axis frame
        let detector = AxisDetector::new(self.config.axes.clone());
        let axes = run_stage(&detector, frame.clone(), &context)?;
        if context.debug_enabled() {
            let overlay = render::axes_overlay(&frame, &axes);
            context.save_debug_image("01_axis_detection", "axes.png", &DynamicImage::ImageRgb8(overlay))?;
        }
        partial.axes = Some(axes.clone());
        if num_stages <= 1 {
            return Ok(partial);
        }

        // Stage 2: tick calibration
        let calibrated = run_stage(&self.calibrator(), (frame.clone(), axes.clone()), &context)?;
        partial.calibration = Some(calibrated.clone());
        if num_stages <= 2 {
            return Ok(partial);
        }

        // Stage 3: segmentation
        let segmenter = CurveSegmenter::new(self.config.segmentation.clone(), self.config.axes.clone());
        let clusters = run_stage(&segmenter, (frame, axes.clone()), &context)?;
        if context.debug_enabled() {
            let image = render::clusters_image(width, height, &clusters);
            context.save_debug_image("03_segmentation", "clusters.png", &DynamicImage::ImageRgb8(image))?;
        }
        partial.clusters = Some(clusters.clone());
        if num_stages <= 3 {
            return Ok(partial);
        }

        // Stage 4: per-curve tracing, in parallel
        let tracer = CurveTracer::new(self.config.trace.clone());
        let plot_box = axes.plot_box;
        context.check_deadline(tracer.name())?;
        debug!("Running step: {} ({} clusters)", tracer.name(), clusters.len());
        let traced: Vec<std::result::Result<TracedPath, _>> = clusters
            .into_par_iter()
            .map(|cluster| {
                context.check_deadline(tracer.name())?;
                tracer.process((cluster, plot_box), &context)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut paths = Vec::new();
        let mut failures = Vec::new();
        for outcome in traced {
            match outcome {
                Ok(path) => paths.push(path),
                Err(diagnostic) => {
                    warn!(
                        "Curve {} ({}) not traced: {}",
                        diagnostic.curve_id,
                        diagnostic.color.hex(),
                        diagnostic.reason
                    );
                    failures.push(diagnostic);
                }
            }
        }
        if context.debug_enabled() {
            let image = render::paths_image(width, height, &paths);
            context.save_debug_image("04_tracing", "paths.png", &DynamicImage::ImageRgb8(image))?;
        }
        partial.paths = Some(paths.clone());
        if num_stages <= 4 {
            return Ok(partial);
        }

        // Stage 5: pixel to data mapping
        let CalibratedAxes { x, y, .. } = calibrated;
        let mapper = CoordinateMapper::new(x.clone(), y.clone());
        let series = paths
            .into_iter()
            .map(|path| run_stage(&mapper, path, &context))
            .collect::<Result<Vec<_>>>()?;
        context.check_deadline("result assembly")?;

        info!(
            "Digitized {} curve(s), {} failed, in {} ms",
            series.len(),
            failures.len(),
            context.elapsed().as_millis()
        );

        partial.digitization = Some(Digitization {
            axes,
            x_calibration: x,
            y_calibration: y,
            series,
            failures,
        });
        Ok(partial)
    }
}

fn run_stage<S: Stage>(stage: &S, input: S::Input, context: &PipelineContext) -> Result<S::Output> {
    context.check_deadline(stage.name())?;
    debug!("Running step: {}", stage.name());
    stage.process(input, context)
}
