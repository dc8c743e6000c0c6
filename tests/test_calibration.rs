//! Integration tests for tick label calibration.
//!
//! Tests cover:
//! - Fitting linear axes from recognized labels
//! - Dropping unreadable or low-confidence labels
//! - Log axes and ambiguous label sets
//! - Manually supplied ticks
//! - Scale hint breaking exact ties between linear and log fits
//! - Label crops stopping short of axis titles

mod common;

use plotscan::config::{AxisConfig, CalibrationConfig};
use plotscan::detection::{fit_axis, AxisDetector, TickCalibrator};
use plotscan::models::{AxisCalibration, AxisTransform, PixelBox, TickLabel};

use common::*;

fn calibrate_with(recognizer: MockRecognizer) -> plotscan::Result<(AxisCalibration, AxisCalibration)> {
    let frame = identity_plot();
    let axes = AxisDetector::default().detect(&frame)?;
    TickCalibrator::new(CalibrationConfig::default(), AxisConfig::default())
        .with_recognizer(recognizer.shared())
        .calibrate(&frame, &axes, &PipelineContext::new())
}

fn label(pixel: f64, value: f64, confidence: f32) -> TickLabel {
    TickLabel {
        pixel,
        value,
        confidence,
        text: value.to_string(),
    }
}

#[test]
fn test_calibration_reproduces_every_tick() -> anyhow::Result<()> {
    let (x, y) = calibrate_with(MockRecognizer::for_plot())?;

    assert_eq!(x.labels.len(), X_TICKS.len());
    assert_eq!(y.labels.len(), Y_TICKS.len());
    for calibration in [&x, &y] {
        assert_eq!(calibration.transform.scale(), AxisScale::Linear);
        for label in &calibration.labels {
            let error = (calibration.apply(label.pixel) - label.value).abs();
            assert!(error <= calibration.max_residual + 1e-9);
        }
        assert!(calibration.max_residual < 1e-9);
        assert!(calibration.confidence > 0.9);
    }

    assert!((x.apply(35.0) - x_value(35.0)).abs() < 1e-9);
    assert!((y.apply(125.0) - y_value(125.0)).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_unreadable_label_is_skipped() -> anyhow::Result<()> {
    let recognizer = MockRecognizer::for_plot().with_label(AxisKind::Y, 100.0, "Time (s)");
    let (_, y) = calibrate_with(recognizer)?;

    assert_eq!(y.labels.len(), Y_TICKS.len() - 1);
    assert!(y.labels.iter().all(|l| l.pixel != 100.0));
    assert!((y.apply(100.0) - 10.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_single_label_is_insufficient() {
    let mut recognizer = MockRecognizer::for_plot();
    for (x, _) in &X_TICKS[1..] {
        recognizer = recognizer.without(AxisKind::X, *x as f64);
    }

    let result = calibrate_with(recognizer);
    assert!(matches!(
        result,
        Err(DigitizeError::CalibrationInsufficient { axis: AxisKind::X, valid: 1 })
    ));
}

#[test]
fn test_low_confidence_labels_are_ignored() {
    let result = calibrate_with(MockRecognizer::for_plot().with_confidence(0.2));
    assert!(matches!(
        result,
        Err(DigitizeError::CalibrationInsufficient { valid: 0, .. })
    ));
}

#[test]
fn test_without_recognizer_labels_cannot_be_read() -> anyhow::Result<()> {
    let frame = identity_plot();
    let axes = AxisDetector::default().detect(&frame)?;
    let result = TickCalibrator::default().calibrate(&frame, &axes, &PipelineContext::new());

    assert!(matches!(
        result,
        Err(DigitizeError::CalibrationInsufficient { axis: AxisKind::X, valid: 0 })
    ));
    Ok(())
}

#[test]
fn test_manual_ticks_skip_ocr() -> anyhow::Result<()> {
    let frame = identity_plot();
    let axes = AxisDetector::default().detect(&frame)?;
    let (x, y) = TickCalibrator::default()
        .with_manual_ticks(AxisKind::X, vec![(10.0, 0.0), (110.0, 10.0)])
        .with_manual_ticks(AxisKind::Y, vec![(200.0, 0.0), (50.0, 15.0)])
        .calibrate(&frame, &axes, &PipelineContext::new())?;

    assert!((x.apply(60.0) - 5.0).abs() < 1e-9);
    assert!((y.apply(150.0) - 5.0).abs() < 1e-9);
    assert_eq!(x.labels.len(), 2);
    assert_eq!(x.labels[0].confidence, 1.0);
    Ok(())
}

#[test]
fn test_scale_hint_breaks_exact_tie() -> anyhow::Result<()> {
    // two positive labels are fitted exactly by both transforms
    let labels = || vec![label(0.0, 1.0, 0.9), label(100.0, 10.0, 0.9)];
    let config = CalibrationConfig::default();

    let log = fit_axis(AxisKind::X, labels(), AxisScale::Log, &config)?;
    assert!(matches!(log.transform, AxisTransform::Log { .. }));
    assert!((log.apply(50.0) - 10f64.sqrt()).abs() < 1e-9);

    let linear = fit_axis(AxisKind::X, labels(), AxisScale::Linear, &config)?;
    assert!(matches!(linear.transform, AxisTransform::Linear { .. }));
    assert!((linear.apply(50.0) - 5.5).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_label_crop_excludes_axis_title() -> anyhow::Result<()> {
    let mut img = plot_canvas();
    // tick label glyph under the x = 5 tick
    for y in 208..=216 {
        for x in 57..=63 {
            img.put_pixel(x, y, BLACK);
        }
    }
    // axis title further down
    for y in 224..=228 {
        for x in 40..=120 {
            img.put_pixel(x, y, BLACK);
        }
    }
    let frame = ImageFrame::new(img);
    let axes = AxisDetector::default().detect(&frame)?;
    let regions = TickCalibrator::default().label_regions(&frame, &axes.x_axis);

    let region = regions
        .iter()
        .find(|r| (r.tick - 60.0).abs() < 1.0)
        .ok_or_else(|| anyhow::anyhow!("no label region for the middle tick"))?;
    assert_eq!(
        region.bbox,
        PixelBox {
            left: 55,
            top: 206,
            right: 65,
            bottom: 218
        }
    );
    Ok(())
}

#[test]
fn test_geometric_labels_fit_a_log_axis() -> anyhow::Result<()> {
    let labels = vec![
        label(0.0, 1.0, 0.9),
        label(100.0, 10.0, 0.9),
        label(200.0, 100.0, 0.9),
        label(300.0, 1000.0, 0.9),
    ];
    let calibration = fit_axis(AxisKind::Y, labels, AxisScale::Linear, &CalibrationConfig::default())?;

    assert!(matches!(calibration.transform, AxisTransform::Log { .. }));
    assert!((calibration.apply(150.0) - 10f64.powf(1.5)).abs() < 1e-6);
    for label in &calibration.labels {
        assert!((calibration.apply(label.pixel) - label.value).abs() <= calibration.max_residual + 1e-9);
    }
    Ok(())
}

#[test]
fn test_inconsistent_labels_are_ambiguous() {
    let labels = vec![
        label(0.0, 0.0, 0.9),
        label(10.0, 10.0, 0.9),
        label(20.0, 0.0, 0.9),
        label(30.0, 10.0, 0.9),
    ];
    let result = fit_axis(AxisKind::X, labels, AxisScale::Linear, &CalibrationConfig::default());
    assert!(matches!(
        result,
        Err(DigitizeError::CalibrationAmbiguous { axis: AxisKind::X, .. })
    ));
}

#[test]
fn test_most_confident_reading_wins_per_tick() -> anyhow::Result<()> {
    let labels = vec![
        label(10.0, 7.0, 0.6),
        label(10.0, 0.0, 0.9),
        label(60.0, 5.0, 0.9),
        label(110.0, 10.0, 0.9),
    ];
    let calibration = fit_axis(AxisKind::X, labels, AxisScale::Linear, &CalibrationConfig::default())?;

    assert_eq!(calibration.labels.len(), 3);
    assert_eq!(calibration.labels[0].value, 0.0);
    assert!(calibration.max_residual < 1e-9);
    Ok(())
}

#[test]
fn test_repeated_value_is_insufficient() {
    let labels = vec![label(10.0, 5.0, 0.9), label(60.0, 5.0, 0.9)];
    let result = fit_axis(AxisKind::X, labels, AxisScale::Linear, &CalibrationConfig::default());
    assert!(matches!(
        result,
        Err(DigitizeError::CalibrationInsufficient { valid: 2, .. })
    ));
}
