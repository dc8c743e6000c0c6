//! End-to-end tests for the digitizer.
//!
//! Tests cover:
//! - Digitizing a synthetic y = x plot, framed or drawn as black markers
//! - Repeatable results across runs
//! - Deadline enforcement and partial runs
//! - JSON configuration and debug output

mod common;

use plotscan::{FrameDecoder, FrameInput, ImageCrateDecoder};
use std::io::Cursor;
use std::time::Duration;

use common::*;

fn digitizer() -> Digitizer {
    Digitizer::new(DigitizerConfig::default()).with_recognizer(MockRecognizer::for_plot().shared())
}

#[test]
fn test_identity_plot_round_trips() -> anyhow::Result<()> {
    let result = digitizer().run(identity_plot())?;

    assert_eq!(result.series.len(), 1);
    assert!(result.failures.is_empty());

    let series = &result.series[0];
    assert_eq!(series.color, Color::from_rgb(&RED));
    assert!(series.points.len() >= 85);
    assert!(series.confidence > 0.9);
    assert!(series.points.windows(2).all(|w| w[0].x < w[1].x));
    for point in &series.points {
        assert!((point.y - point.x).abs() <= 0.15, "{:?} is off y = x", point);
    }

    let first = series.points[0];
    let last = series.points[series.points.len() - 1];
    assert!((first.x - 1.0).abs() <= 0.15);
    assert!((last.x - 10.0).abs() <= 0.15);
    Ok(())
}

#[test]
fn test_line_from_axis_corner_maps_to_identity() -> anyhow::Result<()> {
    let mut img = plot_canvas();
    draw_segment(&mut img, (10, 200), (110, 100), RED);
    let result = digitizer().run(ImageFrame::new(img))?;

    assert_eq!(result.series.len(), 1);
    let points = &result.series[0].points;
    assert!(points.iter().all(|p| (p.y - p.x).abs() <= 0.15));
    // pixels hugging the axes are left out of segmentation
    assert!(points[0].x < 0.5);
    assert!((points[points.len() - 1].x - 10.0).abs() <= 0.15);
    Ok(())
}

#[test]
fn test_framed_plot_returns_only_the_curve() -> anyhow::Result<()> {
    let mut img = framed_canvas();
    draw_identity_curve(&mut img, RED);
    let result = digitizer().run(ImageFrame::new(img))?;

    assert_eq!(result.series.len(), 1);
    assert!(result.failures.is_empty());
    assert_eq!(result.series[0].color, Color::from_rgb(&RED));
    Ok(())
}

#[test]
fn test_black_marker_series_is_digitized() -> anyhow::Result<()> {
    let mut img = plot_canvas();
    for k in 1..=9u32 {
        let (cx, cy) = (10 + 10 * k, 200 - 10 * k);
        for y in cy - 2..=cy + 2 {
            for x in cx - 2..=cx + 2 {
                img.put_pixel(x, y, BLACK);
            }
        }
    }
    let result = digitizer().run(ImageFrame::new(img))?;

    assert_eq!(result.series.len(), 1);
    let series = &result.series[0];
    assert_eq!(series.color, Color::from_rgb(&BLACK));
    assert_eq!(series.points.len(), 45);
    assert!(series.points.iter().all(|p| (p.y - p.x).abs() <= 0.25));
    Ok(())
}

#[test]
fn test_runs_are_idempotent() -> anyhow::Result<()> {
    let digitizer = digitizer();
    let first = digitizer.run(identity_plot())?;
    let second = digitizer.run(identity_plot())?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_manual_ticks_need_no_recognizer() -> anyhow::Result<()> {
    let digitizer = Digitizer::new(DigitizerConfig::default())
        .with_manual_ticks(AxisKind::X, vec![(10.0, 0.0), (60.0, 5.0)])
        .with_manual_ticks(AxisKind::Y, vec![(200.0, 0.0), (100.0, 10.0)]);
    let result = digitizer.run(identity_plot())?;

    assert_eq!(result.series.len(), 1);
    assert!(result.series[0].points.iter().all(|p| (p.y - p.x).abs() <= 0.15));
    assert!(result.series[0].confidence > 0.999);
    Ok(())
}

#[test]
fn test_merged_curves_are_reported_not_returned() -> anyhow::Result<()> {
    let mut img = plot_canvas();
    draw_identity_curve(&mut img, RED);
    draw_segment(&mut img, (20, 60), (140, 60), image::Rgb([0, 0, 200]));
    draw_segment(&mut img, (20, 120), (140, 120), image::Rgb([0, 0, 210]));

    let result = digitizer().run(ImageFrame::new(img))?;
    assert_eq!(result.series.len(), 1);
    assert_eq!(result.series[0].color, Color::from_rgb(&RED));
    assert_eq!(result.failures.len(), 1);
    assert!(matches!(
        result.failures[0].reason,
        plotscan::models::FailureReason::MultiValued { .. }
    ));
    Ok(())
}

#[test]
fn test_blank_canvas_fails_at_axis_detection() {
    let result = digitizer().run(ImageFrame::new(blank_canvas()));
    assert!(matches!(result, Err(DigitizeError::AxisNotFound(_))));
}

#[test]
fn test_expired_deadline_fails_the_run() {
    let result = digitizer().with_deadline(Duration::ZERO).run(identity_plot());
    assert!(matches!(result, Err(DigitizeError::DeadlineExceeded { .. })));
}

#[test]
fn test_generous_deadline_is_not_hit() -> anyhow::Result<()> {
    let result = digitizer()
        .with_deadline(Duration::from_secs(3600))
        .run(identity_plot())?;
    assert_eq!(result.series.len(), 1);
    Ok(())
}

#[test]
fn test_partial_run_stops_after_requested_stage() -> anyhow::Result<()> {
    let partial = digitizer().run_partial(identity_plot(), 1)?;
    assert!(partial.axes.is_some());
    assert!(partial.calibration.is_none());

    let partial = digitizer().run_partial(identity_plot(), 3)?;
    assert_eq!(partial.clusters.map(|c| c.len()), Some(1));
    assert!(partial.paths.is_none());
    assert!(partial.digitization.is_none());

    let partial = digitizer().run_partial(identity_plot(), 4)?;
    assert_eq!(partial.paths.map(|p| p.len()), Some(1));
    assert!(partial.digitization.is_none());

    let partial = digitizer().run_partial(identity_plot(), Digitizer::STAGE_COUNT)?;
    assert_eq!(partial.digitization.map(|d| d.series.len()), Some(1));
    Ok(())
}

#[test]
fn test_config_loads_from_json() -> anyhow::Result<()> {
    let config = DigitizerConfig::from_json_str(
        r#"{ "segmentation": { "color_threshold": 5.0, "close_gaps": 2 }, "trace": { "estimator": "mean" } }"#,
    )?;
    assert_eq!(config.segmentation.color_threshold, 5.0);
    assert_eq!(config.segmentation.close_gaps, 2);
    assert_eq!(config.segmentation.min_cluster_pixels, 20);
    assert_eq!(config.trace.estimator, plotscan::config::TraceEstimator::Mean);
    assert_eq!(config.axes, plotscan::config::AxisConfig::default());

    let file = tempfile::Builder::new().suffix(".json").tempfile()?;
    std::fs::write(file.path(), serde_json::to_string(&config)?)?;
    assert_eq!(DigitizerConfig::from_json_file(file.path())?, config);
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() {
    assert!(matches!(
        DigitizerConfig::from_json_str(r#"{ "trace": { "min_points": 1 } }"#),
        Err(DigitizeError::Config(_))
    ));
    assert!(matches!(
        DigitizerConfig::from_json_str("{ not json"),
        Err(DigitizeError::Config(_))
    ));
}

#[test]
fn test_debug_output_is_written_per_stage() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("debug");
    digitizer().with_debug(debug_dir.clone())?.run(identity_plot())?;

    for file in [
        "00_input/frame.png",
        "01_axis_detection/axes.png",
        "02_label_crops/x_01.png",
        "02_label_crops/y_04.png",
        "03_segmentation/clusters.png",
        "04_tracing/paths.png",
    ] {
        assert!(debug_dir.join(file).exists(), "missing {}", file);
    }
    Ok(())
}

#[test]
fn test_debug_dir_must_be_empty() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("leftover.txt"), "x")?;
    let result = digitizer().with_debug(dir.path().to_path_buf());
    assert!(matches!(result, Err(DigitizeError::Config(_))));
    Ok(())
}

#[test]
fn test_decoder_reads_encoded_images() -> anyhow::Result<()> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(plot_canvas()).write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;

    let frame = ImageCrateDecoder.load(FrameInput::Bytes(bytes))?;
    assert_eq!(frame.dimensions(), (WIDTH, HEIGHT));
    assert_eq!(frame.color_at(Y_AXIS_COL, X_AXIS_ROW), Color::new(0, 0, 0));

    assert!(matches!(
        ImageCrateDecoder.load(FrameInput::Bytes(Vec::new())),
        Err(DigitizeError::Decode(_))
    ));
    assert!(matches!(
        ImageCrateDecoder.load(FrameInput::Bytes(b"not an image".to_vec())),
        Err(DigitizeError::Decode(_))
    ));
    Ok(())
}

#[test]
fn test_transparent_pixels_become_white() {
    let rgba = image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 0]));
    let frame = ImageFrame::from_dynamic(image::DynamicImage::ImageRgba8(rgba));
    assert_eq!(frame.color_at(1, 1), Color::new(255, 255, 255));
}
