//! Draws a two-curve plot, digitizes it with manual ticks and prints the series.
//!
//! Run with `cargo run --example synthetic_plot [OUTPUT.png]`.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use plotscan::{AxisKind, Digitizer, DigitizerConfig, ImageFrame};

const AXIS_ROW: u32 = 260;
const AXIS_COL: u32 = 40;

fn to_pixel(x: f64, y: f64) -> (f32, f32) {
    ((AXIS_COL as f64 + 80.0 * x) as f32, (AXIS_ROW as f64 - 60.0 * y) as f32)
}

fn draw_curve(img: &mut RgbImage, color: Rgb<u8>, f: impl Fn(f64) -> f64) {
    let points: Vec<(f32, f32)> = (5..=195).map(|i| i as f64 / 50.0).map(|x| to_pixel(x, f(x))).collect();
    for pair in points.windows(2) {
        draw_line_segment_mut(img, pair[0], pair[1], color);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let black = Rgb([0u8, 0, 0]);
    let mut img = RgbImage::from_pixel(420, 300, Rgb([255, 255, 255]));
    draw_line_segment_mut(&mut img, (AXIS_COL as f32, AXIS_ROW as f32), (380.0, AXIS_ROW as f32), black);
    draw_line_segment_mut(&mut img, (AXIS_COL as f32, 10.0), (AXIS_COL as f32, AXIS_ROW as f32), black);
    for i in 0..5 {
        let x = (AXIS_COL + 80 * i) as f32;
        draw_line_segment_mut(&mut img, (x, AXIS_ROW as f32 + 1.0), (x, AXIS_ROW as f32 + 6.0), black);
        let y = (AXIS_ROW - 60 * i) as f32;
        draw_line_segment_mut(&mut img, (AXIS_COL as f32 - 6.0, y), (AXIS_COL as f32 - 1.0, y), black);
    }

    draw_curve(&mut img, Rgb([220, 30, 30]), |x| x * x / 4.0);
    draw_curve(&mut img, Rgb([30, 60, 220]), |x| 2.0 + (x * 1.5).sin());

    if let Some(path) = std::env::args().nth(1) {
        img.save(&path)?;
        println!("Saved plot to {}", path);
    }

    let x_ticks = (0..5).map(|i| ((AXIS_COL + 80 * i) as f64, i as f64)).collect();
    let y_ticks = (0..5).map(|i| ((AXIS_ROW - 60 * i) as f64, i as f64)).collect();
    let result = Digitizer::new(DigitizerConfig::default())
        .with_manual_ticks(AxisKind::X, x_ticks)
        .with_manual_ticks(AxisKind::Y, y_ticks)
        .run(ImageFrame::new(img))?;

    for series in &result.series {
        println!(
            "curve {} ({}): {} points, confidence {:.2}",
            series.curve_id,
            series.color.hex(),
            series.points.len(),
            series.confidence
        );
        for point in series.points.iter().step_by(20) {
            println!("  x = {:6.3}  y = {:6.3}", point.x, point.y);
        }
    }
    for failure in &result.failures {
        println!("curve {} skipped: {}", failure.curve_id, failure.reason);
    }
    Ok(())
}
