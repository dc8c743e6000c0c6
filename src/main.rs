use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plotscan::detection::build_standard_digitizer;
use plotscan::{
    AxisKind, Digitization, Digitizer, DigitizerConfig, FrameDecoder, FrameInput, ImageCrateDecoder,
    IndependentAxis,
};

/// Closing radius used by `--preprocess` unless the config sets one
const PREPROCESS_CLOSE_RADIUS: u8 = 2;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Independent {
    Horizontal,
    Vertical,
}

#[derive(Parser)]
#[command(name = "plotscan")]
#[command(about = "Recover numeric data series from raster images of 2-D plots")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Write results to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// JSON file with pipeline parameters
    #[arg(long, value_name = "FILE.json")]
    config: Option<PathBuf>,

    /// Known x tick, skips OCR for the x axis (repeatable)
    #[arg(long = "x-tick", value_name = "PIXEL=VALUE", value_parser = parse_tick_pair)]
    x_ticks: Vec<(f64, f64)>,

    /// Known y tick, skips OCR for the y axis (repeatable)
    #[arg(long = "y-tick", value_name = "PIXEL=VALUE", value_parser = parse_tick_pair)]
    y_ticks: Vec<(f64, f64)>,

    /// Axis the curves are functions of
    #[arg(long, value_enum)]
    independent: Option<Independent>,

    /// Close small gaps in broken or low-resolution strokes before grouping
    #[arg(long)]
    preprocess: bool,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "N")]
    deadline_secs: Option<u64>,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_tick_pair(raw: &str) -> Result<(f64, f64), String> {
    let (pixel, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PIXEL=VALUE, got '{}'", raw))?;
    let pixel = pixel.trim().parse::<f64>().map_err(|e| format!("bad pixel '{}': {}", pixel, e))?;
    let value = value.trim().parse::<f64>().map_err(|e| format!("bad value '{}': {}", value, e))?;
    Ok((pixel, value))
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut config = match &args.config {
        Some(path) => DigitizerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DigitizerConfig::default(),
    };
    if let Some(independent) = args.independent {
        config.trace.independent = match independent {
            Independent::Horizontal => IndependentAxis::Horizontal,
            Independent::Vertical => IndependentAxis::Vertical,
        };
    }

    if args.preprocess && config.segmentation.close_gaps == 0 {
        config.segmentation.close_gaps = PREPROCESS_CLOSE_RADIUS;
    }

    info!("Loading image: {}", args.image_path.display());
    let frame = ImageCrateDecoder.load(FrameInput::Path(args.image_path.clone()))?;

    // OCR models are only needed when an axis has no manual ticks
    let mut digitizer = if args.x_ticks.is_empty() || args.y_ticks.is_empty() {
        build_standard_digitizer(config)?
    } else {
        Digitizer::new(config)
    };
    if !args.x_ticks.is_empty() {
        digitizer = digitizer.with_manual_ticks(AxisKind::X, args.x_ticks.clone());
    }
    if !args.y_ticks.is_empty() {
        digitizer = digitizer.with_manual_ticks(AxisKind::Y, args.y_ticks.clone());
    }
    if let Some(secs) = args.deadline_secs {
        digitizer = digitizer.with_deadline(Duration::from_secs(secs));
    }
    if let Some(debug_dir) = args.debug_out.clone() {
        digitizer = digitizer.with_debug(debug_dir)?;
    }

    let result = digitizer.run(frame)?;
    for failure in &result.failures {
        warn!(
            "Curve {} ({}, {} px) skipped: {}",
            failure.curve_id,
            failure.color.hex(),
            failure.pixel_count,
            failure.reason
        );
    }

    let rendered = match args.format {
        OutputFormat::Text => render_text(&result)?,
        OutputFormat::Json => serde_json::to_string_pretty(&result)?,
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} series to {}", result.series.len(), path.display());
        }
        None => print!("{}", rendered),
    }

    if result.series.is_empty() {
        return Err(anyhow!("No curve could be digitized"));
    }
    Ok(())
}

fn render_text(result: &Digitization) -> anyhow::Result<String> {
    let mut out = String::new();
    for series in &result.series {
        writeln!(
            out,
            "# curve {} color {} confidence {:.3} points {}",
            series.curve_id,
            series.color.hex(),
            series.confidence,
            series.points.len()
        )?;
        for point in &series.points {
            writeln!(out, "{} {}", point.x, point.y)?;
        }
        writeln!(out)?;
    }
    Ok(out)
}
