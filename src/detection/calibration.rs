use image::{GrayImage, Luma};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AxisConfig, CalibrationConfig};
use crate::detection::contours::{find_blobs, union_box, InkBlob};
use crate::detection::ocr::{LabelRegion, TextRecognizer};
use crate::detection::preprocessing::{is_axis_color, prepare_for_ocr};
use crate::error::{DigitizeError, Result};
use crate::frame::ImageFrame;
use crate::models::{
    AxisCalibration, AxisFrame, AxisKind, AxisLine, AxisScale, AxisTransform, Color, PixelBox,
    TickLabel,
};
use crate::pipeline::{PipelineContext, Stage};

/// Residuals closer than this are treated as a tie between linear and log fits
const RESIDUAL_TIE: f64 = 1e-9;

/// Axis frame together with both fitted calibrations
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedAxes {
    pub axes: AxisFrame,
    pub x: AxisCalibration,
    pub y: AxisCalibration,
}

/// Reads tick labels and fits a pixel to data transform per axis
#[derive(Clone, Default)]
pub struct TickCalibrator {
    pub config: CalibrationConfig,
    /// Used to tell label ink from background
    pub ink: AxisConfig,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    manual_x: Option<Vec<(f64, f64)>>,
    manual_y: Option<Vec<(f64, f64)>>,
}

impl TickCalibrator {
    pub fn new(config: CalibrationConfig, ink: AxisConfig) -> Self {
        Self {
            config,
            ink,
            recognizer: None,
            manual_x: None,
            manual_y: None,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Use known (pixel, value) pairs for an axis instead of reading its labels
    pub fn with_manual_ticks(mut self, axis: AxisKind, pairs: Vec<(f64, f64)>) -> Self {
        match axis {
            AxisKind::X => self.manual_x = Some(pairs),
            AxisKind::Y => self.manual_y = Some(pairs),
        }
        self
    }

    pub fn calibrate(
        &self,
        frame: &ImageFrame,
        axes: &AxisFrame,
        context: &PipelineContext,
    ) -> Result<(AxisCalibration, AxisCalibration)> {
        let x = self.calibrate_axis(frame, &axes.x_axis, context)?;
        let y = self.calibrate_axis(frame, &axes.y_axis, context)?;
        Ok((x, y))
    }

    fn calibrate_axis(
        &self,
        frame: &ImageFrame,
        line: &AxisLine,
        context: &PipelineContext,
    ) -> Result<AxisCalibration> {
        let manual = match line.kind {
            AxisKind::X => self.manual_x.as_ref(),
            AxisKind::Y => self.manual_y.as_ref(),
        };

        let labels = match manual {
            Some(pairs) => {
                debug!(axis = %line.kind, count = pairs.len(), "using manual ticks");
                pairs
                    .iter()
                    .map(|&(pixel, value)| TickLabel {
                        pixel,
                        value,
                        confidence: 1.0,
                        text: value.to_string(),
                    })
                    .collect()
            }
            None => self.read_labels(frame, line, context)?,
        };

        let calibration = fit_axis(line.kind, labels, line.scale, &self.config)?;
        info!(
            "{} axis: {:?} fit, confidence {:.2}, max residual {:.3e}",
            line.kind,
            calibration.transform.scale(),
            calibration.confidence,
            calibration.max_residual
        );
        Ok(calibration)
    }

    /// Crop, OCR and parse every tick label of an axis; unreadable labels are dropped
    pub fn read_labels(
        &self,
        frame: &ImageFrame,
        line: &AxisLine,
        context: &PipelineContext,
    ) -> Result<Vec<TickLabel>> {
        let Some(recognizer) = self.recognizer.as_ref() else {
            warn!("No OCR engine configured for the {} axis", line.kind);
            return Ok(Vec::new());
        };

        let regions = self.label_regions(frame, line);
        for (idx, region) in regions.iter().enumerate() {
            context.save_debug_image(
                "02_label_crops",
                &format!("{}_{:02}.png", line.kind, idx + 1),
                &region.image,
            )?;
        }

        let labels: Vec<Option<TickLabel>> = regions
            .par_iter()
            .map(|region| {
                if context.deadline_passed() {
                    return None;
                }
                self.read_label(recognizer.as_ref(), region)
            })
            .collect();
        context.check_deadline("tick label OCR")?;

        let labels: Vec<TickLabel> = labels.into_iter().flatten().collect();
        debug!(axis = %line.kind, read = labels.len(), ticks = line.ticks.len(), "tick labels");
        Ok(labels)
    }

    fn read_label(&self, recognizer: &dyn TextRecognizer, region: &LabelRegion) -> Option<TickLabel> {
        let recognition = recognizer.recognize(region)?;
        if recognition.confidence < self.config.min_ocr_confidence {
            debug!(
                tick = region.tick,
                text = %recognition.text,
                confidence = recognition.confidence,
                "label below confidence threshold"
            );
            return None;
        }
        let Some(value) = parse_tick_value(&recognition.text) else {
            debug!(tick = region.tick, text = %recognition.text, "label is not a number");
            return None;
        };
        Some(TickLabel {
            pixel: region.tick,
            value,
            confidence: recognition.confidence,
            text: recognition.text,
        })
    }

    /// One crop per tick, on the outer side of the axis where labels sit
    pub fn label_regions(&self, frame: &ImageFrame, line: &AxisLine) -> Vec<LabelRegion> {
        let (width, height) = frame.dimensions();
        let spacing = line.median_tick_spacing().unwrap_or(f64::INFINITY);
        let half = (self.config.label_half_span as f64).min((spacing / 2.0).floor()).max(1.0) as u32;
        let depth = self.config.label_depth;

        let mut regions = Vec::new();
        for &tick in &line.ticks {
            let center = tick.round().max(0.0) as u32;
            let bbox = match line.kind {
                AxisKind::X => {
                    let top = line.band.1 + 1;
                    if top >= height {
                        continue;
                    }
                    PixelBox {
                        left: center.saturating_sub(half),
                        top,
                        right: (center + half).min(width - 1),
                        bottom: (line.band.1 + depth).min(height - 1),
                    }
                }
                AxisKind::Y => {
                    if line.band.0 == 0 {
                        continue;
                    }
                    PixelBox {
                        left: line.band.0.saturating_sub(depth),
                        top: center.saturating_sub(half),
                        right: line.band.0 - 1,
                        bottom: (center + half).min(height - 1),
                    }
                }
            };

            let bbox = self.tighten_to_ink(frame, bbox, line.kind);
            let crop = frame.crop(bbox.left, bbox.top, bbox.width(), bbox.height());
            regions.push(LabelRegion {
                axis: line.kind,
                tick,
                bbox,
                image: prepare_for_ocr(&crop, self.config.ocr_target_size),
            });
        }
        regions
    }

    /// Shrink a label region to the text line nearest the axis, ignoring the tick stub
    fn tighten_to_ink(&self, frame: &ImageFrame, region: PixelBox, axis: AxisKind) -> PixelBox {
        let (w, h) = (region.width(), region.height());
        let mask = GrayImage::from_fn(w, h, |x, y| {
            let color: Color = frame.color_at(region.left + x, region.top + y);
            if is_axis_color(color, &self.ink) {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });

        let text: Vec<_> = find_blobs(&mask, 1)
            .into_iter()
            .filter(|blob| match axis {
                AxisKind::X => !(blob.bbox.top == 0 && blob.width() <= 3),
                AxisKind::Y => !(blob.bbox.right == w - 1 && blob.height() <= 3),
            })
            .collect();
        let text = nearest_ink_group(text, axis, w);

        let Some(ink) = union_box(&text) else {
            return region;
        };

        let pad = 2;
        PixelBox {
            left: region.left + ink.left.saturating_sub(pad),
            top: region.top + ink.top.saturating_sub(pad),
            right: region.left + (ink.right + pad).min(w - 1),
            bottom: region.top + (ink.bottom + pad).min(h - 1),
        }
    }
}

/// Blobs of the text line closest to the axis side of a label region.
///
/// Blobs are visited by distance from the axis; the line ends at the first
/// gap wider than half the nearest blob's extent across the axis, so axis
/// titles further out are left behind.
fn nearest_ink_group(mut blobs: Vec<InkBlob>, axis: AxisKind, width: u32) -> Vec<InkBlob> {
    // (near, far) offsets from the axis side
    let offsets = |blob: &InkBlob| match axis {
        AxisKind::X => (blob.bbox.top, blob.bbox.bottom),
        AxisKind::Y => (width - 1 - blob.bbox.right, width - 1 - blob.bbox.left),
    };
    blobs.sort_by_key(|blob| offsets(blob));

    let Some(first) = blobs.first() else {
        return blobs;
    };
    let (near, mut reach) = offsets(first);
    let max_gap = ((reach - near + 1) / 2).max(2);

    let mut kept = 0;
    for blob in &blobs {
        let (start, end) = offsets(blob);
        if start > reach + 1 + max_gap {
            break;
        }
        reach = reach.max(end);
        kept += 1;
    }
    blobs.truncate(kept);
    blobs
}

impl Stage for TickCalibrator {
    type Input = (ImageFrame, AxisFrame);
    type Output = CalibratedAxes;

    fn process(&self, (frame, axes): Self::Input, context: &PipelineContext) -> Result<CalibratedAxes> {
        let (x, y) = self.calibrate(&frame, &axes, context)?;
        Ok(CalibratedAxes { axes, x, y })
    }

    fn name(&self) -> &str {
        "Tick Calibration"
    }
}

/// Parse OCR text of a tick label as a number.
///
/// Accepts decimal and scientific notation, an optional sign (including the
/// unicode minus), thousands separators, a trailing percent sign and
/// `a×10^b` / `10⁻³` style powers of ten.
pub fn parse_tick_value(text: &str) -> Option<f64> {
    let mut s = String::with_capacity(text.len());
    let mut in_superscript = false;
    for c in text.chars() {
        if c.is_whitespace() || c == '\'' || c == '_' {
            continue;
        }
        if let Some(sup) = superscript_to_ascii(c) {
            if !in_superscript {
                s.push('^');
                in_superscript = true;
            }
            s.push(sup);
            continue;
        }
        in_superscript = false;
        s.push(match c {
            '\u{2212}' | '\u{2013}' | '\u{2014}' => '-',
            _ => c,
        });
    }

    let s = s.strip_suffix('%').unwrap_or(&s);
    if s.is_empty() {
        return None;
    }

    if let Some(idx) = s.find("10^") {
        let mantissa = s[..idx].trim_end_matches(['×', 'x', 'X', '*', '·', '.']);
        let exponent: f64 = s[idx + 3..].parse().ok()?;
        let mantissa = match mantissa {
            "" | "+" => 1.0,
            "-" => -1.0,
            m => parse_plain(m)?,
        };
        let power = if exponent.fract() == 0.0 {
            10f64.powi(exponent as i32)
        } else {
            10f64.powf(exponent)
        };
        let value = mantissa * power;
        return value.is_finite().then_some(value);
    }

    parse_plain(s)
}

fn superscript_to_ascii(c: char) -> Option<char> {
    Some(match c {
        '⁰' => '0',
        '¹' => '1',
        '²' => '2',
        '³' => '3',
        '⁴' => '4',
        '⁵' => '5',
        '⁶' => '6',
        '⁷' => '7',
        '⁸' => '8',
        '⁹' => '9',
        '⁻' => '-',
        '⁺' => '+',
        _ => return None,
    })
}

fn parse_plain(s: &str) -> Option<f64> {
    if !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | ',' | 'e' | 'E'))
    {
        return None;
    }

    let normalized = if s.contains(',') {
        normalize_commas(s)?
    } else {
        s.to_string()
    };

    let value: f64 = normalized.parse().ok()?;
    value.is_finite().then_some(value)
}

/// `1,000,000` and `12,345.5` are thousands separators; a lone `0,5` is a decimal comma
fn normalize_commas(s: &str) -> Option<String> {
    let unsigned = s.trim_start_matches(['+', '-']);
    let int_part = unsigned.split('.').next().unwrap_or("");
    let groups: Vec<&str> = int_part.split(',').collect();

    let thousands = groups.len() > 1
        && (1..=3).contains(&groups[0].len())
        && groups[1..].iter().all(|g| g.len() == 3)
        && groups.iter().all(|g| g.chars().all(|c| c.is_ascii_digit()));
    if thousands {
        return Some(s.replace(',', ""));
    }

    if s.matches(',').count() == 1 && !s.contains('.') {
        return Some(s.replace(',', "."));
    }
    None
}

/// Fit a transform to an axis's tick labels.
///
/// Linear when Δvalue/Δpixel is consistent, otherwise whichever of linear and
/// log fits the labels better; ties go to the detector's scale hint.
pub fn fit_axis(
    axis: AxisKind,
    mut labels: Vec<TickLabel>,
    hint: AxisScale,
    config: &CalibrationConfig,
) -> Result<AxisCalibration> {
    labels.retain(|l| l.pixel.is_finite() && l.value.is_finite());
    labels.sort_by(|a, b| a.pixel.total_cmp(&b.pixel).then(b.confidence.total_cmp(&a.confidence)));
    // Keep the most confident reading per tick position
    labels.dedup_by(|later, kept| (later.pixel - kept.pixel).abs() < 0.5);

    let mut distinct_values: Vec<f64> = labels.iter().map(|l| l.value).collect();
    distinct_values.sort_by(f64::total_cmp);
    distinct_values.dedup();
    if labels.len() < 2 || distinct_values.len() < 2 {
        return Err(DigitizeError::CalibrationInsufficient {
            axis,
            valid: labels.len(),
        });
    }

    let pixels: Vec<f64> = labels.iter().map(|l| l.pixel).collect();
    let values: Vec<f64> = labels.iter().map(|l| l.value).collect();

    let (lin_offset, lin_slope) = least_squares(&pixels, &values);
    let linear = AxisTransform::Linear { offset: lin_offset, slope: lin_slope };
    let linear_residual = relative_rms(&pixels, &values, |p| lin_offset + lin_slope * p);

    let log = if values.iter().all(|&v| v > 0.0) {
        let logs: Vec<f64> = values.iter().map(|v| v.log10()).collect();
        let (offset, slope) = least_squares(&pixels, &logs);
        let residual = relative_rms(&pixels, &logs, |p| offset + slope * p);
        Some((AxisTransform::Log { offset, slope }, residual))
    } else {
        None
    };

    let consistent = linear_ratios_consistent(&pixels, &values, config.linear_tolerance);
    let log_residual = log.map(|(_, r)| r).unwrap_or(f64::INFINITY);

    let preferred = match log {
        Some(_) if (linear_residual - log_residual).abs() <= RESIDUAL_TIE => hint,
        _ if consistent => AxisScale::Linear,
        Some(_) if log_residual < linear_residual => AxisScale::Log,
        _ => AxisScale::Linear,
    };

    let mut candidates = vec![(linear, linear_residual)];
    if let Some(log) = log {
        candidates.push(log);
    }
    if preferred == AxisScale::Log {
        candidates.reverse();
    }

    let Some((transform, residual)) = candidates
        .into_iter()
        .find(|(_, r)| *r <= config.max_relative_residual)
    else {
        return Err(DigitizeError::CalibrationAmbiguous {
            axis,
            linear_residual,
            log_residual,
        });
    };

    let max_residual = labels
        .iter()
        .map(|l| (transform.apply(l.pixel) - l.value).abs())
        .fold(0.0, f64::max);
    let mean_confidence =
        labels.iter().map(|l| l.confidence as f64).sum::<f64>() / labels.len() as f64;
    let fit_quality = (1.0 - residual / config.max_relative_residual).clamp(0.0, 1.0);

    Ok(AxisCalibration {
        axis,
        transform,
        confidence: (mean_confidence * fit_quality).clamp(0.0, 1.0),
        max_residual,
        relative_residual: residual,
        labels,
    })
}

/// Ordinary least squares `y = offset + slope * x`
fn least_squares(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    if sxx == 0.0 {
        return (mean_y, 0.0);
    }
    let slope = sxy / sxx;
    (mean_y - slope * mean_x, slope)
}

/// RMS residual divided by the range of the targets
fn relative_rms(xs: &[f64], ys: &[f64], model: impl Fn(f64) -> f64) -> f64 {
    let (min, max) = ys
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &y| (lo.min(y), hi.max(y)));
    let range = max - min;
    if range <= 0.0 {
        return f64::INFINITY;
    }
    let mse = xs.iter().zip(ys).map(|(&x, &y)| (model(x) - y).powi(2)).sum::<f64>() / xs.len() as f64;
    mse.sqrt() / range
}

/// Whether every consecutive Δvalue/Δpixel is within `tolerance` of their median
fn linear_ratios_consistent(pixels: &[f64], values: &[f64], tolerance: f64) -> bool {
    let mut ratios: Vec<f64> = pixels
        .windows(2)
        .zip(values.windows(2))
        .filter(|(p, _)| p[1] - p[0] > 0.0)
        .map(|(p, v)| (v[1] - v[0]) / (p[1] - p[0]))
        .collect();
    if ratios.is_empty() {
        return false;
    }
    let original = ratios.clone();
    ratios.sort_by(f64::total_cmp);
    let median = ratios[ratios.len() / 2];
    if median == 0.0 {
        return false;
    }
    original.iter().all(|r| (r - median).abs() <= tolerance * median.abs())
}
