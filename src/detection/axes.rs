use image::GrayImage;
use tracing::{debug, info};

use crate::config::AxisConfig;
use crate::detection::preprocessing::{axis_mask, leading_run, longest_run};
use crate::error::{DigitizeError, Result};
use crate::frame::ImageFrame;
use crate::models::{AxisFrame, AxisKind, AxisLine, AxisScale, PixelBox};
use crate::pipeline::{PipelineContext, Stage};

/// Locates the plot's axis lines, bounding box and tick marks
#[derive(Debug, Clone, Default)]
pub struct AxisDetector {
    pub config: AxisConfig,
}

/// A long straight run of axis pixels, possibly several pixels thick
#[derive(Debug, Clone, Copy, PartialEq)]
struct LineCandidate {
    band: (u32, u32),
    extent: (u32, u32),
}

impl AxisDetector {
    pub fn new(config: AxisConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, frame: &ImageFrame) -> Result<AxisFrame> {
        let cfg = &self.config;
        let mask = axis_mask(frame, cfg);
        let (width, height) = mask.dimensions();
        let hit = |x: u32, y: u32| mask.get_pixel(x, y)[0] > 0;

        let row_runs: Vec<Option<(u32, u32)>> = (0..height)
            .map(|y| longest_run((0..width).map(|x| hit(x, y)), cfg.max_run_gap))
            .collect();
        let col_runs: Vec<Option<(u32, u32)>> = (0..width)
            .map(|x| longest_run((0..height).map(|y| hit(x, y)), cfg.max_run_gap))
            .collect();

        let min_h = min_run_len(cfg.min_axis_fraction, width);
        let min_v = min_run_len(cfg.min_axis_fraction, height);

        // The x axis hugs the bottom margin, the y axis the left one
        let horizontal = pick_line(&row_runs, min_h, true)
            .ok_or_else(|| DigitizeError::AxisNotFound("no horizontal axis line".to_string()))?;
        let vertical = pick_line(&col_runs, min_v, false)
            .ok_or_else(|| DigitizeError::AxisNotFound("no vertical axis line".to_string()))?;

        debug!(?horizontal, ?vertical, "axis line candidates");

        let slack = cfg.max_tick_len;
        let meets = |band: (u32, u32), extent: (u32, u32)| {
            band.1 + slack >= extent.0 && band.0 <= extent.1 + slack
        };
        if !meets(vertical.band, horizontal.extent) || !meets(horizontal.band, vertical.extent) {
            return Err(DigitizeError::AxisNotFound(
                "axis lines do not meet at a corner".to_string(),
            ));
        }

        // Top and right spines of a closed frame bound the plot box too
        let top = pick_line(&row_runs, min_h, false).filter(|line| {
            line.band.1 < horizontal.band.0
                && line.band.0 <= vertical.extent.0 + slack
                && meets(vertical.band, line.extent)
        });
        let right = pick_line(&col_runs, min_v, true).filter(|line| {
            line.band.0 > vertical.band.1
                && line.band.1 + slack >= horizontal.extent.1
                && meets(horizontal.band, line.extent)
        });
        if top.is_some() || right.is_some() {
            debug!(?top, ?right, "frame spines");
        }

        let plot_box = PixelBox {
            left: vertical.band.1 + 1,
            top: top.map_or(vertical.extent.0, |line| line.band.1 + 1),
            right: right.map_or(horizontal.extent.1, |line| line.band.0.saturating_sub(1)),
            bottom: horizontal.band.0.saturating_sub(1),
        };
        if plot_box.left >= plot_box.right || plot_box.top >= plot_box.bottom {
            return Err(DigitizeError::AxisNotFound(format!(
                "degenerate plot box {:?}",
                plot_box
            )));
        }

        let x_ticks = self.x_ticks(&mask, horizontal);
        let y_ticks = self.y_ticks(&mask, vertical);

        for (kind, ticks) in [(AxisKind::X, &x_ticks), (AxisKind::Y, &y_ticks)] {
            if ticks.len() < 2 {
                return Err(DigitizeError::AxisNotFound(format!(
                    "only {} tick(s) on the {} axis",
                    ticks.len(),
                    kind
                )));
            }
        }

        let x_axis = AxisLine {
            kind: AxisKind::X,
            band: horizontal.band,
            extent: horizontal.extent,
            scale: self.scale_hint(&x_ticks),
            ticks: x_ticks,
        };
        let y_axis = AxisLine {
            kind: AxisKind::Y,
            band: vertical.band,
            extent: vertical.extent,
            scale: self.scale_hint(&y_ticks),
            ticks: y_ticks,
        };

        info!(
            "Plot box {}x{} at ({}, {}), {} x ticks, {} y ticks",
            plot_box.width(),
            plot_box.height(),
            plot_box.left,
            plot_box.top,
            x_axis.ticks.len(),
            y_axis.ticks.len()
        );

        Ok(AxisFrame { plot_box, x_axis, y_axis })
    }

    /// Columns along the x axis with a short vertical stub above or below the band
    fn x_ticks(&self, mask: &GrayImage, line: LineCandidate) -> Vec<f64> {
        let height = mask.height();
        let hit = |x: u32, y: u32| mask.get_pixel(x, y)[0] > 0;

        let candidates: Vec<u32> = (line.extent.0..=line.extent.1)
            .filter(|&x| {
                let below = leading_run((line.band.1 + 1..height).map(|y| hit(x, y)), self.config.max_tick_len);
                let above = leading_run((0..line.band.0).rev().map(|y| hit(x, y)), self.config.max_tick_len);
                self.is_tick_len(below) || self.is_tick_len(above)
            })
            .collect();

        merge_candidates(&candidates, self.config.min_tick_spacing)
    }

    /// Rows along the y axis with a short horizontal stub left or right of the band
    fn y_ticks(&self, mask: &GrayImage, line: LineCandidate) -> Vec<f64> {
        let width = mask.width();
        let hit = |x: u32, y: u32| mask.get_pixel(x, y)[0] > 0;

        let candidates: Vec<u32> = (line.extent.0..=line.extent.1)
            .filter(|&y| {
                let left = leading_run((0..line.band.0).rev().map(|x| hit(x, y)), self.config.max_tick_len);
                let right = leading_run((line.band.1 + 1..width).map(|x| hit(x, y)), self.config.max_tick_len);
                self.is_tick_len(left) || self.is_tick_len(right)
            })
            .collect();

        merge_candidates(&candidates, self.config.min_tick_spacing)
    }

    fn is_tick_len(&self, len: u32) -> bool {
        len >= self.config.min_tick_len && len <= self.config.max_tick_len
    }

    /// Flag an axis as log when its tick gaps follow a log progression.
    ///
    /// Spacing must be clearly non-uniform, and the gaps must shrink across
    /// each decade before jumping back up at the next one.
    fn scale_hint(&self, ticks: &[f64]) -> AxisScale {
        if ticks.len() < 4 {
            return AxisScale::Linear;
        }
        let gaps: Vec<f64> = ticks.windows(2).map(|w| w[1] - w[0]).collect();
        let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
        if mean <= 0.0 {
            return AxisScale::Linear;
        }
        let var = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
        let cv = var.sqrt() / mean;
        if cv <= self.config.log_spacing_cv {
            return AxisScale::Linear;
        }

        // Values grow toward the top of a y axis, so its decades run backwards
        let reversed: Vec<f64> = gaps.iter().rev().copied().collect();
        if log_progression(&gaps) || log_progression(&reversed) {
            debug!(cv, "tick gaps shrink per decade, hinting log scale");
            AxisScale::Log
        } else {
            debug!(cv, "non-uniform tick spacing without a log progression");
            AxisScale::Linear
        }
    }
}

impl Stage for AxisDetector {
    type Input = ImageFrame;
    type Output = AxisFrame;

    fn process(&self, frame: ImageFrame, _context: &PipelineContext) -> Result<AxisFrame> {
        self.detect(&frame)
    }

    fn name(&self) -> &str {
        "Axis Detection"
    }
}

fn min_run_len(fraction: f64, size: u32) -> u32 {
    ((fraction * size as f64).ceil() as u32).max(2)
}

fn run_len(run: Option<(u32, u32)>) -> u32 {
    run.map(|(s, e)| e - s + 1).unwrap_or(0)
}

/// Pick the outermost line among rows/columns whose run is close to the longest one.
///
/// `prefer_last` selects the bottom-most row (or right-most column) instead of the first.
fn pick_line(runs: &[Option<(u32, u32)>], min_len: u32, prefer_last: bool) -> Option<LineCandidate> {
    let longest = runs.iter().map(|r| run_len(*r)).max()?;
    if longest < min_len {
        return None;
    }
    let threshold = min_len.max((longest as f64 * 0.9).ceil() as u32);
    let qualifies = |i: usize| run_len(runs[i]) >= threshold;

    let chosen = if prefer_last {
        (0..runs.len()).rev().find(|&i| qualifies(i))?
    } else {
        (0..runs.len()).find(|&i| qualifies(i))?
    };

    // Grow over adjacent rows/columns that belong to the same thick line
    let mut start = chosen;
    while start > 0 && run_len(runs[start - 1]) >= min_len {
        start -= 1;
    }
    let mut end = chosen;
    while end + 1 < runs.len() && run_len(runs[end + 1]) >= min_len {
        end += 1;
    }

    let mut extent = runs[chosen]?;
    for run in runs[start..=end].iter().flatten() {
        extent.0 = extent.0.min(run.0);
        extent.1 = extent.1.max(run.1);
    }

    Some(LineCandidate { band: (start as u32, end as u32), extent })
}

/// Gaps shrink step by step within a decade and only grow by a clear jump into the next.
///
/// At least two consecutive shrinking steps are required.
fn log_progression(gaps: &[f64]) -> bool {
    const SHRINK: f64 = 0.95;
    const JUMP: f64 = 1.5;

    let mut run = 0usize;
    let mut longest = 0usize;
    for w in gaps.windows(2) {
        if w[1] < w[0] * SHRINK {
            run += 1;
            longest = longest.max(run);
        } else if w[1] >= w[0] * JUMP {
            run = 0;
        } else {
            return false;
        }
    }
    longest >= 2
}

/// Collapse neighbouring candidate positions into one tick at their mean
fn merge_candidates(candidates: &[u32], min_spacing: f64) -> Vec<f64> {
    let mut ticks = Vec::new();
    let mut group: Vec<u32> = Vec::new();

    for &pos in candidates {
        if let Some(&last) = group.last() {
            if (pos - last) as f64 > min_spacing {
                ticks.push(mean(&group));
                group.clear();
            }
        }
        group.push(pos);
    }
    if !group.is_empty() {
        ticks.push(mean(&group));
    }
    ticks
}

fn mean(values: &[u32]) -> f64 {
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_antialiased_tick_columns() {
        assert_eq!(merge_candidates(&[10, 11, 12, 40, 70, 71], 3.0), vec![11.0, 40.0, 70.5]);
        assert!(merge_candidates(&[], 3.0).is_empty());
    }

    #[test]
    fn picks_bottom_most_long_row_and_its_thickness() {
        let runs = vec![
            Some((0, 99)), // top frame line
            None,
            Some((10, 12)),
            Some((0, 97)),
            Some((1, 99)),
            None,
        ];
        let line = pick_line(&runs, 30, true).unwrap();
        assert_eq!(line.band, (3, 4));
        assert_eq!(line.extent, (0, 99));

        let first = pick_line(&runs, 30, false).unwrap();
        assert_eq!(first.band, (0, 0));
    }

    #[test]
    fn uniform_spacing_is_linear() {
        let detector = AxisDetector::default();
        assert_eq!(detector.scale_hint(&[0.0, 50.0, 100.0, 150.0]), AxisScale::Linear);
        // one decade of a log axis: 1..5 at log10 spacing
        let log_ticks: Vec<f64> = [1.0f64, 2.0, 3.0, 4.0, 5.0, 10.0]
            .iter()
            .map(|v| 300.0 * v.log10())
            .collect();
        assert_eq!(detector.scale_hint(&log_ticks), AxisScale::Log);
    }

    #[test]
    fn stray_tick_on_linear_axis_stays_linear() {
        let detector = AxisDetector::default();
        assert_eq!(detector.scale_hint(&[0.0, 25.0, 50.0, 100.0, 150.0, 200.0]), AxisScale::Linear);
        assert_eq!(detector.scale_hint(&[0.0, 50.0, 70.0, 100.0, 150.0]), AxisScale::Linear);
    }

    #[test]
    fn log_decades_repeat_in_either_direction() {
        let detector = AxisDetector::default();
        // two decades 1..100 with minor ticks, values increasing with the pixel position
        let ticks: Vec<f64> = (1..=9)
            .map(|m| m as f64)
            .chain((1..=9).map(|m| 10.0 * m as f64))
            .chain([100.0])
            .map(|v| 100.0 * v.log10())
            .collect();
        assert_eq!(detector.scale_hint(&ticks), AxisScale::Log);

        // the same axis drawn vertically, rows counted from the top
        let mut rows: Vec<f64> = ticks.iter().map(|t| 250.0 - t).collect();
        rows.reverse();
        assert_eq!(detector.scale_hint(&rows), AxisScale::Log);
    }
}
