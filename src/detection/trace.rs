use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{TraceConfig, TraceEstimator};
use crate::error::Result;
use crate::models::{
    ClusterDiagnostic, Color, CurveCluster, FailureReason, IndependentAxis, PixelBox, PixelPoint,
};
use crate::pipeline::{PipelineContext, Stage};

/// Cluster pixels sharing one independent-axis coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct TraceStep {
    pub position: u32,
    /// Dependent-axis coordinates, in pixel scan order
    pub values: Vec<u32>,
}

/// Ordered pixel path of one curve.
///
/// Representative values are computed on iteration; iterate as often as needed.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedPath {
    pub curve_id: usize,
    pub color: Color,
    pub independent: IndependentAxis,
    pub estimator: TraceEstimator,
    steps: Vec<TraceStep>,
}

impl TracedPath {
    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> TraceIter<'_> {
        TraceIter { path: self, next: 0 }
    }

    fn point(&self, step: &TraceStep) -> PixelPoint {
        let value = match self.estimator {
            TraceEstimator::Median => median(&step.values),
            TraceEstimator::Mean => {
                step.values.iter().map(|&v| v as f64).sum::<f64>() / step.values.len() as f64
            }
        };
        let position = step.position as f64;
        match self.independent {
            IndependentAxis::Horizontal => PixelPoint { x: position, y: value },
            IndependentAxis::Vertical => PixelPoint { x: value, y: position },
        }
    }
}

/// Lazy iterator over a [`TracedPath`]'s pixel points
pub struct TraceIter<'a> {
    path: &'a TracedPath,
    next: usize,
}

impl Iterator for TraceIter<'_> {
    type Item = PixelPoint;

    fn next(&mut self) -> Option<PixelPoint> {
        let step = self.path.steps.get(self.next)?;
        self.next += 1;
        Some(self.path.point(step))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.path.steps.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for TraceIter<'_> {}

impl<'a> IntoIterator for &'a TracedPath {
    type Item = PixelPoint;
    type IntoIter = TraceIter<'a>;

    fn into_iter(self) -> TraceIter<'a> {
        self.iter()
    }
}

/// Orders a cluster into a path, one point per independent-axis step
#[derive(Debug, Clone, Default)]
pub struct CurveTracer {
    pub config: TraceConfig,
}

impl CurveTracer {
    pub fn new(config: TraceConfig) -> Self {
        Self { config }
    }

    /// Trace a cluster inside `plot_box`; failures are per-curve diagnostics
    pub fn trace(
        &self,
        cluster: &CurveCluster,
        plot_box: PixelBox,
    ) -> std::result::Result<TracedPath, ClusterDiagnostic> {
        let cfg = &self.config;
        let mut buckets: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for &(x, y) in cluster.pixels.iter().filter(|&&(x, y)| plot_box.contains(x, y)) {
            let (position, value) = match cfg.independent {
                IndependentAxis::Horizontal => (x, y),
                IndependentAxis::Vertical => (y, x),
            };
            buckets.entry(position).or_default().push(value);
        }

        let steps: Vec<TraceStep> = buckets
            .into_iter()
            .map(|(position, values)| TraceStep { position, values })
            .collect();

        let fail = |reason: FailureReason| ClusterDiagnostic {
            curve_id: cluster.id,
            color: cluster.color,
            pixel_count: cluster.pixel_count(),
            reason,
        };

        if steps.len() < cfg.min_points {
            return Err(fail(FailureReason::TooFewPoints {
                points: steps.len(),
                required: cfg.min_points,
            }));
        }

        let multi = steps.iter().filter(|s| run_count(&s.values, cfg.run_gap) > 1).count();
        let fraction = multi as f64 / steps.len() as f64;
        if fraction > cfg.max_multivalued_fraction {
            return Err(fail(FailureReason::MultiValued { fraction }));
        }

        debug!(
            curve = cluster.id,
            steps = steps.len(),
            multivalued = fraction,
            "traced curve"
        );
        Ok(TracedPath {
            curve_id: cluster.id,
            color: cluster.color,
            independent: cfg.independent,
            estimator: cfg.estimator,
            steps,
        })
    }
}

impl Stage for CurveTracer {
    type Input = (CurveCluster, PixelBox);
    type Output = std::result::Result<TracedPath, ClusterDiagnostic>;

    fn process(&self, (cluster, plot_box): Self::Input, _context: &PipelineContext) -> Result<Self::Output> {
        Ok(self.trace(&cluster, plot_box))
    }

    fn name(&self) -> &str {
        "Curve Tracing"
    }
}

fn median(values: &[u32]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    }
}

/// Number of runs separated by more than `gap` pixels
fn run_count(values: &[u32], gap: u32) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    1 + sorted.windows(2).filter(|w| w[1] - w[0] > gap).count()
}
