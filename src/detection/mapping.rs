use crate::detection::trace::TracedPath;
use crate::error::Result;
use crate::models::{AxisCalibration, DataPoint, DataSeries};
use crate::pipeline::{PipelineContext, Stage};

/// Converts traced pixel paths to data units with a pair of axis calibrations
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    pub x: AxisCalibration,
    pub y: AxisCalibration,
}

impl CoordinateMapper {
    pub fn new(x: AxisCalibration, y: AxisCalibration) -> Self {
        Self { x, y }
    }

    /// Series confidence is the weaker of the two axes
    pub fn confidence(&self) -> f64 {
        self.x.confidence.min(self.y.confidence)
    }

    pub fn map(&self, path: &TracedPath) -> DataSeries {
        let points = path
            .iter()
            .map(|p| DataPoint {
                x: self.x.apply(p.x),
                y: self.y.apply(p.y),
            })
            .collect();

        DataSeries {
            curve_id: path.curve_id,
            color: path.color,
            points,
            confidence: self.confidence(),
        }
    }
}

impl Stage for CoordinateMapper {
    type Input = TracedPath;
    type Output = DataSeries;

    fn process(&self, path: TracedPath, _context: &PipelineContext) -> Result<DataSeries> {
        Ok(self.map(&path))
    }

    fn name(&self) -> &str {
        "Coordinate Mapping"
    }
}
