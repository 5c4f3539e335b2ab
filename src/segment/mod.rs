pub mod heuristic_merge;

use std::fmt::Debug;

use anyhow::Result;

use crate::error::ConfigError;
use crate::features::MathExpressionFeatureExtractor;
use crate::grid::BlobDataGrid;

pub use heuristic_merge::HeuristicMerge;

/// Groups math-labelled blobs into expression segments stored on the grid.
pub trait MathExpressionSegmentor: Debug {
    fn name(&self) -> &str;

    fn run_segmentation(&mut self, grid: &mut BlobDataGrid) -> Result<()>;
}

pub fn create_segmentor(
    name: &str,
    extractor: &MathExpressionFeatureExtractor,
) -> Result<Box<dyn MathExpressionSegmentor>> {
    match name {
        heuristic_merge::NAME => Ok(Box::new(HeuristicMerge::new(extractor)?)),
        other => Err(ConfigError::UnknownSegmentor(other.to_string()).into()),
    }
}
