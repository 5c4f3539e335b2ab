pub mod linear;
pub mod threshold;

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::ConfigError;
use crate::grid::BlobDataGrid;
use crate::samples::BlobSample;

pub use linear::LinearDetector;
pub use threshold::ThresholdDetector;

/// Binary math/non-math classifier over blob feature vectors.
pub trait MathExpressionDetector: Debug {
    fn name(&self) -> &str;

    /// Checks the detector against the configured feature dimension and
    /// loads any trained model. Called once before the first page.
    fn initialize(&mut self, _dimension: usize) -> Result<()> {
        Ok(())
    }

    /// Sets `is_math` on every blob of the page from its feature vector.
    fn detect_math_expressions(&self, grid: &mut BlobDataGrid) -> Result<()>;

    /// On-disk model location, for file-backed detectors.
    fn detector_path(&self) -> Option<&Path> {
        None
    }

    fn do_training(&mut self, samples: &[BlobSample]) -> Result<()>;
}

pub fn create_detector(name: &str, model_path: PathBuf) -> Result<Box<dyn MathExpressionDetector>> {
    match name {
        threshold::NAME => Ok(Box::new(ThresholdDetector::new(model_path))),
        linear::NAME => Ok(Box::new(LinearDetector::new(model_path))),
        other => Err(ConfigError::UnknownDetector(other.to_string()).into()),
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
