use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::detect::MathExpressionDetector;
use crate::error::ConfigError;
use crate::grid::BlobDataGrid;
use crate::samples::BlobSample;

pub const NAME: &str = "linear";

const EPOCHS: usize = 100;
const LEARNING_RATE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl LinearModel {
    pub fn score(&self, features: &[f64]) -> f64 {
        self.bias
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    /// Reads the single `bias w1 ... wn` line of a weights file.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|_| ConfigError::MissingResource(path.to_path_buf()))?;
        let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        let Some((idx, line)) = lines.next() else {
            return Err(ConfigError::MalformedResource {
                path: path.to_path_buf(),
                line: 1,
                reason: "weights file is empty".to_string(),
            }
            .into());
        };
        if let Some((extra, _)) = lines.next() {
            return Err(ConfigError::MalformedResource {
                path: path.to_path_buf(),
                line: extra + 1,
                reason: "weights file must hold a single line".to_string(),
            }
            .into());
        }
        let values = line
            .split_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::MalformedResource {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: e.to_string(),
            })?;
        let Some((bias, weights)) = values.split_first() else {
            bail!("{}: no weights", path.display());
        };
        Ok(Self {
            bias: *bias,
            weights: weights.to_vec(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = std::iter::once(self.bias)
            .chain(self.weights.iter().copied())
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        fs::write(path, format!("{line}\n"))
            .with_context(|| format!("failed to write weights to {}", path.display()))?;
        Ok(())
    }
}

/// File-backed linear classifier: math when `bias + w·x > 0`.
#[derive(Debug, Clone)]
pub struct LinearDetector {
    path: PathBuf,
    model: Option<LinearModel>,
}

impl LinearDetector {
    pub fn new(path: PathBuf) -> Self {
        Self { path, model: None }
    }

    pub fn with_model(mut self, model: LinearModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn model(&self) -> Option<&LinearModel> {
        self.model.as_ref()
    }
}

impl MathExpressionDetector for LinearDetector {
    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self, dimension: usize) -> Result<()> {
        if self.model.is_none() {
            self.model = Some(LinearModel::read(&self.path)?);
        }
        if let Some(model) = &self.model {
            if model.weights.len() != dimension {
                return Err(ConfigError::FeatureDimension {
                    expected: model.weights.len(),
                    found: dimension,
                }
                .into());
            }
        }
        Ok(())
    }

    fn detect_math_expressions(&self, grid: &mut BlobDataGrid) -> Result<()> {
        let Some(model) = &self.model else {
            bail!("linear detector has no model loaded from {}", self.path.display());
        };
        let ids: Vec<_> = grid.ids().collect();
        for id in ids {
            let features = grid.blob(id).feature_vector();
            if features.len() != model.weights.len() {
                bail!(
                    "blob {} has {} features, model expects {}",
                    id.0,
                    features.len(),
                    model.weights.len()
                );
            }
            grid.blob_mut(id).is_math = model.score(&features) > 0.0;
        }
        Ok(())
    }

    fn detector_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    /// Perceptron passes over the samples, then writes the weights file.
    fn do_training(&mut self, samples: &[BlobSample]) -> Result<()> {
        let Some(first) = samples.first() else {
            bail!("no training samples");
        };
        let dimension = first.features.len();
        let mut model = LinearModel {
            bias: 0.0,
            weights: vec![0.0; dimension],
        };
        for epoch in 0..EPOCHS {
            let mut mistakes = 0;
            for sample in samples {
                if sample.features.len() != dimension {
                    bail!(
                        "sample has {} features, expected {dimension}",
                        sample.features.len()
                    );
                }
                let target = if sample.label { 1.0 } else { -1.0 };
                if target * model.score(&sample.features) <= 0.0 {
                    mistakes += 1;
                    model.bias += LEARNING_RATE * target;
                    for (w, x) in model.weights.iter_mut().zip(&sample.features) {
                        *w += LEARNING_RATE * target * x;
                    }
                }
            }
            if mistakes == 0 {
                tracing::debug!(epoch, "perceptron converged");
                break;
            }
        }
        model.write(&self.path)?;
        tracing::info!(path = %self.path.display(), "wrote linear detector weights");
        self.model = Some(model);
        Ok(())
    }
}
