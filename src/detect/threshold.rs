use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::detect::{mean, MathExpressionDetector};
use crate::error::ConfigError;
use crate::grid::BlobDataGrid;
use crate::samples::BlobSample;

pub const NAME: &str = "threshold";

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Reads a trained threshold file holding one number. `None` when the file
/// does not exist yet.
pub fn read_threshold(path: &Path) -> Result<Option<f64>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let malformed = |line: usize, reason: String| ConfigError::MalformedResource {
        path: path.to_path_buf(),
        line,
        reason,
    };
    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let Some((idx, line)) = lines.next() else {
        return Err(malformed(1, "threshold file is empty".to_string()).into());
    };
    if let Some((extra, _)) = lines.next() {
        return Err(malformed(extra + 1, "threshold file must hold a single line".to_string()).into());
    }
    let value = line
        .trim()
        .parse::<f64>()
        .map_err(|e| malformed(idx + 1, e.to_string()))?;
    Ok(Some(value))
}

/// Labels a blob as math when the mean of its feature vector exceeds the
/// threshold. A trained threshold lives in a one-line file; without one the
/// detector runs at the default.
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    path: PathBuf,
    threshold: f64,
}

impl ThresholdDetector {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_math(&self, features: &[f64]) -> bool {
        mean(features) > self.threshold
    }
}

impl MathExpressionDetector for ThresholdDetector {
    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self, _dimension: usize) -> Result<()> {
        match read_threshold(&self.path)? {
            Some(threshold) => self.threshold = threshold,
            None => tracing::debug!(
                path = %self.path.display(),
                threshold = self.threshold,
                "no trained threshold, using default"
            ),
        }
        Ok(())
    }

    fn detect_math_expressions(&self, grid: &mut BlobDataGrid) -> Result<()> {
        let ids: Vec<_> = grid.ids().collect();
        for id in ids {
            let is_math = self.is_math(&grid.blob(id).feature_vector());
            grid.blob_mut(id).is_math = is_math;
        }
        Ok(())
    }

    fn detector_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    /// Places the threshold midway between the average math and non-math
    /// sample means, then writes it out.
    fn do_training(&mut self, samples: &[BlobSample]) -> Result<()> {
        let class_mean = |label: bool| {
            let means: Vec<f64> = samples
                .iter()
                .filter(|s| s.label == label)
                .map(|s| mean(&s.features))
                .collect();
            (!means.is_empty()).then(|| mean(&means))
        };
        let (Some(math), Some(non_math)) = (class_mean(true), class_mean(false)) else {
            bail!("training needs both math and non-math samples");
        };
        self.threshold = (math + non_math) / 2.0;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", self.threshold))
            .with_context(|| format!("failed to write threshold to {}", self.path.display()))?;
        tracing::info!(
            threshold = self.threshold,
            path = %self.path.display(),
            "trained threshold detector"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_model_path(prefix: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir()
            .join(format!("{prefix}-{}-{now}", std::process::id()))
            .join("detectors/finder.threshold")
    }

    fn samples() -> Vec<BlobSample> {
        vec![
            BlobSample::new(vec![0.75, 1.0], true, None),
            BlobSample::new(vec![0.25, 0.25], false, None),
            BlobSample::new(vec![0.0, 0.5], false, None),
        ]
    }

    #[test]
    fn training_picks_the_midpoint() {
        let path = temp_model_path("mathfinder-threshold-mid");
        let mut detector = ThresholdDetector::new(path.clone());
        detector.do_training(&samples()).unwrap();
        assert_eq!(detector.threshold(), 0.5625);
        assert!(detector.is_math(&[0.6, 0.6]));
        assert!(!detector.is_math(&[0.5, 0.5]));
        let _ = fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
    }

    #[test]
    fn trained_threshold_survives_reinitialization() {
        let path = temp_model_path("mathfinder-threshold-reload");
        let mut trainer = ThresholdDetector::new(path.clone());
        trainer
            .do_training(&[
                BlobSample::new(vec![0.5], true, None),
                BlobSample::new(vec![0.0], false, None),
            ])
            .unwrap();
        assert_eq!(trainer.threshold(), 0.25);

        let mut reloaded = ThresholdDetector::new(path.clone());
        assert_eq!(reloaded.threshold(), DEFAULT_THRESHOLD);
        reloaded.initialize(1).unwrap();
        assert_eq!(reloaded.threshold(), 0.25);
        assert!(reloaded.is_math(&[0.3]));
        let _ = fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
    }

    #[test]
    fn untrained_detector_keeps_the_default() {
        let mut detector = ThresholdDetector::new(temp_model_path("mathfinder-threshold-none"));
        detector.initialize(3).unwrap();
        assert_eq!(detector.threshold(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn malformed_threshold_file_is_a_config_error() {
        let path = temp_model_path("mathfinder-threshold-bad");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "0.3\n0.4\n").unwrap();
        let err = ThresholdDetector::new(path.clone()).initialize(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MalformedResource { line: 2, .. })
        ));
        let _ = fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
    }

    #[test]
    fn training_without_both_classes_fails() {
        let mut detector = ThresholdDetector::new(temp_model_path("mathfinder-threshold-one"));
        assert!(detector
            .do_training(&[BlobSample::new(vec![0.8], true, None)])
            .is_err());
    }
}
