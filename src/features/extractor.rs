use anyhow::Result;

use crate::error::ConfigError;
use crate::features::registry::ExtractorRegistry;
use crate::features::{BlobFeatureExtractor, ExtractorKind, FeatureExtractor};
use crate::finder::ExtractorSelection;
use crate::grid::BlobDataGrid;

/// Runs a fixed, ordered set of extractors over a page and assembles each
/// blob's feature vector.
#[derive(Debug)]
pub struct MathExpressionFeatureExtractor {
    extractors: Vec<FeatureExtractor>,
    trainer_ready: bool,
    finder_ready: bool,
}

impl MathExpressionFeatureExtractor {
    pub fn new(extractors: Vec<FeatureExtractor>) -> Result<Self> {
        for (idx, e) in extractors.iter().enumerate() {
            if extractors[..idx].iter().any(|prev| prev.kind() == e.kind()) {
                return Err(ConfigError::DuplicateExtractor(e.unique_name().to_string()).into());
            }
        }
        Ok(Self {
            extractors,
            trainer_ready: false,
            finder_ready: false,
        })
    }

    /// Builds the extractors in selection order, which fixes the layout of
    /// every feature vector.
    pub fn from_selections(
        registry: &ExtractorRegistry,
        selections: &[ExtractorSelection],
    ) -> Result<Self> {
        let extractors = selections
            .iter()
            .map(|s| registry.create(&s.unique_name, &s.flags))
            .collect::<Result<Vec<_>>>()?;
        Self::new(extractors)
    }

    pub fn do_trainer_initialization(&mut self) -> Result<()> {
        if self.trainer_ready {
            return Ok(());
        }
        for e in &mut self.extractors {
            e.do_trainer_initialization()?;
        }
        self.trainer_ready = true;
        Ok(())
    }

    pub fn do_finder_initialization(&mut self) -> Result<()> {
        if self.finder_ready {
            return Ok(());
        }
        for e in &mut self.extractors {
            e.do_finder_initialization()?;
        }
        self.finder_ready = true;
        Ok(())
    }

    /// Preprocesses the whole page with every extractor, in order, then
    /// replaces each blob's feature vector with the concatenated output.
    pub fn extract_features(&mut self, grid: &mut BlobDataGrid) -> Result<()> {
        for e in &mut self.extractors {
            e.preprocess(grid)?;
        }
        let ids: Vec<_> = grid.ids().collect();
        for id in ids {
            let features = self
                .extractors
                .iter()
                .flat_map(|e| e.extract_features(grid, id))
                .collect();
            grid.blob_mut(id).features = features;
        }
        tracing::debug!(
            page = grid.name(),
            blobs = grid.len(),
            dimension = self.dimension(),
            "extracted features"
        );
        Ok(())
    }

    pub fn extractors(&self) -> &[FeatureExtractor] {
        &self.extractors
    }

    pub fn has(&self, kind: ExtractorKind) -> bool {
        self.extractors.iter().any(|e| e.kind() == kind)
    }

    /// `(extractor, flag)` per feature vector component.
    pub fn feature_layout(&self) -> Vec<(String, Option<&'static str>)> {
        self.extractors
            .iter()
            .flat_map(|e| {
                let name = e.unique_name().to_string();
                let flags = e.enabled_flags().names();
                if flags.is_empty() {
                    vec![(name, None)]
                } else {
                    flags.iter().map(|f| (name.clone(), Some(*f))).collect()
                }
            })
            .collect()
    }

    pub fn dimension(&self) -> usize {
        self.feature_layout().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BlobBox;
    use crate::finder::TrainingPaths;
    use crate::grid::{BlobData, BlobId};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn selection(name: &str, flags: &[&str]) -> ExtractorSelection {
        ExtractorSelection {
            unique_name: name.to_string(),
            flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn spatial() -> MathExpressionFeatureExtractor {
        let registry = ExtractorRegistry::new(&TrainingPaths::new(PathBuf::from("training")));
        MathExpressionFeatureExtractor::from_selections(
            &registry,
            &[
                selection(
                    "Geometric.Alignment.NumAlignedBlobsFeatureExtractor",
                    &["NumAlignedDownwardEnabled", "NumAlignedUpwardEnabled"],
                ),
                selection("Geometric.NumCompletelyNestedBlobsFeatureExtractor", &[]),
                selection("Geometric.NumVerticallyStackedBlobsFeatureExtractor", &[]),
            ],
        )
        .unwrap()
    }

    fn page() -> BlobDataGrid {
        let mut grid = BlobDataGrid::new("orchestrator", 300, 300);
        for b in [
            BlobBox::new(110, 50, 140, 80),
            BlobBox::new(100, 90, 150, 95),
            BlobBox::new(110, 100, 140, 130),
            BlobBox::new(200, 50, 230, 80),
        ] {
            grid.push_blob(BlobData::new(b, None));
        }
        grid
    }

    #[test]
    fn every_blob_gets_the_same_layout() {
        let mut extractor = spatial();
        extractor.do_finder_initialization().unwrap();
        let mut grid = page();
        extractor.extract_features(&mut grid).unwrap();
        assert_eq!(extractor.dimension(), 4);
        for id in grid.ids() {
            assert_eq!(grid.blob(id).features.len(), 4);
        }
        let layout = extractor.feature_layout();
        assert_eq!(layout[0].1, Some("NumAlignedDownwardEnabled"));
        assert_eq!(layout[2], ("Geometric.NumCompletelyNestedBlobsFeatureExtractor".to_string(), None));
    }

    #[test]
    fn extraction_is_deterministic() {
        let mut extractor = spatial();
        let mut first = page();
        let mut second = page();
        extractor.extract_features(&mut first).unwrap();
        extractor.extract_features(&mut second).unwrap();
        extractor.extract_features(&mut second).unwrap();
        for id in first.ids() {
            assert_eq!(first.blob(id).features, second.blob(id).features);
        }
        assert!(first.blob(BlobId(0)).feature_vector()[3] > 0.0);
    }

    #[test]
    fn duplicate_extractors_are_rejected() {
        let registry = ExtractorRegistry::new(&TrainingPaths::new(PathBuf::from("training")));
        let name = "Geometric.NumCompletelyNestedBlobsFeatureExtractor";
        let err = MathExpressionFeatureExtractor::from_selections(
            &registry,
            &[selection(name, &[]), selection(name, &[])],
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::DuplicateExtractor(_))
        ));
    }
}
