pub mod info;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::core::model::{MathExpressionFinderResults, RunMode};
use crate::detect::{create_detector, MathExpressionDetector};
use crate::features::{ExtractorRegistry, MathExpressionFeatureExtractor};
use crate::grid::BlobDataGrid;
use crate::ocr::PageSource;
use crate::samples::BlobSample;
use crate::segment::{create_segmentor, MathExpressionSegmentor};

pub use info::{ExtractorSelection, FinderInfo, TrainingPaths};

/// A configured extractor set, detector and segmentor, run page by page.
///
/// Construction and initialization fail on configuration or resource
/// problems. Once initialized, a failing page is logged and yields empty
/// results while the rest of the batch carries on.
#[derive(Debug)]
pub struct MathExpressionFinder {
    info: FinderInfo,
    extractor: MathExpressionFeatureExtractor,
    detector: Box<dyn MathExpressionDetector>,
    segmentor: Box<dyn MathExpressionSegmentor>,
    initialized: bool,
}

fn page_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl MathExpressionFinder {
    pub fn new(info: FinderInfo) -> Result<Self> {
        let paths = info.training_paths();
        let registry = ExtractorRegistry::new(&paths);
        let extractor = MathExpressionFeatureExtractor::from_selections(&registry, &info.extractors)?;
        let detector = create_detector(
            &info.detector_name,
            paths.detector_model(&info.finder_name, &info.detector_name),
        )?;
        let segmentor = create_segmentor(&info.segmentor_name, &extractor)?;
        Ok(Self {
            info,
            extractor,
            detector,
            segmentor,
            initialized: false,
        })
    }

    pub fn info(&self) -> &FinderInfo {
        &self.info
    }

    pub fn extractor(&self) -> &MathExpressionFeatureExtractor {
        &self.extractor
    }

    pub fn detector_path(&self) -> Option<&Path> {
        self.detector.detector_path()
    }

    /// Loads extractor resources and the detector model. Idempotent.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.extractor.do_finder_initialization()?;
        self.detector.initialize(self.extractor.dimension())?;
        self.initialized = true;
        info!(
            finder = %self.info.finder_name,
            detector = self.detector.name(),
            segmentor = self.segmentor.name(),
            dimension = self.extractor.dimension(),
            "finder ready"
        );
        Ok(())
    }

    /// Feature extraction and detection only: each math blob becomes its own
    /// result.
    pub fn detect_math_expressions(
        &mut self,
        source: &dyn PageSource,
        pages: &[PathBuf],
    ) -> Result<Vec<MathExpressionFinderResults>> {
        self.run_batch(source, pages, RunMode::Detect)
    }

    /// Feature extraction, detection and segmentation.
    pub fn find_math_expressions(
        &mut self,
        source: &dyn PageSource,
        pages: &[PathBuf],
    ) -> Result<Vec<MathExpressionFinderResults>> {
        self.run_batch(source, pages, RunMode::Find)
    }

    fn run_batch(
        &mut self,
        source: &dyn PageSource,
        pages: &[PathBuf],
        mode: RunMode,
    ) -> Result<Vec<MathExpressionFinderResults>> {
        self.initialize()?;
        let mut all = Vec::with_capacity(pages.len());
        for path in pages {
            match self.process_page(source, path, mode) {
                Ok(results) => all.push(results),
                Err(err) => {
                    warn!(page = %path.display(), "page skipped: {err:#}");
                    all.push(self.empty_results(path, mode));
                }
            }
        }
        Ok(all)
    }

    /// Results standing in for a page that could not be processed.
    pub fn empty_results(&self, path: &Path, mode: RunMode) -> MathExpressionFinderResults {
        MathExpressionFinderResults::empty(page_name(path), self.info.finder_name.clone(), mode)
    }

    pub fn process_page(
        &mut self,
        source: &dyn PageSource,
        path: &Path,
        mode: RunMode,
    ) -> Result<MathExpressionFinderResults> {
        let mut grid = source.load_page(path)?;
        self.process_grid(&mut grid, mode)
    }

    /// Runs one already-built page through the configured stages.
    pub fn process_grid(
        &mut self,
        grid: &mut BlobDataGrid,
        mode: RunMode,
    ) -> Result<MathExpressionFinderResults> {
        self.initialize()?;
        if grid.is_empty() {
            bail!("page {} has no blobs", grid.name());
        }
        self.extractor.extract_features(grid)?;
        self.detector.detect_math_expressions(grid)?;
        let results = match mode {
            RunMode::Detect => grid.detection_results(&self.info.finder_name),
            RunMode::Find => {
                self.segmentor.run_segmentation(grid)?;
                grid.segmentation_results(&self.info.finder_name)
            }
        };
        info!(
            page = grid.name(),
            blobs = grid.len(),
            segments = results.segments.len(),
            "processed page"
        );
        Ok(results)
    }

    /// Feature vectors of one page, labelled with the blobs' current math
    /// status.
    pub fn extract_samples(&mut self, grid: &mut BlobDataGrid) -> Result<Vec<BlobSample>> {
        self.extractor.do_trainer_initialization()?;
        self.extractor.extract_features(grid)?;
        Ok(BlobSample::from_grid(grid))
    }

    /// Gathers groundtruth-labelled samples from every readable page and
    /// trains the detector on them. Returns the samples used.
    pub fn train(&mut self, source: &dyn PageSource, pages: &[PathBuf]) -> Result<Vec<BlobSample>> {
        let mut samples = Vec::new();
        for path in pages {
            let outcome = source
                .load_page(path)
                .and_then(|mut grid| self.extract_samples(&mut grid));
            match outcome {
                Ok(page_samples) => samples.extend(page_samples),
                Err(err) => warn!(page = %path.display(), "page skipped: {err:#}"),
            }
        }
        if samples.is_empty() {
            bail!("no training samples could be extracted");
        }
        self.detector.do_training(&samples)?;
        info!(samples = samples.len(), detector = self.detector.name(), "trained detector");
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BlobBox;
    use crate::error::ConfigError;
    use crate::grid::BlobData;
    use pretty_assertions::assert_eq;

    fn spatial_info(detector: &str) -> FinderInfo {
        FinderInfo::new(
            "spatial",
            detector,
            "heuristic",
            vec![
                ExtractorSelection::new(
                    "Geometric.Alignment.NumAlignedBlobsFeatureExtractor",
                    &["NumAlignedRightwardEnabled"],
                ),
                ExtractorSelection::new("Geometric.NumVerticallyStackedBlobsFeatureExtractor", &[]),
            ],
        )
    }

    struct FailingSource;

    impl PageSource for FailingSource {
        fn load_page(&self, path: &Path) -> Result<BlobDataGrid> {
            if path.ends_with("good") {
                let mut grid = BlobDataGrid::new("good", 300, 300);
                grid.push_blob(BlobData::new(BlobBox::new(10, 10, 40, 40), None));
                Ok(grid)
            } else {
                bail!("cannot read {}", path.display())
            }
        }
    }

    /// Two rightward-aligned math blobs and a lone non-math blob.
    struct LabelledSource;

    impl PageSource for LabelledSource {
        fn load_page(&self, _path: &Path) -> Result<BlobDataGrid> {
            let mut grid = BlobDataGrid::new("labelled", 500, 500);
            for (bbox, is_math) in [
                (BlobBox::new(100, 100, 150, 150), true),
                (BlobBox::new(160, 110, 180, 130), true),
                (BlobBox::new(400, 400, 420, 420), false),
            ] {
                let id = grid.push_blob(BlobData::new(bbox, None));
                grid.blob_mut(id).is_math = is_math;
            }
            Ok(grid)
        }
    }

    fn temp_resources(prefix: &str) -> PathBuf {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}-{}-{now}", std::process::id()))
    }

    #[test]
    fn trained_threshold_is_used_after_reload() {
        let resources = temp_resources("mathfinder-finder-threshold");
        let info = spatial_info("threshold").with_resource_dir(resources.clone());
        let pages = vec![PathBuf::from("labelled")];

        let mut untrained = MathExpressionFinder::new(info.clone()).unwrap();
        let before = untrained.detect_math_expressions(&LabelledSource, &pages).unwrap();
        assert!(before[0].segments.is_empty());

        let mut trainer = MathExpressionFinder::new(info.clone()).unwrap();
        trainer.train(&LabelledSource, &pages).unwrap();
        let model = resources.join("detectors/spatial.threshold");
        assert_eq!(trainer.detector_path(), Some(model.as_path()));
        assert!(model.exists());

        let mut reloaded = MathExpressionFinder::new(info).unwrap();
        let after = reloaded.detect_math_expressions(&LabelledSource, &pages).unwrap();
        assert_eq!(after[0].segments.len(), 1);
        assert_eq!(after[0].segments[0].bbox, BlobBox::new(100, 100, 150, 150));

        let _ = std::fs::remove_dir_all(&resources);
    }

    #[test]
    fn unknown_names_fail_construction() {
        let mut info = spatial_info("threshold");
        info.segmentor_name = "greedy".to_string();
        let err = MathExpressionFinder::new(info).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownSegmentor(_))
        ));
        assert!(MathExpressionFinder::new(spatial_info("svm")).is_err());
    }

    #[test]
    fn failing_pages_yield_empty_results() {
        let mut finder = MathExpressionFinder::new(spatial_info("threshold")).unwrap();
        let pages = vec![PathBuf::from("missing"), PathBuf::from("good")];
        let results = finder.find_math_expressions(&FailingSource, &pages).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].results_name, "missing");
        assert!(results[0].segments.is_empty());
        assert_eq!(results[1].results_name, "good");
        assert_eq!(results[1].results_dir_name, "spatial");
    }

    #[test]
    fn empty_page_is_a_page_error() {
        let mut finder = MathExpressionFinder::new(spatial_info("threshold")).unwrap();
        let mut grid = BlobDataGrid::new("blank", 10, 10);
        assert!(finder.process_grid(&mut grid, RunMode::Detect).is_err());
    }
}
