pub mod aligned;
pub mod data;
pub mod description;
pub mod extractor;
pub mod nested;
pub mod ngrams;
pub mod other_rec;
pub mod registry;
pub mod stacked;
pub mod stopwords;
pub mod subsup;

use anyhow::Result;

use crate::grid::{BlobDataGrid, BlobId};

pub use aligned::AlignedExtractor;
pub use description::{DoubleFeature, EnabledFlags, ExtractorDescription, FlagDescription};
pub use extractor::MathExpressionFeatureExtractor;
pub use nested::NestedExtractor;
pub use ngrams::NGramExtractor;
pub use other_rec::OtherRecognitionExtractor;
pub use registry::ExtractorRegistry;
pub use stacked::StackedExtractor;
pub use subsup::SubSupExtractor;

/// Typed key for per-blob extractor data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtractorKind {
    Aligned,
    Nested,
    Stacked,
    SubSup,
    NGrams,
    OtherRecognition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorFamily {
    Spatial,
    Recognition,
}

impl ExtractorKind {
    pub fn family(self) -> ExtractorFamily {
        match self {
            ExtractorKind::Aligned | ExtractorKind::Nested | ExtractorKind::Stacked => {
                ExtractorFamily::Spatial
            }
            ExtractorKind::SubSup | ExtractorKind::NGrams | ExtractorKind::OtherRecognition => {
                ExtractorFamily::Recognition
            }
        }
    }
}

/// Contract shared by every blob feature extractor.
///
/// `preprocess` runs over the whole page before `extract_features` is called
/// for any blob on it. Features come out in flag registration order and
/// disabled flags produce nothing.
pub trait BlobFeatureExtractor {
    fn enabled_flags(&self) -> &EnabledFlags;

    /// One-time setup before training. Must be idempotent.
    fn do_trainer_initialization(&mut self) -> Result<()> {
        Ok(())
    }

    /// One-time setup before finding. Must be idempotent.
    fn do_finder_initialization(&mut self) -> Result<()> {
        self.do_trainer_initialization()
    }

    fn preprocess(&mut self, grid: &mut BlobDataGrid) -> Result<()>;

    fn extract_features(&self, grid: &BlobDataGrid, blob: BlobId) -> Vec<DoubleFeature>;
}

/// Closed set of extractor implementations.
#[derive(Debug)]
pub enum FeatureExtractor {
    Aligned(AlignedExtractor),
    Nested(NestedExtractor),
    Stacked(StackedExtractor),
    SubSup(SubSupExtractor),
    NGrams(NGramExtractor),
    OtherRecognition(OtherRecognitionExtractor),
}

impl FeatureExtractor {
    pub fn kind(&self) -> ExtractorKind {
        match self {
            FeatureExtractor::Aligned(_) => ExtractorKind::Aligned,
            FeatureExtractor::Nested(_) => ExtractorKind::Nested,
            FeatureExtractor::Stacked(_) => ExtractorKind::Stacked,
            FeatureExtractor::SubSup(_) => ExtractorKind::SubSup,
            FeatureExtractor::NGrams(_) => ExtractorKind::NGrams,
            FeatureExtractor::OtherRecognition(_) => ExtractorKind::OtherRecognition,
        }
    }

    pub fn unique_name(&self) -> &str {
        &self.enabled_flags().unique_name
    }

    fn inner(&self) -> &dyn BlobFeatureExtractor {
        match self {
            FeatureExtractor::Aligned(e) => e,
            FeatureExtractor::Nested(e) => e,
            FeatureExtractor::Stacked(e) => e,
            FeatureExtractor::SubSup(e) => e,
            FeatureExtractor::NGrams(e) => e,
            FeatureExtractor::OtherRecognition(e) => e,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn BlobFeatureExtractor {
        match self {
            FeatureExtractor::Aligned(e) => e,
            FeatureExtractor::Nested(e) => e,
            FeatureExtractor::Stacked(e) => e,
            FeatureExtractor::SubSup(e) => e,
            FeatureExtractor::NGrams(e) => e,
            FeatureExtractor::OtherRecognition(e) => e,
        }
    }
}

impl BlobFeatureExtractor for FeatureExtractor {
    fn enabled_flags(&self) -> &EnabledFlags {
        self.inner().enabled_flags()
    }

    fn do_trainer_initialization(&mut self) -> Result<()> {
        self.inner_mut().do_trainer_initialization()
    }

    fn do_finder_initialization(&mut self) -> Result<()> {
        self.inner_mut().do_finder_initialization()
    }

    fn preprocess(&mut self, grid: &mut BlobDataGrid) -> Result<()> {
        self.inner_mut().preprocess(grid)
    }

    fn extract_features(&self, grid: &BlobDataGrid, blob: BlobId) -> Vec<DoubleFeature> {
        self.inner().extract_features(grid, blob)
    }
}
