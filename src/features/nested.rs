use anyhow::Result;

use crate::core::geometry::exp_normalize;
use crate::features::data::ExtractorData;
use crate::features::description::{DoubleFeature, EnabledFlags, FlagDescription};
use crate::features::{BlobFeatureExtractor, ExtractorKind};
use crate::grid::{BlobDataGrid, BlobId};

pub const SHORT_NAME: &str = "NumCompletelyNestedBlobsFeatureExtractor";
pub const DESCRIPTION: &str = "Number of blobs completely nested inside a blob";
pub const FLAGS: &[FlagDescription] = &[];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedData {
    pub nested: Vec<BlobId>,
}

#[derive(Debug)]
pub struct NestedExtractor {
    enabled: EnabledFlags,
}

impl NestedExtractor {
    pub fn new(enabled: EnabledFlags) -> Self {
        Self { enabled }
    }

    /// Blobs inside `blob`'s box that are not negligibly small.
    pub fn find_nested(grid: &BlobDataGrid, blob: BlobId) -> Vec<BlobId> {
        let outer = grid.bbox(blob);
        grid.rect_search(&outer)
            .into_iter()
            .filter(|n| {
                let inner = grid.bbox(*n);
                *n != blob
                    && inner != outer
                    && outer.contains(&inner)
                    && inner.area() * 64 >= outer.area()
            })
            .collect()
    }
}

impl BlobFeatureExtractor for NestedExtractor {
    fn enabled_flags(&self) -> &EnabledFlags {
        &self.enabled
    }

    fn preprocess(&mut self, grid: &mut BlobDataGrid) -> Result<()> {
        let found: Vec<(BlobId, Vec<BlobId>)> = grid
            .ids()
            .map(|id| (id, Self::find_nested(grid, id)))
            .collect();
        for (id, nested) in found {
            grid.blob_mut(id)
                .set_extractor_data(ExtractorData::Nested(NestedData { nested }));
        }
        Ok(())
    }

    fn extract_features(&self, grid: &BlobDataGrid, blob: BlobId) -> Vec<DoubleFeature> {
        let count = grid
            .blob(blob)
            .extractor_data(ExtractorKind::Nested)
            .and_then(ExtractorData::as_nested)
            .map_or(0, |d| d.nested.len());
        vec![self.enabled.feature(exp_normalize(count as f64), None)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BlobBox;
    use crate::grid::BlobData;
    use pretty_assertions::assert_eq;

    fn run(boxes: &[BlobBox]) -> (NestedExtractor, BlobDataGrid) {
        let mut grid = BlobDataGrid::new("nested", 300, 300);
        for b in boxes {
            grid.push_blob(BlobData::new(*b, None));
        }
        let mut extractor = NestedExtractor::new(EnabledFlags::new(
            "Geometric.NumCompletelyNestedBlobsFeatureExtractor".to_string(),
            vec![],
        ));
        extractor.preprocess(&mut grid).unwrap();
        (extractor, grid)
    }

    #[test]
    fn contained_blob_counts_once() {
        let (extractor, grid) = run(&[
            BlobBox::new(0, 0, 100, 100),
            BlobBox::new(20, 20, 60, 60),
        ]);
        let features = extractor.extract_features(&grid, BlobId(0));
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].value, exp_normalize(1.0));
        assert_eq!(extractor.extract_features(&grid, BlobId(1))[0].value, 0.0);
    }

    #[test]
    fn partial_overlap_does_not_count() {
        let (extractor, grid) = run(&[
            BlobBox::new(0, 0, 100, 100),
            BlobBox::new(80, 80, 140, 140),
        ]);
        assert_eq!(extractor.extract_features(&grid, BlobId(0))[0].value, 0.0);
    }

    #[test]
    fn tiny_specks_are_ignored() {
        let (extractor, grid) = run(&[BlobBox::new(0, 0, 100, 100), BlobBox::new(10, 10, 12, 12)]);
        assert_eq!(extractor.extract_features(&grid, BlobId(0))[0].value, 0.0);
    }
}
