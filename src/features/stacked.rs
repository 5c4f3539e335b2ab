use anyhow::Result;

use crate::core::geometry::{exp_normalize, BlobBox, Direction};
use crate::features::data::ExtractorData;
use crate::features::description::{DoubleFeature, EnabledFlags, FlagDescription};
use crate::features::{BlobFeatureExtractor, ExtractorKind};
use crate::grid::{BlobDataGrid, BlobId};

pub const SHORT_NAME: &str = "NumVerticallyStackedBlobsFeatureExtractor";
pub const DESCRIPTION: &str = "Number of blobs stacked vertically on top of or below a blob";
pub const FLAGS: &[FlagDescription] = &[];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackedData {
    pub above: Vec<BlobId>,
    pub below: Vec<BlobId>,
}

impl StackedData {
    pub fn count(&self) -> usize {
        self.above.len() + self.below.len()
    }

    pub fn stacked(&self, dir: Direction) -> &[BlobId] {
        match dir {
            Direction::Up => &self.above,
            Direction::Down => &self.below,
            Direction::Left | Direction::Right => &[],
        }
    }
}

#[derive(Debug)]
pub struct StackedExtractor {
    enabled: EnabledFlags,
}

impl StackedExtractor {
    pub fn new(enabled: EnabledFlags) -> Self {
        Self { enabled }
    }

    /// `neighbor` is adjacent to `current` in `dir` when it is at least a
    /// sixteenth of `dim`'s area and the gap is at most half of `dim`'s
    /// extent along `dir`.
    pub fn is_adjacent(neighbor: &BlobBox, current: &BlobBox, dir: Direction, dim: &BlobBox) -> bool {
        if (neighbor.area() as f64) < dim.area() as f64 / 16.0 {
            return false;
        }
        let extent = if dir.is_horizontal() {
            dim.width()
        } else {
            dim.height()
        };
        current.gap_to(neighbor, dir) as f64 <= extent as f64 / 2.0
    }

    /// Walks away from `blob` in `dir`, each step taking the next blob that
    /// lies past the previous stacked blob and overlaps it horizontally.
    pub fn find_stacked(grid: &BlobDataGrid, blob: BlobId, dir: Direction) -> Vec<BlobId> {
        let central = grid.bbox(blob);
        let edge = if dir == Direction::Up {
            central.top
        } else {
            central.bottom
        };
        let mut candidates = grid
            .vertical_search(central.left, central.right, edge, dir)
            .into_iter();

        let mut stacked: Vec<BlobId> = Vec::new();
        let mut prev = central;
        loop {
            let next = candidates.by_ref().find(|c| {
                let cb = grid.bbox(*c);
                let past_prev = match dir {
                    Direction::Up => cb.bottom <= prev.top,
                    _ => cb.top >= prev.bottom,
                };
                *c != blob
                    && cb != prev
                    && past_prev
                    && cb.left < prev.right
                    && cb.right > prev.left
                    && !stacked.contains(c)
            });
            let Some(next) = next else { break };
            let next_box = grid.bbox(next);
            if !Self::is_adjacent(&next_box, &prev, dir, &central) {
                break;
            }
            stacked.push(next);
            prev = next_box;
        }
        stacked
    }

    pub fn stacked(grid: &BlobDataGrid, blob: BlobId, dir: Direction) -> Vec<BlobId> {
        grid.blob(blob)
            .extractor_data(ExtractorKind::Stacked)
            .and_then(ExtractorData::as_stacked)
            .map(|d| d.stacked(dir).to_vec())
            .unwrap_or_default()
    }
}

impl BlobFeatureExtractor for StackedExtractor {
    fn enabled_flags(&self) -> &EnabledFlags {
        &self.enabled
    }

    fn preprocess(&mut self, grid: &mut BlobDataGrid) -> Result<()> {
        let found: Vec<(BlobId, StackedData)> = grid
            .ids()
            .map(|id| {
                let data = StackedData {
                    above: Self::find_stacked(grid, id, Direction::Up),
                    below: Self::find_stacked(grid, id, Direction::Down),
                };
                (id, data)
            })
            .collect();
        for (id, data) in found {
            grid.blob_mut(id).set_extractor_data(ExtractorData::Stacked(data));
        }
        Ok(())
    }

    fn extract_features(&self, grid: &BlobDataGrid, blob: BlobId) -> Vec<DoubleFeature> {
        let count = grid
            .blob(blob)
            .extractor_data(ExtractorKind::Stacked)
            .and_then(ExtractorData::as_stacked)
            .map_or(0, StackedData::count);
        vec![self.enabled.feature(exp_normalize(count as f64), None)]
    }
}
