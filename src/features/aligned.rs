use std::collections::BTreeSet;

use anyhow::Result;

use crate::core::geometry::{exp_normalize, BlobBox, Direction};
use crate::features::data::ExtractorData;
use crate::features::description::{DoubleFeature, EnabledFlags, FlagDescription};
use crate::features::{BlobFeatureExtractor, ExtractorKind};
use crate::grid::{BlobDataGrid, BlobId};

pub const SHORT_NAME: &str = "NumAlignedBlobsFeatureExtractor";
pub const DESCRIPTION: &str = "Counts of neighboring blobs covered by a blob in each direction";

pub const RIGHTWARD: FlagDescription = FlagDescription::new(
    "NumAlignedRightwardEnabled",
    "Number of blobs covered by the blob in the rightward direction",
);
pub const DOWNWARD: FlagDescription = FlagDescription::new(
    "NumAlignedDownwardEnabled",
    "Number of blobs covered by the blob in the downward direction",
);
pub const UPWARD: FlagDescription = FlagDescription::new(
    "NumAlignedUpwardEnabled",
    "Number of blobs covered by the blob in the upward direction",
);

pub const FLAGS: &[FlagDescription] = &[RIGHTWARD, DOWNWARD, UPWARD];

fn flag_direction(flag: &FlagDescription) -> Direction {
    match flag.name {
        "NumAlignedDownwardEnabled" => Direction::Down,
        "NumAlignedUpwardEnabled" => Direction::Up,
        _ => Direction::Right,
    }
}

/// Covered neighbors found for a blob, per direction, sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignedData {
    pub right: Vec<BlobId>,
    pub left: Vec<BlobId>,
    pub up: Vec<BlobId>,
    pub down: Vec<BlobId>,
}

impl AlignedData {
    pub fn covered(&self, dir: Direction) -> &[BlobId] {
        match dir {
            Direction::Right => &self.right,
            Direction::Left => &self.left,
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    fn covered_mut(&mut self, dir: Direction) -> &mut Vec<BlobId> {
        match dir {
            Direction::Right => &mut self.right,
            Direction::Left => &mut self.left,
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
        }
    }

    pub fn count(&self, dir: Direction) -> usize {
        self.covered(dir).len()
    }
}

#[derive(Debug)]
pub struct AlignedExtractor {
    enabled: EnabledFlags,
}

impl AlignedExtractor {
    pub fn new(enabled: EnabledFlags) -> Self {
        Self { enabled }
    }

    /// A neighbor is covered when its center lies within the reference box's
    /// span across `dir`, it is close enough in `dir`, it is not tiny, and
    /// its size is at least half of its distance.
    pub fn is_neighbor_covered(
        neighbor: &BlobBox,
        reference: &BlobBox,
        dir: Direction,
        seg_mode: bool,
    ) -> bool {
        let dist_thresh_param = if seg_mode { 4.0 } else { 2.0 };
        let (lower, upper, extent, center) = if dir.is_horizontal() {
            (reference.top, reference.bottom, reference.height(), neighbor.center_y())
        } else {
            (reference.left, reference.right, reference.width(), neighbor.center_x())
        };
        if center < lower || center > upper {
            return false;
        }
        let dist = reference.gap_to(neighbor, dir) as f64;
        if dist > extent as f64 / dist_thresh_param {
            return false;
        }
        if neighbor.area() as f64 <= extent as f64 / 32.0 {
            return false;
        }
        let size = neighbor.width().max(neighbor.height()).max(1) as f64;
        dist / size < 2.0
    }

    /// Beam search from `reference` in `dir`: each line across the box picks
    /// the nearest untested blob lying past the box edge. Starts from
    /// `previously`, so earlier finds are kept.
    pub fn find_covered_blobs(
        grid: &BlobDataGrid,
        blob: BlobId,
        reference: BlobBox,
        dir: Direction,
        seg_mode: bool,
        previously: &[BlobId],
    ) -> Vec<BlobId> {
        let horizontal = dir.is_horizontal();
        let candidates: Vec<BlobId> = match dir {
            Direction::Right => grid.side_search(reference.right, reference.top, reference.bottom, dir),
            Direction::Left => grid.side_search(reference.left, reference.top, reference.bottom, dir),
            Direction::Up => grid.vertical_search(reference.left, reference.right, reference.top, dir),
            Direction::Down => {
                grid.vertical_search(reference.left, reference.right, reference.bottom, dir)
            }
        }
        .into_iter()
        .filter(|n| {
            let nb = grid.bbox(*n);
            *n != blob && nb != reference && reference.is_beyond(&nb, dir)
        })
        .collect();

        let (start, range) = if horizontal {
            (reference.top, reference.height())
        } else {
            (reference.left, reference.width())
        };

        let mut covered: BTreeSet<BlobId> = previously.iter().copied().collect();
        let mut tested: BTreeSet<BlobId> = BTreeSet::new();
        for line in start..start + range {
            let hit = candidates.iter().copied().find(|n| {
                let nb = grid.bbox(*n);
                let spans = if horizontal {
                    nb.top <= line && nb.bottom >= line
                } else {
                    nb.left <= line && nb.right >= line
                };
                spans && !tested.contains(n)
            });
            let Some(n) = hit else { continue };
            if !covered.contains(&n)
                && Self::is_neighbor_covered(&grid.bbox(n), &reference, dir, seg_mode)
            {
                covered.insert(n);
            }
            tested.insert(n);
        }
        covered.into_iter().collect()
    }

    /// Segmentation-mode count: searches from the blob's segment box, keeps
    /// previously found covered blobs, and stores the result on the blob.
    pub fn count_covered_blobs(
        grid: &mut BlobDataGrid,
        blob: BlobId,
        dir: Direction,
        segment_box: BlobBox,
    ) -> usize {
        let previously: Vec<BlobId> = grid
            .blob(blob)
            .extractor_data(ExtractorKind::Aligned)
            .and_then(ExtractorData::as_aligned)
            .map(|d| d.covered(dir).to_vec())
            .unwrap_or_default();
        let covered = Self::find_covered_blobs(grid, blob, segment_box, dir, true, &previously);
        let count = covered.len();
        let record = grid.blob_mut(blob);
        if record.extractor_data(ExtractorKind::Aligned).is_none() {
            record.set_extractor_data(ExtractorData::Aligned(AlignedData::default()));
        }
        if let Some(data) = record
            .extractor_data_mut(ExtractorKind::Aligned)
            .and_then(ExtractorData::as_aligned_mut)
        {
            *data.covered_mut(dir) = covered;
        }
        count
    }

    pub fn covered(grid: &BlobDataGrid, blob: BlobId, dir: Direction) -> Vec<BlobId> {
        grid.blob(blob)
            .extractor_data(ExtractorKind::Aligned)
            .and_then(ExtractorData::as_aligned)
            .map(|d| d.covered(dir).to_vec())
            .unwrap_or_default()
    }
}

impl BlobFeatureExtractor for AlignedExtractor {
    fn enabled_flags(&self) -> &EnabledFlags {
        &self.enabled
    }

    fn preprocess(&mut self, grid: &mut BlobDataGrid) -> Result<()> {
        let directions: Vec<Direction> = FLAGS
            .iter()
            .filter(|f| self.enabled.is_enabled(f))
            .map(flag_direction)
            .collect();

        let found: Vec<(BlobId, AlignedData)> = grid
            .ids()
            .map(|id| {
                let mut data = AlignedData::default();
                for dir in &directions {
                    *data.covered_mut(*dir) =
                        Self::find_covered_blobs(grid, id, grid.bbox(id), *dir, false, &[]);
                }
                (id, data)
            })
            .collect();

        for (id, data) in found {
            grid.blob_mut(id).set_extractor_data(ExtractorData::Aligned(data));
        }
        Ok(())
    }

    fn extract_features(&self, grid: &BlobDataGrid, blob: BlobId) -> Vec<DoubleFeature> {
        let data = grid
            .blob(blob)
            .extractor_data(ExtractorKind::Aligned)
            .and_then(ExtractorData::as_aligned);
        FLAGS
            .iter()
            .filter(|f| self.enabled.is_enabled(f))
            .map(|f| {
                let count = data.map_or(0, |d| d.count(flag_direction(f)));
                self.enabled.feature(exp_normalize(count as f64), Some(f))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::BlobData;
    use pretty_assertions::assert_eq;

    fn grid_with(boxes: &[BlobBox]) -> BlobDataGrid {
        let mut grid = BlobDataGrid::new("aligned", 400, 400);
        for b in boxes {
            grid.push_blob(BlobData::new(*b, None));
        }
        grid
    }

    fn all_flags() -> EnabledFlags {
        EnabledFlags::new(
            "Geometric.Alignment.NumAlignedBlobsFeatureExtractor".to_string(),
            FLAGS.iter().map(|f| f.name).collect(),
        )
    }

    #[test]
    fn rightward_neighbor_within_span_is_covered() {
        let b = BlobBox::new(100, 100, 150, 150);
        let n = BlobBox::new(160, 110, 180, 130);
        assert!(AlignedExtractor::is_neighbor_covered(&n, &b, Direction::Right, false));

        let mut grid = grid_with(&[b, n]);
        let mut extractor = AlignedExtractor::new(all_flags());
        extractor.preprocess(&mut grid).unwrap();
        assert_eq!(AlignedExtractor::covered(&grid, BlobId(0), Direction::Right), vec![BlobId(1)]);
    }

    #[test]
    fn neighbor_outside_vertical_span_is_not_covered() {
        let b = BlobBox::new(100, 100, 150, 150);
        let n = BlobBox::new(160, 200, 180, 220);
        assert!(!AlignedExtractor::is_neighbor_covered(&n, &b, Direction::Right, false));

        let mut grid = grid_with(&[b, n]);
        let mut extractor = AlignedExtractor::new(all_flags());
        extractor.preprocess(&mut grid).unwrap();
        assert!(AlignedExtractor::covered(&grid, BlobId(0), Direction::Right).is_empty());
    }

    #[test]
    fn neighbor_too_far_is_not_covered() {
        let b = BlobBox::new(100, 100, 150, 150);
        let n = BlobBox::new(180, 110, 200, 130);
        assert!(!AlignedExtractor::is_neighbor_covered(&n, &b, Direction::Right, false));
    }

    #[test]
    fn seg_mode_halves_the_distance_threshold() {
        let b = BlobBox::new(100, 100, 150, 150);
        let n = BlobBox::new(170, 110, 190, 130);
        assert!(AlignedExtractor::is_neighbor_covered(&n, &b, Direction::Right, false));
        assert!(!AlignedExtractor::is_neighbor_covered(&n, &b, Direction::Right, true));
    }

    #[test]
    fn emits_only_enabled_flags_in_registration_order() {
        let b = BlobBox::new(100, 100, 150, 150);
        let right = BlobBox::new(160, 110, 180, 130);
        let above = BlobBox::new(110, 80, 130, 95);
        let mut grid = grid_with(&[above, b, right]);
        let enabled = EnabledFlags::new("A".to_string(), vec![UPWARD.name, RIGHTWARD.name]);
        let mut extractor = AlignedExtractor::new(enabled);
        extractor.preprocess(&mut grid).unwrap();

        let features = extractor.extract_features(&grid, BlobId(1));
        let flags: Vec<_> = features.iter().map(|f| f.flag.clone().unwrap()).collect();
        assert_eq!(flags, vec![RIGHTWARD.name.to_string(), UPWARD.name.to_string()]);
        assert_eq!(features[0].value, exp_normalize(1.0));
        assert_eq!(features[1].value, exp_normalize(1.0));
    }
}
