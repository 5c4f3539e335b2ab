use anyhow::Result;
use tracing::debug;

use crate::core::geometry::{BlobBox, Direction};
use crate::core::model::ResultType;
use crate::error::ConfigError;
use crate::features::{
    aligned, stacked, AlignedExtractor, ExtractorKind, MathExpressionFeatureExtractor,
    StackedExtractor, SubSupExtractor,
};
use crate::grid::{BlobDataGrid, BlobId, BlobMergeData, SegmentId};
use crate::segment::MathExpressionSegmentor;

pub const NAME: &str = "heuristic";

/// Math blobs in a valid non-math word below this share are reset to non-math.
const SPARSE_MATH_RATIO: f64 = 0.6;

const DIRECTIONS: [Direction; 4] = [
    Direction::Left,
    Direction::Right,
    Direction::Up,
    Direction::Down,
];

/// Order in which merge candidates are consumed.
const WALK: [Link; 5] = [
    Link::Side(Direction::Down),
    Link::Side(Direction::Up),
    Link::Side(Direction::Right),
    Link::Side(Direction::Left),
    Link::Intersecting,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Side(Direction),
    Intersecting,
}

/// Grows segments outward from math blobs by merging adjacent math blobs
/// and operators until no segment changes.
#[derive(Debug)]
pub struct HeuristicMerge {
    use_subsup: bool,
}

impl HeuristicMerge {
    /// Needs the alignment and stacking extractors in the configuration,
    /// since merge decisions read their neighbor lists.
    pub fn new(extractor: &MathExpressionFeatureExtractor) -> Result<Self> {
        for (kind, short_name) in [
            (ExtractorKind::Aligned, aligned::SHORT_NAME),
            (ExtractorKind::Stacked, stacked::SHORT_NAME),
        ] {
            if !extractor.has(kind) {
                return Err(ConfigError::MissingExtractor {
                    segmentor: NAME.to_string(),
                    extractor: short_name.to_string(),
                }
                .into());
            }
        }
        Ok(Self {
            use_subsup: extractor.has(ExtractorKind::SubSup),
        })
    }

    /// Clears math labels from blobs of recognized prose words that are
    /// stopwords or only sparsely math.
    fn filter_sparse_words(grid: &mut BlobDataGrid) {
        for word_idx in 0..grid.words.len() {
            let word = &grid.words[word_idx];
            if !word.is_valid || word.is_math_word {
                continue;
            }
            let is_stopword = word.is_stopword;
            let blobs = grid.blobs_in_word(word_idx);
            let math = blobs.iter().filter(|b| grid.blob(**b).is_math).count();
            if math == 0 {
                continue;
            }
            let ratio = math as f64 / blobs.len() as f64;
            if is_stopword || ratio < SPARSE_MATH_RATIO {
                debug!(word = %grid.words[word_idx].text, ratio, "dropping sparse math word");
                for b in blobs {
                    grid.blob_mut(b).is_math = false;
                }
            }
        }
    }

    fn segment_of(grid: &BlobDataGrid, blob: BlobId) -> Option<SegmentId> {
        grid.blob(blob).merge_data().and_then(|m| m.segment)
    }

    fn needs_processing(grid: &BlobDataGrid, blob: BlobId) -> bool {
        let record = grid.blob(blob);
        match record.merge_data() {
            None => record.is_math,
            Some(m) => match m.segment {
                None => record.is_math && !m.is_processed,
                Some(seg) => {
                    !m.is_processed || grid.segment(seg).bbox.area() != m.processed_seg_area
                }
            },
        }
    }

    /// Depth-first expansion of the segment that `start` belongs to.
    fn process(&self, grid: &mut BlobDataGrid, start: BlobId) {
        let mut stack: Vec<(BlobId, Option<SegmentId>)> = vec![(start, None)];
        while let Some((blob, current)) = stack.pop() {
            let Some(seg) = self.decide_and_merge(grid, blob, current) else {
                continue;
            };
            let mut merged = Vec::new();
            for link in WALK {
                let candidates: Vec<BlobId> = grid
                    .blob(blob)
                    .merge_data()
                    .map(|m| match link {
                        Link::Side(dir) => m.list(dir).to_vec(),
                        Link::Intersecting => m.intersecting.clone(),
                    })
                    .unwrap_or_default();
                for n in candidates {
                    if Self::segment_of(grid, n).is_none() {
                        Self::merge_operation(grid, blob, n, link, seg);
                        merged.push(n);
                    }
                }
            }
            stack.extend(merged.into_iter().map(|n| (n, Some(seg))));
        }
    }

    /// Collects merge candidates around `blob` for its segment. Returns the
    /// segment when candidates were gathered, `None` when the blob belongs
    /// elsewhere or its segment has not grown since its last visit.
    fn decide_and_merge(
        &self,
        grid: &mut BlobDataGrid,
        blob: BlobId,
        current: Option<SegmentId>,
    ) -> Option<SegmentId> {
        let existing = Self::segment_of(grid, blob);
        if let (Some(own), Some(current)) = (existing, current) {
            if own != current {
                return None;
            }
        }

        let was_processed = {
            let m = grid.blob_mut(blob).merge_data_mut();
            std::mem::replace(&mut m.is_processed, true)
        };
        let seg = match existing {
            Some(seg) => seg,
            None => {
                let result_type = if grid.belongs_to_recognized_normal_row(blob) {
                    ResultType::Embedded
                } else {
                    ResultType::Displayed
                };
                let seg = grid.add_segment(grid.bbox(blob), result_type);
                grid.blob_mut(blob).merge_data_mut().segment = Some(seg);
                seg
            }
        };

        let area = grid.segment(seg).bbox.area();
        let m = grid.blob_mut(blob).merge_data_mut();
        if was_processed && area == m.processed_seg_area {
            return None;
        }
        m.processed_seg_area = area;

        for dir in DIRECTIONS {
            self.merge_decision(grid, blob, seg, dir);
        }
        Self::check_intersecting(grid, blob, seg);
        Some(seg)
    }

    fn merge_decision(&self, grid: &mut BlobDataGrid, blob: BlobId, seg: SegmentId, dir: Direction) {
        let seg_box = grid.segment(seg).bbox;
        AlignedExtractor::count_covered_blobs(grid, blob, dir, seg_box);
        let mut candidates = AlignedExtractor::covered(grid, blob, dir);

        if dir.is_horizontal() {
            if let Some(n) = Self::horizontal_neighbor(grid, blob, seg, dir) {
                candidates.push(n);
            }
            if self.use_subsup {
                if let Some(data) = SubSupExtractor::data(grid, blob) {
                    candidates.extend(data.linked(dir));
                }
            }
        } else {
            candidates.extend(StackedExtractor::stacked(grid, blob, dir));
        }

        let accepted: Vec<BlobId> = candidates
            .into_iter()
            .filter(|n| {
                *n != blob
                    && (grid.blob(*n).is_math || grid.is_operator(*n))
                    && Self::segment_of(grid, *n).is_none()
            })
            .collect();
        if !accepted.is_empty() {
            debug!(blob = blob.0, dir = dir.label(), ?accepted, "merge candidates");
        }
        let list = grid.blob_mut(blob).merge_data_mut().list_mut(dir);
        for n in accepted {
            BlobMergeData::push_unique(list, n);
        }
    }

    /// Nearest blob past the segment edge that sits within the segment's
    /// vertical span and is close enough, or failing that the nearest blob
    /// past the blob itself when either one is an operator.
    fn horizontal_neighbor(
        grid: &BlobDataGrid,
        blob: BlobId,
        seg: SegmentId,
        dir: Direction,
    ) -> Option<BlobId> {
        let seg_box = grid.segment(seg).bbox;
        let nearest_within = |reference: &BlobBox| {
            let edge = if dir == Direction::Right {
                reference.right
            } else {
                reference.left
            };
            grid.side_search(edge, reference.top, reference.bottom, dir)
                .into_iter()
                .find(|n| {
                    let nb = grid.bbox(*n);
                    *n != blob
                        && reference.is_beyond(&nb, dir)
                        && nb.top >= reference.top
                        && nb.bottom <= reference.bottom
                })
        };

        if let Some(n) = nearest_within(&seg_box) {
            let nb = grid.bbox(n);
            return StackedExtractor::is_adjacent(&nb, &seg_box, dir, &seg_box).then_some(n);
        }

        let b = grid.bbox(blob);
        let n = nearest_within(&b)?;
        if Self::segment_of(grid, n) == Some(seg) {
            return None;
        }
        (grid.is_operator(blob) || grid.is_operator(n)).then_some(n)
    }

    fn check_intersecting(grid: &mut BlobDataGrid, blob: BlobId, seg: SegmentId) {
        let seg_box = grid.segment(seg).bbox;
        let found: Vec<BlobId> = grid
            .rect_search(&seg_box)
            .into_iter()
            .filter(|n| *n != blob && Self::segment_of(grid, *n).is_none())
            .collect();
        let list = &mut grid.blob_mut(blob).merge_data_mut().intersecting;
        for n in found {
            BlobMergeData::push_unique(list, n);
        }
    }

    fn merge_operation(grid: &mut BlobDataGrid, blob: BlobId, neighbor: BlobId, link: Link, seg: SegmentId) {
        let m = grid.blob_mut(neighbor).merge_data_mut();
        match link {
            Link::Side(dir) => BlobMergeData::push_unique(m.list_mut(dir.opposite()), blob),
            Link::Intersecting => BlobMergeData::push_unique(&mut m.intersecting, blob),
        }
        m.segment = Some(seg);
        let nb = grid.bbox(neighbor);
        let segment = grid.segment_mut(seg);
        segment.bbox = segment.bbox.union(&nb);
        debug!(blob = blob.0, neighbor = neighbor.0, segment = seg.0, "merged");
    }
}

impl MathExpressionSegmentor for HeuristicMerge {
    fn name(&self) -> &str {
        NAME
    }

    fn run_segmentation(&mut self, grid: &mut BlobDataGrid) -> Result<()> {
        grid.clear_segments();
        Self::filter_sparse_words(grid);

        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;
            let ids: Vec<BlobId> = grid.ids().collect();
            for id in ids {
                if Self::needs_processing(grid, id) {
                    changed = true;
                    self.process(grid, id);
                }
            }
            if !changed {
                break;
            }
        }
        debug!(
            page = grid.name(),
            passes,
            segments = grid.segments().len(),
            "segmentation finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::registry::ExtractorRegistry;
    use crate::finder::{ExtractorSelection, TrainingPaths};
    use crate::grid::{BlobData, CharData, WordData};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn extractor(with_subsup: bool) -> MathExpressionFeatureExtractor {
        let registry = ExtractorRegistry::new(&TrainingPaths::new(PathBuf::from("training")));
        let mut selections = vec![
            ExtractorSelection::new(
                "Geometric.Alignment.NumAlignedBlobsFeatureExtractor",
                &["NumAlignedRightwardEnabled", "NumAlignedDownwardEnabled", "NumAlignedUpwardEnabled"],
            ),
            ExtractorSelection::new("Geometric.NumVerticallyStackedBlobsFeatureExtractor", &[]),
        ];
        if with_subsup {
            selections.push(ExtractorSelection::new(
                "Recognition.SubOrSuperscriptsFeatureExtractor",
                &["HasSuperscript", "IsSuperscript"],
            ));
        }
        MathExpressionFeatureExtractor::from_selections(&registry, &selections).unwrap()
    }

    fn all_math(boxes: &[BlobBox]) -> BlobDataGrid {
        let mut grid = BlobDataGrid::new("segment", 1000, 1000);
        for b in boxes {
            let mut blob = BlobData::new(*b, None);
            blob.is_math = true;
            grid.push_blob(blob);
        }
        grid
    }

    fn segment(grid: &mut BlobDataGrid, extractor: &mut MathExpressionFeatureExtractor) {
        extractor.extract_features(grid).unwrap();
        let mut segmentor = HeuristicMerge::new(extractor).unwrap();
        segmentor.run_segmentation(grid).unwrap();
    }

    fn attach_word(grid: &mut BlobDataGrid, blob: BlobId, text: &str, valid: bool) {
        let word_idx = grid.words.len();
        let char_idx = grid.chars.len();
        grid.words.push(WordData {
            text: text.to_string(),
            certainty: 1.0,
            is_valid: valid,
            is_italic: false,
            row: None,
            sentence: None,
            chars: vec![char_idx],
            is_math_word: false,
            is_stopword: false,
        });
        grid.chars.push(CharData {
            text: text.to_string(),
            bbox: grid.bbox(blob),
            confidence: 90.0,
            word: Some(word_idx),
            blobs: vec![blob],
            is_leftmost_in_word: true,
            distance_above_baseline: None,
        });
        grid.blob_mut(blob).char_id = Some(char_idx);
    }

    #[test]
    fn superscript_joins_its_base() {
        let mut grid = all_math(&[
            BlobBox::new(100, 120, 130, 150),
            BlobBox::new(132, 104, 144, 124),
            BlobBox::new(600, 500, 630, 530),
        ]);
        segment(&mut grid, &mut extractor(true));

        let x_seg = grid.blob(BlobId(0)).merge_data().and_then(|m| m.segment).unwrap();
        assert_eq!(grid.blob(BlobId(1)).merge_data().and_then(|m| m.segment), Some(x_seg));
        assert_eq!(grid.segment(x_seg).bbox, BlobBox::new(100, 104, 144, 150));

        let results = grid.segmentation_results("finder");
        assert_eq!(results.segments.len(), 2);
        assert_eq!(results.segments[1].bbox, BlobBox::new(600, 500, 630, 530));
    }

    #[test]
    fn adjacent_math_blobs_form_one_segment() {
        let mut grid = all_math(&[
            BlobBox::new(100, 100, 120, 130),
            BlobBox::new(124, 100, 144, 130),
            BlobBox::new(148, 100, 168, 130),
        ]);
        segment(&mut grid, &mut extractor(false));
        assert_eq!(grid.segments().len(), 1);
        assert_eq!(grid.segments()[0].bbox, BlobBox::new(100, 100, 168, 130));
        assert_eq!(grid.segments()[0].result_type, ResultType::Displayed);
    }

    #[test]
    fn operators_bridge_math_blobs() {
        // 15px gaps on both sides of "=", wider than plain blob adjacency.
        let mut grid = all_math(&[
            BlobBox::new(100, 100, 120, 130),
            BlobBox::new(135, 112, 145, 118),
            BlobBox::new(160, 100, 180, 130),
        ]);
        grid.blob_mut(BlobId(1)).is_math = false;
        attach_word(&mut grid, BlobId(1), "=", false);
        segment(&mut grid, &mut extractor(false));
        assert_eq!(grid.segments().len(), 1);
        assert_eq!(grid.segments()[0].bbox, BlobBox::new(100, 100, 180, 130));
    }

    #[test]
    fn non_math_neighbors_stay_out() {
        let mut grid = all_math(&[
            BlobBox::new(100, 100, 120, 130),
            BlobBox::new(124, 100, 144, 130),
        ]);
        grid.blob_mut(BlobId(1)).is_math = false;
        segment(&mut grid, &mut extractor(false));
        assert_eq!(grid.segments().len(), 1);
        assert_eq!(grid.segments()[0].bbox, BlobBox::new(100, 100, 120, 130));
    }

    #[test]
    fn sparse_math_in_prose_word_is_dropped() {
        let mut grid = all_math(&[BlobBox::new(100, 100, 120, 130)]);
        attach_word(&mut grid, BlobId(0), "the", true);
        grid.words[0].is_stopword = true;
        segment(&mut grid, &mut extractor(false));
        assert!(!grid.blob(BlobId(0)).is_math);
        assert!(grid.segments().is_empty());
    }

    #[test]
    fn segments_cover_their_members_and_never_shrink() {
        let boxes = [
            BlobBox::new(110, 50, 140, 80),
            BlobBox::new(100, 90, 150, 95),
            BlobBox::new(110, 100, 140, 130),
            BlobBox::new(154, 100, 174, 130),
            BlobBox::new(400, 400, 420, 430),
        ];
        let mut grid = all_math(&boxes);
        let mut extractor = extractor(true);
        segment(&mut grid, &mut extractor);

        for id in grid.ids() {
            let m = grid.blob(id).merge_data().unwrap();
            let seg = m.segment.unwrap();
            assert!(grid.segment(seg).bbox.contains(&grid.bbox(id)));
            assert!(m.processed_seg_area <= grid.segment(seg).bbox.area());
        }
        let areas: Vec<i64> = grid.segments().iter().map(|s| s.bbox.area()).collect();

        // A second run over the same page reaches the same fixed point.
        segment(&mut grid, &mut extractor);
        let again: Vec<i64> = grid.segments().iter().map(|s| s.bbox.area()).collect();
        assert_eq!(areas, again);
    }

    #[test]
    fn missing_prerequisite_extractor_is_a_config_error() {
        let registry = ExtractorRegistry::new(&TrainingPaths::new(PathBuf::from("training")));
        let extractor = MathExpressionFeatureExtractor::from_selections(
            &registry,
            &[ExtractorSelection::new(
                "Geometric.NumVerticallyStackedBlobsFeatureExtractor",
                &[],
            )],
        )
        .unwrap();
        let err = HeuristicMerge::new(&extractor).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingExtractor { .. })
        ));
    }
}
