pub mod blob;
pub mod merge;
pub mod recognition;

use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::geometry::{BlobBox, Direction};
use crate::core::model::{MathExpressionFinderResults, ResultType, RunMode, Segmentation};
use crate::export::overlay;

pub use blob::BlobData;
pub use merge::BlobMergeData;
pub use recognition::{Baseline, CharData, RowData, SentenceData, WordData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentBox {
    pub bbox: BlobBox,
    pub result_type: ResultType,
}

/// All blobs of one page plus their recognition linkage. Blobs live in an
/// arena in reading order and are addressed by [`BlobId`].
#[derive(Debug, Clone)]
pub struct BlobDataGrid {
    name: String,
    image: Option<PathBuf>,
    width: u32,
    height: u32,
    blobs: Vec<BlobData>,
    pub chars: Vec<CharData>,
    pub words: Vec<WordData>,
    pub rows: Vec<RowData>,
    pub sentences: Vec<SentenceData>,
    segments: Vec<SegmentBox>,
    pub non_italic_ratio: Option<f64>,
}

impl BlobDataGrid {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            image: None,
            width,
            height,
            blobs: Vec::new(),
            chars: Vec::new(),
            words: Vec::new(),
            rows: Vec::new(),
            sentences: Vec::new(),
            segments: Vec::new(),
            non_italic_ratio: None,
        }
    }

    pub fn with_image(mut self, image: Option<PathBuf>) -> Self {
        self.image = image;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn push_blob(&mut self, blob: BlobData) -> BlobId {
        self.blobs.push(blob);
        BlobId(self.blobs.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Full search, in reading order.
    pub fn ids(&self) -> impl Iterator<Item = BlobId> {
        (0..self.blobs.len()).map(BlobId)
    }

    pub fn blob(&self, id: BlobId) -> &BlobData {
        &self.blobs[id.0]
    }

    pub fn blob_mut(&mut self, id: BlobId) -> &mut BlobData {
        &mut self.blobs[id.0]
    }

    pub fn bbox(&self, id: BlobId) -> BlobBox {
        self.blobs[id.0].bbox
    }

    /// Blobs whose boxes intersect `rect`.
    pub fn rect_search(&self, rect: &BlobBox) -> Vec<BlobId> {
        self.ids()
            .filter(|id| self.bbox(*id).intersects(rect))
            .collect()
    }

    /// Blobs overlapping the horizontal band `[top, bottom]` that reach past
    /// `x` in `dir`, nearest first.
    pub fn side_search(&self, x: i32, top: i32, bottom: i32, dir: Direction) -> Vec<BlobId> {
        debug_assert!(dir.is_horizontal());
        self.directional_search(x, top, bottom, dir)
    }

    /// Blobs overlapping the vertical band `[left, right]` that reach past
    /// `y` in `dir`, nearest first.
    pub fn vertical_search(&self, left: i32, right: i32, y: i32, dir: Direction) -> Vec<BlobId> {
        debug_assert!(!dir.is_horizontal());
        self.directional_search(y, left, right, dir)
    }

    fn directional_search(&self, edge: i32, lo: i32, hi: i32, dir: Direction) -> Vec<BlobId> {
        let mut found: Vec<BlobId> = self
            .ids()
            .filter(|id| {
                let b = self.bbox(*id);
                match dir {
                    Direction::Right => b.right >= edge && b.top <= hi && b.bottom >= lo,
                    Direction::Left => b.left <= edge && b.top <= hi && b.bottom >= lo,
                    Direction::Up => b.top <= edge && b.left <= hi && b.right >= lo,
                    Direction::Down => b.bottom >= edge && b.left <= hi && b.right >= lo,
                }
            })
            .collect();
        match dir {
            Direction::Right => found.sort_by_key(|id| (self.bbox(*id).left, self.bbox(*id).top, *id)),
            Direction::Left => {
                found.sort_by_key(|id| (Reverse(self.bbox(*id).right), self.bbox(*id).top, *id))
            }
            Direction::Up => {
                found.sort_by_key(|id| (Reverse(self.bbox(*id).bottom), self.bbox(*id).left, *id))
            }
            Direction::Down => found.sort_by_key(|id| (self.bbox(*id).top, self.bbox(*id).left, *id)),
        }
        found
    }

    pub fn parent_char(&self, id: BlobId) -> Option<&CharData> {
        self.blob(id).char_id.and_then(|c| self.chars.get(c))
    }

    pub fn parent_word_index(&self, id: BlobId) -> Option<usize> {
        self.parent_char(id).and_then(|c| c.word)
    }

    pub fn parent_word(&self, id: BlobId) -> Option<&WordData> {
        self.parent_word_index(id).and_then(|w| self.words.get(w))
    }

    pub fn parent_row_index(&self, id: BlobId) -> Option<usize> {
        self.parent_word(id).and_then(|w| w.row)
    }

    pub fn parent_row(&self, id: BlobId) -> Option<&RowData> {
        self.parent_row_index(id).and_then(|r| self.rows.get(r))
    }

    pub fn parent_sentence(&self, id: BlobId) -> Option<&SentenceData> {
        self.parent_word(id)
            .and_then(|w| w.sentence)
            .and_then(|s| self.sentences.get(s))
    }

    pub fn belongs_to_recognized_word(&self, id: BlobId) -> bool {
        self.parent_word(id).map_or(false, |w| w.is_valid)
    }

    pub fn belongs_to_recognized_math_word(&self, id: BlobId) -> bool {
        self.parent_word(id).map_or(false, |w| w.is_math_word)
    }

    pub fn belongs_to_recognized_stopword(&self, id: BlobId) -> bool {
        self.parent_word(id).map_or(false, |w| w.is_stopword)
    }

    pub fn belongs_to_recognized_normal_row(&self, id: BlobId) -> bool {
        self.parent_row(id).map_or(false, |r| r.is_normal)
    }

    pub fn char_confidence(&self, id: BlobId) -> f64 {
        self.parent_char(id).map_or(0.0, |c| c.confidence)
    }

    pub fn is_operator(&self, id: BlobId) -> bool {
        self.parent_word(id).map_or(false, |w| w.is_operator())
    }

    /// Every blob under every char of the given word.
    pub fn blobs_in_word(&self, word: usize) -> Vec<BlobId> {
        self.words
            .get(word)
            .map(|w| {
                w.chars
                    .iter()
                    .filter_map(|c| self.chars.get(*c))
                    .flat_map(|c| c.blobs.iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn segments(&self) -> &[SegmentBox] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> &SegmentBox {
        &self.segments[id.0]
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> &mut SegmentBox {
        &mut self.segments[id.0]
    }

    pub fn add_segment(&mut self, bbox: BlobBox, result_type: ResultType) -> SegmentId {
        self.segments.push(SegmentBox { bbox, result_type });
        SegmentId(self.segments.len() - 1)
    }

    /// Forgets every segment and all per-blob merge bookkeeping.
    pub fn clear_segments(&mut self) {
        self.segments.clear();
        for blob in &mut self.blobs {
            blob.clear_merge_data();
        }
    }

    fn result_type_for(&self, id: BlobId) -> ResultType {
        if self.belongs_to_recognized_normal_row(id) {
            ResultType::Embedded
        } else {
            ResultType::Displayed
        }
    }

    /// Math-labelled blobs as unmerged segments.
    pub fn detection_segments(&self) -> Vec<Segmentation> {
        self.ids()
            .filter(|id| self.blob(*id).is_math)
            .map(|id| Segmentation::new(self.bbox(id), self.result_type_for(id)))
            .collect()
    }

    pub fn detection_results(&self, results_dir_name: &str) -> MathExpressionFinderResults {
        self.build_results(self.detection_segments(), results_dir_name, RunMode::Detect)
    }

    pub fn segmentation_results(&self, results_dir_name: &str) -> MathExpressionFinderResults {
        let segments = self
            .segments
            .iter()
            .map(|s| Segmentation::new(s.bbox, s.result_type))
            .collect();
        self.build_results(segments, results_dir_name, RunMode::Find)
    }

    fn build_results(
        &self,
        segments: Vec<Segmentation>,
        results_dir_name: &str,
        run_mode: RunMode,
    ) -> MathExpressionFinderResults {
        let visual_display = self.image.as_ref().and_then(|path| {
            match overlay::render_overlay(path, &segments) {
                Ok(img) => Some(img),
                Err(err) => {
                    tracing::warn!(page = %self.name, "no overlay rendered: {err:#}");
                    None
                }
            }
        });
        MathExpressionFinderResults::new(
            segments,
            visual_display,
            self.name.clone(),
            results_dir_name.to_string(),
            run_mode,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grid_with(boxes: &[[i32; 4]]) -> BlobDataGrid {
        let mut grid = BlobDataGrid::new("test", 500, 500);
        for b in boxes {
            grid.push_blob(BlobData::new(BlobBox::from_array(*b), None));
        }
        grid
    }

    #[test]
    fn side_search_orders_nearest_first() {
        let grid = grid_with(&[[0, 0, 10, 10], [40, 0, 50, 10], [20, 2, 30, 8], [20, 50, 30, 60]]);
        let right = grid.side_search(10, 0, 10, Direction::Right);
        assert_eq!(right, vec![BlobId(0), BlobId(2), BlobId(1)]);
        let left = grid.side_search(40, 0, 10, Direction::Left);
        assert_eq!(left, vec![BlobId(1), BlobId(2), BlobId(0)]);
    }

    #[test]
    fn vertical_search_orders_nearest_first() {
        let grid = grid_with(&[[0, 100, 10, 110], [0, 50, 10, 60], [2, 80, 8, 90], [100, 80, 110, 90]]);
        let up = grid.vertical_search(0, 10, 100, Direction::Up);
        assert_eq!(up, vec![BlobId(0), BlobId(2), BlobId(1)]);
        let down = grid.vertical_search(0, 10, 50, Direction::Down);
        assert_eq!(down, vec![BlobId(1), BlobId(2), BlobId(0)]);
    }

    #[test]
    fn rect_search_finds_intersections() {
        let grid = grid_with(&[[0, 0, 10, 10], [5, 5, 15, 15], [30, 30, 40, 40]]);
        assert_eq!(grid.rect_search(&BlobBox::new(8, 8, 20, 20)), vec![BlobId(0), BlobId(1)]);
    }

    #[test]
    fn detection_segments_follow_row_normality() {
        let mut grid = grid_with(&[[0, 0, 10, 10], [20, 0, 30, 10]]);
        grid.blob_mut(BlobId(1)).is_math = true;
        let segs = grid.detection_segments();
        assert_eq!(segs, vec![Segmentation::new(BlobBox::new(20, 0, 30, 10), ResultType::Displayed)]);
    }
}
