use crate::core::geometry::Direction;
use crate::grid::{BlobId, SegmentId};

/// Segmentation bookkeeping attached to a blob the first time the segmentor
/// touches it.
#[derive(Debug, Clone, Default)]
pub struct BlobMergeData {
    pub is_processed: bool,
    /// Area of the owning segment when this blob was last processed.
    pub processed_seg_area: i64,
    /// Segment this blob was merged into; also indexes the segment's box
    /// in the grid.
    pub segment: Option<SegmentId>,
    pub left: Vec<BlobId>,
    pub right: Vec<BlobId>,
    pub up: Vec<BlobId>,
    pub down: Vec<BlobId>,
    pub intersecting: Vec<BlobId>,
}

impl BlobMergeData {
    pub fn list(&self, dir: Direction) -> &[BlobId] {
        match dir {
            Direction::Left => &self.left,
            Direction::Right => &self.right,
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    pub fn list_mut(&mut self, dir: Direction) -> &mut Vec<BlobId> {
        match dir {
            Direction::Left => &mut self.left,
            Direction::Right => &mut self.right,
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
        }
    }

    pub fn push_unique(list: &mut Vec<BlobId>, id: BlobId) {
        if !list.contains(&id) {
            list.push(id);
        }
    }
}
