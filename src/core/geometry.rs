use serde::{Deserialize, Serialize};

/// Axis-aligned box in image coordinates (y grows downward). Width is
/// `right - left` and height is `bottom - top`, so a box with
/// `left == right` has no area. Boxes sharing an edge count as overlapping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BlobBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_array(coords: [i32; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn center_x(&self) -> i32 {
        (self.left + self.right) / 2
    }

    pub fn center_y(&self) -> i32 {
        (self.top + self.bottom) / 2
    }

    pub fn contains(&self, other: &Self) -> bool {
        other.left >= self.left
            && other.right <= self.right
            && other.top >= self.top
            && other.bottom <= self.bottom
    }

    pub fn overlaps_x(&self, other: &Self) -> bool {
        self.left <= other.right && other.left <= self.right
    }

    pub fn overlaps_y(&self, other: &Self) -> bool {
        self.top <= other.bottom && other.top <= self.bottom
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.overlaps_x(other) && self.overlaps_y(other)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Gap from this box's edge facing `dir` to the opposite edge of
    /// `other`. Negative when the boxes overlap along that axis.
    pub fn gap_to(&self, other: &Self, dir: Direction) -> i32 {
        match dir {
            Direction::Right => other.left - self.right,
            Direction::Left => self.left - other.right,
            Direction::Up => self.top - other.bottom,
            Direction::Down => other.top - self.bottom,
        }
    }

    /// True when `other` lies strictly past this box's edge facing `dir`.
    pub fn is_beyond(&self, other: &Self, dir: Direction) -> bool {
        match dir {
            Direction::Right => other.left > self.right,
            Direction::Left => other.right < self.left,
            Direction::Up => other.bottom < self.top,
            Direction::Down => other.top > self.bottom,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Left => "leftward",
            Direction::Right => "rightward",
            Direction::Up => "upward",
            Direction::Down => "downward",
        }
    }
}

/// Maps a non-negative count or ratio onto `[0, 1)`.
pub fn exp_normalize(value: f64) -> f64 {
    1.0 - (-value).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn union_covers_both_boxes() {
        let a = BlobBox::new(100, 120, 130, 150);
        let b = BlobBox::new(132, 104, 144, 124);
        let u = a.union(&b);
        assert_eq!(u, BlobBox::new(100, 104, 144, 150));
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert_eq!(u.area(), 44 * 46);
    }

    #[test]
    fn extent_is_edge_difference() {
        let b = BlobBox::new(10, 20, 40, 30);
        assert_eq!((b.width(), b.height(), b.area()), (30, 10, 300));
        let line = BlobBox::new(10, 20, 10, 30);
        assert_eq!(line.area(), 0);
        assert!(b.overlaps_x(&BlobBox::new(40, 0, 50, 5)));
    }

    #[test]
    fn gaps_follow_image_coordinates() {
        let b = BlobBox::new(100, 100, 150, 150);
        let right = BlobBox::new(160, 110, 180, 130);
        let above = BlobBox::new(110, 60, 140, 90);
        assert_eq!(b.gap_to(&right, Direction::Right), 10);
        assert_eq!(b.gap_to(&above, Direction::Up), 10);
        assert!(b.is_beyond(&right, Direction::Right));
        assert!(!b.is_beyond(&right, Direction::Left));
        assert!(b.is_beyond(&above, Direction::Up));
    }

    #[test]
    fn exp_normalize_is_bounded() {
        assert_eq!(exp_normalize(0.0), 0.0);
        assert!(exp_normalize(1.0) > 0.63 && exp_normalize(1.0) < 0.64);
        assert!(exp_normalize(50.0) <= 1.0);
    }
}
