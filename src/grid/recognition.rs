use serde::{Deserialize, Serialize};

use crate::core::geometry::BlobBox;
use crate::grid::BlobId;

/// Row baseline as `y = slope * x + intercept` in image coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Baseline {
    pub slope: f64,
    pub intercept: f64,
}

impl Baseline {
    pub fn y_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone)]
pub struct CharData {
    pub text: String,
    pub bbox: BlobBox,
    pub confidence: f64,
    pub word: Option<usize>,
    pub blobs: Vec<BlobId>,
    pub is_leftmost_in_word: bool,
    /// Distance of the char's bottom above its row baseline, filled in by
    /// the recognition extractor.
    pub distance_above_baseline: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct WordData {
    pub text: String,
    /// Recognizer certainty for the word's best choice.
    pub certainty: f64,
    /// Word was found in the recognizer's dictionary.
    pub is_valid: bool,
    pub is_italic: bool,
    pub row: Option<usize>,
    pub sentence: Option<usize>,
    pub chars: Vec<usize>,
    pub is_math_word: bool,
    pub is_stopword: bool,
}

impl WordData {
    pub fn is_operator(&self) -> bool {
        matches!(self.text.as_str(), ">" | "<" | "=" | "+" | "-")
    }
}

#[derive(Debug, Clone)]
pub struct RowData {
    pub bbox: BlobBox,
    pub baseline: Baseline,
    pub is_normal: bool,
    pub words: Vec<usize>,
    pub num_valid_words: usize,
    pub avg_baseline_dist: f64,
}

impl RowData {
    pub fn has_valid_word(&self) -> bool {
        self.num_valid_words > 0
    }
}

#[derive(Debug, Clone)]
pub struct SentenceData {
    pub text: String,
    /// Uni-, bi- and tri-gram features, filled in by the n-gram extractor.
    pub ngram_features: Option<[f64; 3]>,
}
