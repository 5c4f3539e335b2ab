use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::core::geometry::BlobBox;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Displayed,
    Embedded,
    Label,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultType::Displayed => "displayed",
            ResultType::Embedded => "embedded",
            ResultType::Label => "label",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Detect,
    Find,
}

/// One finished math-expression region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segmentation {
    pub bbox: BlobBox,
    #[serde(rename = "type")]
    pub result_type: ResultType,
}

impl Segmentation {
    pub fn new(bbox: BlobBox, result_type: ResultType) -> Self {
        Self { bbox, result_type }
    }
}

/// Everything produced for a single page image.
#[derive(Debug, Clone)]
pub struct MathExpressionFinderResults {
    pub visual_display: Option<RgbImage>,
    pub segments: Vec<Segmentation>,
    pub results_name: String,
    pub results_dir_name: String,
    pub run_mode: RunMode,
}

impl MathExpressionFinderResults {
    pub fn new(
        segments: Vec<Segmentation>,
        visual_display: Option<RgbImage>,
        results_name: String,
        results_dir_name: String,
        run_mode: RunMode,
    ) -> Self {
        let mut results = Self {
            visual_display,
            segments,
            results_name,
            results_dir_name,
            run_mode,
        };
        results.ensure_no_duplicates();
        results
    }

    pub fn empty(results_name: String, results_dir_name: String, run_mode: RunMode) -> Self {
        Self::new(Vec::new(), None, results_name, results_dir_name, run_mode)
    }

    /// Drops every entry whose box repeats an earlier entry's box.
    pub fn ensure_no_duplicates(&mut self) {
        let mut kept: Vec<Segmentation> = Vec::with_capacity(self.segments.len());
        for seg in self.segments.drain(..) {
            if kept.iter().any(|k| k.bbox == seg.bbox) {
                tracing::warn!(
                    page = %self.results_name,
                    "dropping duplicate result box {:?}",
                    seg.bbox
                );
                continue;
            }
            kept.push(seg);
        }
        self.segments = kept;
    }

    pub fn to_record(&self) -> ResultsRecord {
        ResultsRecord {
            results_name: self.results_name.clone(),
            results_dir_name: self.results_dir_name.clone(),
            run_mode: self.run_mode,
            segments: self.segments.clone(),
        }
    }
}

/// Serializable view of a page's results (the overlay image is written separately).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsRecord {
    pub results_name: String,
    pub results_dir_name: String,
    pub run_mode: RunMode,
    pub segments: Vec<Segmentation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicates_are_removed_keeping_first() {
        let a = BlobBox::new(0, 0, 10, 10);
        let b = BlobBox::new(20, 0, 30, 10);
        let results = MathExpressionFinderResults::new(
            vec![
                Segmentation::new(a, ResultType::Embedded),
                Segmentation::new(b, ResultType::Displayed),
                Segmentation::new(a, ResultType::Embedded),
                Segmentation::new(a, ResultType::Displayed),
            ],
            None,
            "page".to_string(),
            "finder".to_string(),
            RunMode::Find,
        );
        assert_eq!(
            results.segments,
            vec![
                Segmentation::new(a, ResultType::Embedded),
                Segmentation::new(b, ResultType::Displayed),
            ]
        );
    }

    #[test]
    fn result_type_serializes_lowercase() {
        let seg = Segmentation::new(BlobBox::new(1, 2, 3, 4), ResultType::Label);
        let json = serde_json::to_string(&seg).unwrap();
        assert!(json.contains("\"type\":\"label\""));
    }
}
