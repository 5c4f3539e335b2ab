use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::core::geometry::exp_normalize;
use crate::features::description::{DoubleFeature, EnabledFlags, FlagDescription};
use crate::features::stopwords::{normalize_word, read_word_list, StopwordHelper};
use crate::features::BlobFeatureExtractor;
use crate::grid::{BlobDataGrid, BlobId, CharData, RowData};

pub const SHORT_NAME: &str = "OtherRecognitionFeatureExtractor";
pub const DESCRIPTION: &str = "Assorted features derived from OCR recognition results";

pub const VDARB: FlagDescription = FlagDescription::new(
    "vdarb",
    "Vertical distance above the row baseline, relative to the row's average",
);
pub const HEIGHT: FlagDescription =
    FlagDescription::new("height", "Blob height relative to the page's normal text height");
pub const WIDTH_HEIGHT: FlagDescription = FlagDescription::new(
    "widthHeight",
    "Width to height ratio relative to the page's normal text",
);
pub const IS_OCR_MATH: FlagDescription =
    FlagDescription::new("isOcrMath", "The blob's word is a known math word");
pub const IS_ITALIC: FlagDescription =
    FlagDescription::new("isItalic", "The blob's word is italic, weighted by page italic rarity");
pub const CONFIDENCE: FlagDescription =
    FlagDescription::new("confidence", "Character recognition confidence relative to average");
pub const IS_OCR_VALID: FlagDescription =
    FlagDescription::new("isOcrValid", "The blob belongs to a valid dictionary word");
pub const IS_ON_VALID_OCR_ROW: FlagDescription =
    FlagDescription::new("isOnValidOcrRow", "The blob's row has at least one valid word");
pub const IS_ON_BAD_PAGE: FlagDescription =
    FlagDescription::new("isOnBadPage", "The page has no valid words on normal rows");
pub const IS_IN_OCR_STOPWORD: FlagDescription =
    FlagDescription::new("isInOcrStopword", "The blob's word is a stopword");

pub const FLAGS: &[FlagDescription] = &[
    VDARB,
    HEIGHT,
    WIDTH_HEIGHT,
    IS_OCR_MATH,
    IS_ITALIC,
    CONFIDENCE,
    IS_OCR_VALID,
    IS_ON_VALID_OCR_ROW,
    IS_ON_BAD_PAGE,
    IS_IN_OCR_STOPWORD,
];

/// Page-wide statistics gathered during preprocessing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PageStats {
    pub avg_height: f64,
    pub avg_whr: f64,
    pub bad_page: bool,
    pub avg_confidence: Option<f64>,
}

/// Distance of a char's bottom above its row baseline. Chars hanging below
/// the baseline count as zero unless they lie entirely beneath it.
pub fn baseline_distance(ch: &CharData, row: &RowData) -> f64 {
    let baseline_y = row.baseline.y_at(ch.bbox.center_x() as f64);
    let dist = baseline_y - ch.bbox.bottom as f64;
    if dist >= 0.0 {
        dist
    } else if ch.bbox.top as f64 > baseline_y {
        -dist
    } else {
        0.0
    }
}

fn whr(bbox: &crate::core::geometry::BlobBox) -> f64 {
    bbox.width() as f64 / bbox.height().max(1) as f64
}

fn binary(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug)]
pub struct OtherRecognitionExtractor {
    enabled: EnabledFlags,
    stopwords: Arc<StopwordHelper>,
    mathwords_path: PathBuf,
    mathwords: Option<HashSet<String>>,
    stats: PageStats,
}

impl OtherRecognitionExtractor {
    pub fn new(enabled: EnabledFlags, stopwords: Arc<StopwordHelper>, mathwords_path: PathBuf) -> Self {
        Self {
            enabled,
            stopwords,
            mathwords_path,
            mathwords: None,
            stats: PageStats::default(),
        }
    }

    pub fn with_mathwords<'a>(mut self, words: impl IntoIterator<Item = &'a str>) -> Self {
        self.mathwords = Some(words.into_iter().map(normalize_word).collect());
        self
    }

    pub fn stats(&self) -> PageStats {
        self.stats
    }

    fn gather_stats(grid: &BlobDataGrid) -> PageStats {
        let normal: Vec<BlobId> = grid
            .ids()
            .filter(|id| {
                grid.belongs_to_recognized_word(*id) && grid.belongs_to_recognized_normal_row(*id)
            })
            .collect();
        let mut stats = PageStats::default();
        if normal.is_empty() {
            stats.bad_page = true;
        } else {
            let n = normal.len() as f64;
            stats.avg_height = normal.iter().map(|id| grid.bbox(*id).height() as f64).sum::<f64>() / n;
            stats.avg_whr = normal.iter().map(|id| whr(&grid.bbox(*id))).sum::<f64>() / n;
        }

        let confidences: Vec<f64> = grid
            .ids()
            .filter(|id| grid.belongs_to_recognized_word(*id))
            .map(|id| grid.char_confidence(id))
            .collect();
        if !confidences.is_empty() {
            stats.avg_confidence = Some(confidences.iter().sum::<f64>() / confidences.len() as f64);
        }
        stats
    }

    fn mark_baselines(grid: &mut BlobDataGrid) {
        for row_idx in 0..grid.rows.len() {
            let mut total = 0.0;
            let mut count = 0usize;
            let word_ids = grid.rows[row_idx].words.clone();
            for word_idx in word_ids {
                let valid = grid.words[word_idx].is_valid;
                for char_idx in grid.words[word_idx].chars.clone() {
                    let dist = baseline_distance(&grid.chars[char_idx], &grid.rows[row_idx]);
                    grid.chars[char_idx].distance_above_baseline = Some(dist);
                    if valid {
                        total += dist;
                        count += 1;
                    }
                }
            }
            grid.rows[row_idx].avg_baseline_dist = if count == 0 { 0.0 } else { total / count as f64 };
        }
    }

    fn vdarb(grid: &BlobDataGrid, blob: BlobId) -> f64 {
        let (Some(row), Some(ch)) = (grid.parent_row(blob), grid.parent_char(blob)) else {
            return 0.0;
        };
        if !row.has_valid_word() {
            return 0.0;
        }
        let dist = ch
            .distance_above_baseline
            .unwrap_or_else(|| baseline_distance(ch, row));
        let vdarb = dist - row.avg_baseline_dist;
        if vdarb < 0.0 {
            return 0.0;
        }
        exp_normalize(vdarb / row.bbox.height().max(1) as f64)
    }

    fn value(&self, flag: &FlagDescription, grid: &BlobDataGrid, blob: BlobId) -> f64 {
        let bbox = grid.bbox(blob);
        let word = grid.parent_word(blob);
        match flag.name {
            "vdarb" => Self::vdarb(grid, blob),
            "height" => {
                let h = bbox.height() as f64;
                if self.stats.bad_page {
                    exp_normalize(h)
                } else {
                    exp_normalize(h / self.stats.avg_height)
                }
            }
            "widthHeight" => {
                let ratio = whr(&bbox);
                if self.stats.bad_page {
                    exp_normalize(ratio)
                } else {
                    exp_normalize(ratio / self.stats.avg_whr)
                }
            }
            "isOcrMath" => binary(word.is_some_and(|w| w.is_math_word)),
            "isItalic" => {
                if word.is_some_and(|w| w.is_italic) {
                    grid.non_italic_ratio.unwrap_or(0.0)
                } else {
                    0.0
                }
            }
            "confidence" => match self.stats.avg_confidence {
                Some(avg) if avg > 0.0 => {
                    exp_normalize(grid.char_confidence(blob).min(avg) / avg)
                }
                _ => 0.0,
            },
            "isOcrValid" => binary(word.is_some_and(|w| w.is_valid)),
            "isOnValidOcrRow" => binary(grid.parent_row(blob).is_some_and(RowData::has_valid_word)),
            "isOnBadPage" => binary(self.stats.bad_page),
            _ => binary(word.is_some_and(|w| w.is_stopword)),
        }
    }
}

impl BlobFeatureExtractor for OtherRecognitionExtractor {
    fn enabled_flags(&self) -> &EnabledFlags {
        &self.enabled
    }

    fn do_trainer_initialization(&mut self) -> Result<()> {
        self.stopwords.load()?;
        if self.mathwords.is_none() {
            let words = read_word_list(&self.mathwords_path)?;
            tracing::debug!(count = words.len(), "loaded math words");
            self.mathwords = Some(words);
        }
        Ok(())
    }

    fn preprocess(&mut self, grid: &mut BlobDataGrid) -> Result<()> {
        let Some(mathwords) = &self.mathwords else {
            bail!("{} used before initialization", self.enabled.unique_name);
        };
        self.stats = Self::gather_stats(grid);
        if self.stats.bad_page {
            tracing::info!(page = grid.name(), "no valid words on normal rows");
        }

        Self::mark_baselines(grid);

        for word in &mut grid.words {
            let normalized = normalize_word(&word.text);
            word.is_math_word = mathwords.contains(&normalized);
            word.is_stopword = self.stopwords.is_stopword(&word.text);
        }

        if !grid.is_empty() {
            let non_italic = grid
                .ids()
                .filter(|id| !grid.parent_word(*id).is_some_and(|w| w.is_italic))
                .count();
            grid.non_italic_ratio = Some(non_italic as f64 / grid.len() as f64);
        }
        Ok(())
    }

    fn extract_features(&self, grid: &BlobDataGrid, blob: BlobId) -> Vec<DoubleFeature> {
        FLAGS
            .iter()
            .filter(|f| self.enabled.is_enabled(f))
            .map(|f| self.enabled.feature(self.value(f, grid, blob), Some(f)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BlobBox;
    use crate::grid::{Baseline, BlobData, WordData};
    use pretty_assertions::assert_eq;

    fn word(text: &str, valid: bool, italic: bool, chars: Vec<usize>) -> WordData {
        WordData {
            text: text.to_string(),
            certainty: 8.0,
            is_valid: valid,
            is_italic: italic,
            row: Some(0),
            sentence: None,
            chars,
            is_math_word: false,
            is_stopword: false,
        }
    }

    fn ch(text: &str, bbox: BlobBox, word: usize, blob: usize) -> CharData {
        CharData {
            text: text.to_string(),
            bbox,
            confidence: 80.0,
            word: Some(word),
            blobs: vec![BlobId(blob)],
            is_leftmost_in_word: true,
            distance_above_baseline: None,
        }
    }

    /// "the" (valid, three blobs) and an italic "x" on one normal row with
    /// its baseline at y = 120.
    fn page() -> BlobDataGrid {
        let mut grid = BlobDataGrid::new("rec", 400, 400);
        let boxes = [
            BlobBox::new(10, 100, 20, 120),
            BlobBox::new(22, 100, 32, 120),
            BlobBox::new(34, 100, 44, 120),
            BlobBox::new(60, 90, 70, 110),
        ];
        for (i, b) in boxes.iter().enumerate() {
            grid.push_blob(BlobData::new(*b, Some(i)));
        }
        for (i, b) in boxes.iter().enumerate().take(3) {
            grid.chars.push(ch("t", *b, 0, i));
        }
        grid.chars.push(ch("x", boxes[3], 1, 3));
        grid.words.push(word("the", true, false, vec![0, 1, 2]));
        grid.words.push(word("x", false, true, vec![3]));
        grid.rows.push(RowData {
            bbox: BlobBox::new(10, 90, 70, 120),
            baseline: Baseline {
                slope: 0.0,
                intercept: 120.0,
            },
            is_normal: true,
            words: vec![0, 1],
            num_valid_words: 1,
            avg_baseline_dist: 0.0,
        });
        grid
    }

    fn extractor(flags: Vec<&'static str>) -> OtherRecognitionExtractor {
        let mut e = OtherRecognitionExtractor::new(
            EnabledFlags::new("Recognition.OtherRecognitionFeatureExtractor".to_string(), flags),
            Arc::new(StopwordHelper::from_words(["the"])),
            PathBuf::new(),
        )
        .with_mathwords(["sin"]);
        e.do_finder_initialization().unwrap();
        e
    }

    #[test]
    fn raised_blob_gets_positive_vdarb() {
        let mut grid = page();
        let mut e = extractor(vec![VDARB.name]);
        e.preprocess(&mut grid).unwrap();
        assert_eq!(e.extract_features(&grid, BlobId(0))[0].value, 0.0);
        let expected = exp_normalize(10.0 / 30.0);
        assert_eq!(e.extract_features(&grid, BlobId(3))[0].value, expected);
    }

    #[test]
    fn flags_come_out_in_registration_order() {
        let mut grid = page();
        let mut e = extractor(vec![IS_IN_OCR_STOPWORD.name, HEIGHT.name, IS_OCR_VALID.name]);
        e.preprocess(&mut grid).unwrap();
        let features = e.extract_features(&grid, BlobId(0));
        let names: Vec<_> = features.iter().map(|f| f.flag.clone().unwrap()).collect();
        assert_eq!(names, vec!["height", "isOcrValid", "isInOcrStopword"]);
        assert_eq!(features[0].value, exp_normalize(1.0));
        assert_eq!(features[1].value, 1.0);
        assert_eq!(features[2].value, 1.0);
    }

    #[test]
    fn italic_is_weighted_by_non_italic_ratio() {
        let mut grid = page();
        let mut e = extractor(vec![IS_ITALIC.name]);
        e.preprocess(&mut grid).unwrap();
        assert_eq!(grid.non_italic_ratio, Some(0.75));
        assert_eq!(e.extract_features(&grid, BlobId(3))[0].value, 0.75);
        assert_eq!(e.extract_features(&grid, BlobId(0))[0].value, 0.0);
    }

    #[test]
    fn page_without_valid_words_is_bad() {
        let mut grid = page();
        grid.words[0].is_valid = false;
        grid.rows[0].num_valid_words = 0;
        let mut e = extractor(vec![IS_ON_BAD_PAGE.name, CONFIDENCE.name]);
        e.preprocess(&mut grid).unwrap();
        assert!(e.stats().bad_page);
        let values: Vec<f64> = e.extract_features(&grid, BlobId(1)).iter().map(|f| f.value).collect();
        assert_eq!(values, vec![0.0, 1.0]);
    }
}
