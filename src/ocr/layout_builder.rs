use anyhow::{bail, Result};

use crate::core::geometry::BlobBox;
use crate::grid::{Baseline, BlobData, BlobDataGrid, CharData, RowData, SentenceData, WordData};
use crate::ocr::bridge::PageInput;

/// Turns a page input into a linked blob grid.
#[derive(Debug, Clone, Default)]
pub struct GridBuilder;

fn check_index(what: &str, owner: usize, target: &str, idx: Option<usize>, len: usize) -> Result<()> {
    if let Some(i) = idx {
        if i >= len {
            bail!("{what} {owner} refers to {target} {i}, but the page has {len}");
        }
    }
    Ok(())
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

impl GridBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, input: PageInput) -> Result<BlobDataGrid> {
        Self::validate(&input)?;

        let mut grid = BlobDataGrid::new(input.name, input.width, input.height)
            .with_image(input.image);

        grid.sentences = input
            .sentences
            .into_iter()
            .map(|s| SentenceData {
                text: s.text,
                ngram_features: None,
            })
            .collect();

        let explicit_normality = input.rows.iter().any(|r| r.normal.is_some());
        grid.rows = input
            .rows
            .into_iter()
            .map(|r| {
                let bbox = BlobBox::from_array(r.bbox);
                let baseline = match r.baseline {
                    Some([slope, intercept]) => Baseline { slope, intercept },
                    None => Baseline {
                        slope: 0.0,
                        intercept: bbox.bottom as f64,
                    },
                };
                RowData {
                    bbox,
                    baseline,
                    is_normal: r.normal.unwrap_or(true),
                    words: Vec::new(),
                    num_valid_words: 0,
                    avg_baseline_dist: 0.0,
                }
            })
            .collect();

        for (idx, w) in input.words.into_iter().enumerate() {
            if let Some(row) = w.row {
                grid.rows[row].words.push(idx);
                if w.valid {
                    grid.rows[row].num_valid_words += 1;
                }
            }
            grid.words.push(WordData {
                text: w.text,
                certainty: w.certainty,
                is_valid: w.valid,
                is_italic: w.italic,
                row: w.row,
                sentence: w.sentence,
                chars: Vec::new(),
                is_math_word: false,
                is_stopword: false,
            });
        }

        for (idx, c) in input.chars.into_iter().enumerate() {
            if let Some(word) = c.word {
                grid.words[word].chars.push(idx);
            }
            grid.chars.push(CharData {
                text: c.text,
                bbox: BlobBox::from_array(c.bbox),
                confidence: c.confidence,
                word: c.word,
                blobs: Vec::new(),
                is_leftmost_in_word: false,
                distance_above_baseline: None,
            });
        }
        Self::mark_leftmost_chars(&mut grid);

        // Arena order is reading order.
        let mut blobs = input.blobs;
        blobs.sort_by_key(|b| (b.bbox[1], b.bbox[0]));
        for b in blobs {
            let mut blob = BlobData::new(BlobBox::from_array(b.bbox), b.char_idx);
            blob.is_math = b.math.unwrap_or(false);
            let id = grid.push_blob(blob);
            if let Some(c) = b.char_idx {
                grid.chars[c].blobs.push(id);
            }
        }

        if !explicit_normality {
            Self::classify_rows(&mut grid.rows);
        }
        tracing::debug!(
            page = grid.name(),
            blobs = grid.len(),
            rows = grid.rows.len(),
            "built blob grid"
        );
        Ok(grid)
    }

    fn validate(input: &PageInput) -> Result<()> {
        for (i, w) in input.words.iter().enumerate() {
            check_index("word", i, "row", w.row, input.rows.len())?;
            check_index("word", i, "sentence", w.sentence, input.sentences.len())?;
        }
        for (i, c) in input.chars.iter().enumerate() {
            check_index("char", i, "word", c.word, input.words.len())?;
        }
        for (i, b) in input.blobs.iter().enumerate() {
            check_index("blob", i, "char", b.char_idx, input.chars.len())?;
        }
        Ok(())
    }

    fn mark_leftmost_chars(grid: &mut BlobDataGrid) {
        for w in 0..grid.words.len() {
            let leftmost = grid.words[w]
                .chars
                .iter()
                .copied()
                .min_by_key(|c| (grid.chars[*c].bbox.left, *c));
            if let Some(c) = leftmost {
                grid.chars[c].is_leftmost_in_word = true;
            }
        }
    }

    /// Rows with far fewer valid words than average are abnormal (the top
    /// row is never judged). An abnormal row directly below a normal one is
    /// restored when its gap to that row is typical.
    pub fn classify_rows(rows: &mut [RowData]) {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by_key(|r| (rows[*r].bbox.top, *r));

        let counts: Vec<f64> = order
            .iter()
            .filter(|r| rows[**r].has_valid_word())
            .map(|r| rows[*r].num_valid_words as f64)
            .collect();
        if counts.is_empty() {
            return;
        }
        let (avg, std) = mean_and_std(&counts);
        for &r in order.iter().skip(1) {
            let v = rows[r].num_valid_words as f64;
            if v < avg && avg - v > std {
                rows[r].is_normal = false;
            }
        }

        let valid: Vec<usize> = order
            .iter()
            .copied()
            .filter(|r| rows[*r].has_valid_word())
            .collect();
        let gaps: Vec<f64> = valid
            .windows(2)
            .map(|p| (rows[p[1]].bbox.top - rows[p[0]].bbox.bottom) as f64)
            .collect();
        let (avg_gap, std_gap) = mean_and_std(&gaps);
        for i in 2..order.len() {
            let (prev, cur) = (order[i - 1], order[i]);
            let gap = (rows[cur].bbox.top - rows[prev].bbox.bottom) as f64;
            if gap - avg_gap < std_gap && rows[prev].is_normal && !rows[cur].is_normal {
                rows[cur].is_normal = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::BlobId;
    use pretty_assertions::assert_eq;

    fn row(top: i32, bottom: i32, valid: usize) -> RowData {
        RowData {
            bbox: BlobBox::new(0, top, 500, bottom),
            baseline: Baseline::default(),
            is_normal: true,
            words: Vec::new(),
            num_valid_words: valid,
            avg_baseline_dist: 0.0,
        }
    }

    fn normality(rows: &[RowData]) -> Vec<bool> {
        rows.iter().map(|r| r.is_normal).collect()
    }

    #[test]
    fn sparse_row_is_abnormal() {
        let mut rows = vec![row(0, 30, 5), row(40, 70, 5), row(80, 110, 5), row(120, 150, 1)];
        GridBuilder::classify_rows(&mut rows);
        assert_eq!(normality(&rows), vec![true, true, true, false]);
    }

    #[test]
    fn tightly_spaced_row_is_restored() {
        let mut rows = vec![row(0, 30, 5), row(40, 70, 5), row(72, 100, 1), row(130, 160, 5)];
        GridBuilder::classify_rows(&mut rows);
        assert_eq!(normality(&rows), vec![true, true, true, true]);
    }

    #[test]
    fn build_links_and_sorts() {
        let input = PageInput::from_json(
            r#"{
                "name": "page", "width": 300, "height": 200,
                "rows": [{"bbox": [0, 0, 300, 40], "baseline": [0.0, 35.0]}],
                "words": [{"text": "ab", "certainty": 6.0, "valid": true, "row": 0}],
                "chars": [
                    {"text": "b", "bbox": [30, 10, 50, 35], "word": 0},
                    {"text": "a", "bbox": [10, 10, 28, 35], "word": 0}
                ],
                "blobs": [
                    {"bbox": [30, 10, 50, 35], "char": 0},
                    {"bbox": [10, 10, 28, 35], "char": 1, "math": true},
                    {"bbox": [100, 150, 120, 170]}
                ]
            }"#,
        )
        .unwrap();
        let grid = GridBuilder::new().build(input).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.bbox(BlobId(0)), BlobBox::new(10, 10, 28, 35));
        assert!(grid.blob(BlobId(0)).is_math);
        assert_eq!(grid.chars[1].blobs, vec![BlobId(0)]);
        assert!(grid.chars[1].is_leftmost_in_word);
        assert!(!grid.chars[0].is_leftmost_in_word);
        assert_eq!(grid.words[0].chars, vec![0, 1]);
        assert_eq!(grid.rows[0].num_valid_words, 1);
        assert_eq!(grid.parent_word(BlobId(1)).map(|w| w.text.as_str()), Some("ab"));
        assert!(grid.parent_char(BlobId(2)).is_none());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let input = PageInput::from_json(
            r#"{"name": "bad", "width": 10, "height": 10,
                "blobs": [{"bbox": [0, 0, 5, 5], "char": 3}]}"#,
        )
        .unwrap();
        let err = GridBuilder::new().build(input).unwrap_err();
        assert!(err.to_string().contains("blob 0 refers to char 3"));
    }
}
