use anyhow::Result;

use crate::core::geometry::Direction;
use crate::features::data::ExtractorData;
use crate::features::description::{DoubleFeature, EnabledFlags, FlagDescription};
use crate::features::{BlobFeatureExtractor, ExtractorKind};
use crate::grid::{BlobDataGrid, BlobId};

pub const SHORT_NAME: &str = "SubOrSuperscriptsFeatureExtractor";
pub const DESCRIPTION: &str = "Whether a blob has or is a subscript or superscript";

pub const HAS_SUBSCRIPT: FlagDescription =
    FlagDescription::new("HasSubscript", "The blob has a subscript");
pub const IS_SUBSCRIPT: FlagDescription =
    FlagDescription::new("IsSubscript", "The blob is a subscript");
pub const HAS_SUPERSCRIPT: FlagDescription =
    FlagDescription::new("HasSuperscript", "The blob has a superscript");
pub const IS_SUPERSCRIPT: FlagDescription =
    FlagDescription::new("IsSuperscript", "The blob is a superscript");

pub const FLAGS: &[FlagDescription] = &[HAS_SUBSCRIPT, IS_SUBSCRIPT, HAS_SUPERSCRIPT, IS_SUPERSCRIPT];

/// Recognizer certainty above which in-word superscripts are second-guessed.
const CERTAINTY_THRESH: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Sub,
    Super,
}

/// Script relations found for one blob. Each link is recorded on both ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubSupData {
    pub subscript: Option<BlobId>,
    pub superscript: Option<BlobId>,
    pub subscript_of: Option<BlobId>,
    pub superscript_of: Option<BlobId>,
}

impl SubSupData {
    pub fn has_subscript(&self) -> bool {
        self.subscript.is_some()
    }

    pub fn is_subscript(&self) -> bool {
        self.subscript_of.is_some()
    }

    pub fn has_superscript(&self) -> bool {
        self.superscript.is_some()
    }

    pub fn is_superscript(&self) -> bool {
        self.superscript_of.is_some()
    }

    /// Script blobs linked through the given side of this blob.
    pub fn linked(&self, dir: Direction) -> Vec<BlobId> {
        match dir {
            Direction::Right => self.subscript.into_iter().chain(self.superscript).collect(),
            Direction::Left => self
                .subscript_of
                .into_iter()
                .chain(self.superscript_of)
                .collect(),
            Direction::Up | Direction::Down => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct SubSupExtractor {
    enabled: EnabledFlags,
}

impl SubSupExtractor {
    pub fn new(enabled: EnabledFlags) -> Self {
        Self { enabled }
    }

    fn wants(&self, script: Script) -> bool {
        match script {
            Script::Sub => {
                self.enabled.is_enabled(&HAS_SUBSCRIPT) || self.enabled.is_enabled(&IS_SUBSCRIPT)
            }
            Script::Super => {
                self.enabled.is_enabled(&HAS_SUPERSCRIPT)
                    || self.enabled.is_enabled(&IS_SUPERSCRIPT)
            }
        }
    }

    /// Scans rows from the blob's vertical center (upward for superscripts,
    /// downward for subscripts) for a nearby blob just to its right.
    pub fn find_script(grid: &BlobDataGrid, blob: BlobId, script: Script) -> Option<BlobId> {
        let b = grid.bbox(blob);
        let h_adj_thresh = b.width() / 2;
        let area_thresh = b.area() / 8;
        let center_y = b.center_y();
        let candidates: Vec<BlobId> = grid
            .side_search(b.right + 1, b.top, b.bottom, Direction::Right)
            .into_iter()
            .filter(|n| {
                let nb = grid.bbox(*n);
                *n != blob
                    && nb != b
                    && nb.right > b.right
                    && nb.left > b.right - h_adj_thresh
                    && nb.overlaps_y(&b)
            })
            .collect();

        for i in 0..b.height() / 2 {
            let y = match script {
                Script::Super => center_y - i,
                Script::Sub => center_y + i,
            };
            let Some(n) = candidates
                .iter()
                .copied()
                .find(|n| grid.bbox(*n).top <= y && grid.bbox(*n).bottom >= y)
            else {
                continue;
            };
            let nb = grid.bbox(n);
            if nb.area() < area_thresh {
                continue;
            }
            if nb.left - b.right > h_adj_thresh {
                continue;
            }
            match script {
                Script::Super => {
                    if nb.bottom < center_y + (b.bottom - center_y) / 8 {
                        if Self::is_false_superscript(grid, blob, n) {
                            continue;
                        }
                        return Some(n);
                    }
                }
                Script::Sub => {
                    if nb.top > center_y {
                        return Some(n);
                    }
                }
            }
        }
        None
    }

    /// Leading parentheses and possessives inside a confidently recognized
    /// word look like superscripts but are not.
    fn is_false_superscript(grid: &BlobDataGrid, blob: BlobId, neighbor: BlobId) -> bool {
        let (Some(word_idx), Some(char_data)) = (grid.parent_word_index(blob), grid.parent_char(blob))
        else {
            return false;
        };
        if grid.parent_word_index(neighbor) != Some(word_idx) {
            return false;
        }
        let word = &grid.words[word_idx];
        if word.certainty <= CERTAINTY_THRESH {
            return false;
        }
        let text = word.text.as_str();
        if text.starts_with('(') && char_data.is_leftmost_in_word {
            return true;
        }
        let chars: Vec<char> = text.chars().collect();
        if chars.len() >= 2 && chars[chars.len() - 1] == 's' {
            let mark = chars[chars.len() - 2];
            return matches!(mark, '\'' | '’' | '′');
        }
        false
    }

    pub fn data(grid: &BlobDataGrid, blob: BlobId) -> Option<&SubSupData> {
        grid.blob(blob)
            .extractor_data(ExtractorKind::SubSup)
            .and_then(ExtractorData::as_subsup)
    }

    fn update(grid: &mut BlobDataGrid, blob: BlobId, f: impl FnOnce(&mut SubSupData)) {
        if let Some(data) = grid
            .blob_mut(blob)
            .extractor_data_mut(ExtractorKind::SubSup)
            .and_then(ExtractorData::as_subsup_mut)
        {
            f(data);
        }
    }
}

impl BlobFeatureExtractor for SubSupExtractor {
    fn enabled_flags(&self) -> &EnabledFlags {
        &self.enabled
    }

    fn preprocess(&mut self, grid: &mut BlobDataGrid) -> Result<()> {
        let ids: Vec<BlobId> = grid.ids().collect();
        for id in &ids {
            grid.blob_mut(*id)
                .set_extractor_data(ExtractorData::SubSup(SubSupData::default()));
        }
        for id in ids {
            for script in [Script::Sub, Script::Super] {
                if !self.wants(script) {
                    continue;
                }
                let Some(n) = Self::find_script(grid, id, script) else {
                    continue;
                };
                match script {
                    Script::Sub => {
                        Self::update(grid, id, |d| d.subscript = Some(n));
                        Self::update(grid, n, |d| d.subscript_of = Some(id));
                    }
                    Script::Super => {
                        Self::update(grid, id, |d| d.superscript = Some(n));
                        Self::update(grid, n, |d| d.superscript_of = Some(id));
                    }
                }
            }
        }
        Ok(())
    }

    fn extract_features(&self, grid: &BlobDataGrid, blob: BlobId) -> Vec<DoubleFeature> {
        let data = Self::data(grid, blob).cloned().unwrap_or_default();
        let binary = |b: bool| if b { 1.0 } else { 0.0 };
        FLAGS
            .iter()
            .filter(|f| self.enabled.is_enabled(f))
            .map(|f| {
                let value = match f.name {
                    "HasSubscript" => binary(data.has_subscript()),
                    "IsSubscript" => binary(data.is_subscript()),
                    "HasSuperscript" => binary(data.has_superscript()),
                    _ => binary(data.is_superscript()),
                };
                self.enabled.feature(value, Some(f))
            })
            .collect()
    }
}
