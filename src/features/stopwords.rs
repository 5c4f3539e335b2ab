use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use unicode_normalization::UnicodeNormalization;

use crate::error::ConfigError;

/// Lowercased, NFKC-normalized form used for every word comparison.
pub fn normalize_word(word: &str) -> String {
    word.nfkc().collect::<String>().to_lowercase()
}

/// Stopword list shared by the recognition extractors. Loaded once, on
/// first initialization, from a file holding one word per line.
#[derive(Debug)]
pub struct StopwordHelper {
    path: PathBuf,
    words: OnceLock<HashSet<String>>,
}

impl StopwordHelper {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            words: OnceLock::new(),
        }
    }

    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        let set: HashSet<String> = words.into_iter().map(normalize_word).collect();
        Self {
            path: PathBuf::new(),
            words: OnceLock::from(set),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<()> {
        if self.words.get().is_some() {
            return Ok(());
        }
        let set = read_word_list(&self.path)?;
        tracing::debug!(path = %self.path.display(), count = set.len(), "loaded stopwords");
        let _ = self.words.set(set);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.words.get().is_some()
    }

    pub fn is_stopword(&self, word: &str) -> bool {
        self.words
            .get()
            .is_some_and(|set| set.contains(&normalize_word(word)))
    }
}

/// Reads a one-word-per-line list. Blank lines are skipped.
pub fn read_word_list(path: &Path) -> Result<HashSet<String>> {
    let content =
        fs::read_to_string(path).map_err(|_| ConfigError::MissingResource(path.to_path_buf()))?;
    let mut words = HashSet::new();
    for (idx, line) in content.lines().enumerate() {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else { continue };
        if parts.next().is_some() {
            return Err(ConfigError::MalformedResource {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: "expected a single word".to_string(),
            }
            .into());
        }
        words.insert(normalize_word(word));
    }
    Ok(words)
}
