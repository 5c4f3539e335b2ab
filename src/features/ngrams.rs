use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::core::geometry::exp_normalize;
use crate::error::ConfigError;
use crate::features::description::{DoubleFeature, EnabledFlags, FlagDescription};
use crate::features::stopwords::{normalize_word, StopwordHelper};
use crate::features::BlobFeatureExtractor;
use crate::grid::{BlobDataGrid, BlobId};

pub const SHORT_NAME: &str = "SentenceNGramFeatureExtractor";
pub const DESCRIPTION: &str =
    "How closely the n-grams of a blob's sentence match the math n-gram profile";

pub const UNIGRAM: FlagDescription =
    FlagDescription::new("unigram", "Sentence uni-gram match against the math profile");
pub const BIGRAM: FlagDescription =
    FlagDescription::new("bigram", "Sentence bi-gram match against the math profile");
pub const TRIGRAM: FlagDescription =
    FlagDescription::new("trigram", "Sentence tri-gram match against the math profile");

pub const FLAGS: &[FlagDescription] = &[UNIGRAM, BIGRAM, TRIGRAM];

const OPERATORS: &[&str] = &["=", "+", "-", "*", "/"];
const UPPER_BOUND: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedNGram {
    pub words: Vec<String>,
    pub count: f64,
}

/// Ranked n-grams for n = 1, 2, 3, most frequent first.
pub type RankedNGrams = [Vec<RankedNGram>; 3];

/// Math n-gram profile read from the three `*-grams-sub-ranked` files.
#[derive(Debug, Clone, Default)]
pub struct NGramProfile {
    ranked: RankedNGrams,
}

impl NGramProfile {
    pub fn new(ranked: RankedNGrams) -> Self {
        Self { ranked }
    }

    pub fn load(paths: &[PathBuf; 3]) -> Result<Self> {
        let mut ranked: RankedNGrams = Default::default();
        for (idx, path) in paths.iter().enumerate() {
            ranked[idx] = read_profile_file(path, idx + 1)?;
        }
        Ok(Self { ranked })
    }

    pub fn grams(&self, gram: usize) -> &[RankedNGram] {
        &self.ranked[gram - 1]
    }

    fn matching_count(&self, gram: usize, words: &[String]) -> f64 {
        self.grams(gram)
            .iter()
            .find(|p| p.words == words)
            .map_or(0.0, |p| p.count)
    }

    /// Σ sentence count × profile count, scaled down by ten when the profile
    /// is dominated by large counts, capped, then normalized.
    pub fn score(&self, sentence: &RankedNGrams, gram: usize) -> f64 {
        let raw: f64 = sentence[gram - 1]
            .iter()
            .map(|ng| ng.count * self.matching_count(gram, &ng.words))
            .sum();
        let Some(top) = self.grams(gram).first() else {
            return 0.0;
        };
        let mut scaled = raw;
        if top.count > UPPER_BOUND {
            scaled /= 10.0;
        }
        exp_normalize(scaled.min(UPPER_BOUND))
    }
}

/// Each line holds `gram` words followed by a numeric count.
fn read_profile_file(path: &Path, gram: usize) -> Result<Vec<RankedNGram>> {
    let content =
        fs::read_to_string(path).map_err(|_| ConfigError::MissingResource(path.to_path_buf()))?;
    let malformed = |line: usize, reason: String| ConfigError::MalformedResource {
        path: path.to_path_buf(),
        line,
        reason,
    };
    let mut ranked = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if parts.len() != gram + 1 {
            return Err(malformed(
                idx + 1,
                format!("expected {gram} words and a count, found {} fields", parts.len()),
            )
            .into());
        }
        let count: f64 = parts[gram]
            .parse()
            .map_err(|_| malformed(idx + 1, format!("count {:?} is not a number", parts[gram])))?;
        ranked.push(RankedNGram {
            words: parts[..gram].iter().map(|w| w.to_string()).collect(),
            count,
        });
    }
    Ok(ranked)
}

fn clean_token(raw: &str) -> String {
    let word = normalize_word(raw);
    if OPERATORS.contains(&word.as_str()) {
        return word;
    }
    word.chars().filter(|c| c.is_alphabetic()).collect()
}

/// Counts the uni-, bi- and tri-grams of a sentence. Windows that contain a
/// stopword or a token with nothing left after cleaning are skipped.
pub fn rank_sentence(text: &str, stopwords: &StopwordHelper) -> RankedNGrams {
    let tokens: Vec<String> = text.split_whitespace().map(clean_token).collect();
    let mut ranked: RankedNGrams = Default::default();
    for gram in 1..=3 {
        let mut counts: Vec<RankedNGram> = Vec::new();
        for window in tokens.windows(gram) {
            if window
                .iter()
                .any(|w| w.is_empty() || stopwords.is_stopword(w))
            {
                continue;
            }
            match counts.iter_mut().find(|c| c.words == window) {
                Some(existing) => existing.count += 1.0,
                None => counts.push(RankedNGram {
                    words: window.to_vec(),
                    count: 1.0,
                }),
            }
        }
        counts.sort_by(|a, b| b.count.total_cmp(&a.count));
        ranked[gram - 1] = counts;
    }
    ranked
}

#[derive(Debug)]
pub struct NGramExtractor {
    enabled: EnabledFlags,
    stopwords: Arc<StopwordHelper>,
    profile_paths: [PathBuf; 3],
    profile: Option<NGramProfile>,
}

impl NGramExtractor {
    pub fn new(
        enabled: EnabledFlags,
        stopwords: Arc<StopwordHelper>,
        profile_paths: [PathBuf; 3],
    ) -> Self {
        Self {
            enabled,
            stopwords,
            profile_paths,
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: NGramProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

impl BlobFeatureExtractor for NGramExtractor {
    fn enabled_flags(&self) -> &EnabledFlags {
        &self.enabled
    }

    fn do_trainer_initialization(&mut self) -> Result<()> {
        self.stopwords.load()?;
        if self.profile.is_none() {
            let profile = NGramProfile::load(&self.profile_paths)?;
            tracing::debug!(
                unigrams = profile.grams(1).len(),
                bigrams = profile.grams(2).len(),
                trigrams = profile.grams(3).len(),
                "loaded n-gram profile"
            );
            self.profile = Some(profile);
        }
        Ok(())
    }

    fn preprocess(&mut self, grid: &mut BlobDataGrid) -> Result<()> {
        let Some(profile) = &self.profile else {
            bail!("{} used before initialization", self.enabled.unique_name);
        };
        for sentence in &mut grid.sentences {
            let ranked = rank_sentence(&sentence.text, &self.stopwords);
            sentence.ngram_features = Some([
                profile.score(&ranked, 1),
                profile.score(&ranked, 2),
                profile.score(&ranked, 3),
            ]);
        }
        Ok(())
    }

    fn extract_features(&self, grid: &BlobDataGrid, blob: BlobId) -> Vec<DoubleFeature> {
        let scores = grid
            .parent_sentence(blob)
            .and_then(|s| s.ngram_features)
            .unwrap_or([0.0; 3]);
        FLAGS
            .iter()
            .zip(scores)
            .filter(|(f, _)| self.enabled.is_enabled(f))
            .map(|(f, value)| self.enabled.feature(value, Some(f)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ng(words: &[&str], count: f64) -> RankedNGram {
        RankedNGram {
            words: words.iter().map(|w| w.to_string()).collect(),
            count,
        }
    }

    #[test]
    fn sentence_ranking_drops_stopwords_and_punctuation() {
        let stop = StopwordHelper::from_words(["the", "of"]);
        let ranked = rank_sentence("Let x = y, the sum of x = y.", &stop);
        assert_eq!(ranked[0][0], ng(&["x"], 2.0));
        assert!(ranked[0].contains(&ng(&["="], 2.0)));
        assert!(!ranked[0].iter().any(|n| n.words[0] == "the"));
        assert!(ranked[1].contains(&ng(&["x", "="], 2.0)));
        assert!(!ranked[1].iter().any(|n| n.words.contains(&"of".to_string())));
        assert_eq!(ranked[2][0], ng(&["x", "=", "y"], 2.0));
    }

    #[test]
    fn score_scales_and_caps() {
        let profile = NGramProfile::new([
            vec![ng(&["integral"], 3.0)],
            vec![ng(&["let", "x"], 20.0)],
            vec![],
        ]);
        let stop = StopwordHelper::from_words(Vec::<&str>::new());
        let sentence = rank_sentence("integral let x", &stop);
        assert_eq!(profile.score(&sentence, 1), exp_normalize(3.0));
        assert_eq!(profile.score(&sentence, 2), exp_normalize(2.0));
        assert_eq!(profile.score(&sentence, 3), 0.0);
    }

    #[test]
    fn profile_lines_must_match_gram() {
        let path = std::env::temp_dir().join(format!("mathfinder-bigrams-{}", std::process::id()));
        fs::write(&path, "let x 4\nsum 2\n").unwrap();
        let err = read_profile_file(&path, 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MalformedResource { line: 2, .. })
        ));
        let _ = fs::remove_file(path);
    }
}
