use std::path::PathBuf;

/// Configuration and resource failures. These abort a run: an inference
/// configuration that differs from the trained one would silently produce
/// misaligned feature vectors.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unknown feature extractor: {0}")]
    UnknownExtractor(String),

    #[error("feature extractor {extractor} has no flag named {flag}")]
    UnknownFlag { extractor: String, flag: String },

    #[error("feature extractor {0} was configured without any of its flags")]
    NoFlagsEnabled(String),

    #[error("feature extractor {0} is configured more than once")]
    DuplicateExtractor(String),

    #[error("unknown detector: {0}")]
    UnknownDetector(String),

    #[error("unknown segmentor: {0}")]
    UnknownSegmentor(String),

    #[error("segmentor {segmentor} requires the {extractor} feature extractor")]
    MissingExtractor { segmentor: String, extractor: String },

    #[error("required resource file is missing: {}", .0.display())]
    MissingResource(PathBuf),

    #[error("{}:{line}: {reason}", .path.display())]
    MalformedResource {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("detector expects {expected} features but the extractors produce {found}")]
    FeatureDimension { expected: usize, found: usize },
}
