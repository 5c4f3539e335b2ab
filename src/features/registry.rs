use std::sync::Arc;

use anyhow::Result;

use crate::error::ConfigError;
use crate::features::description::{EnabledFlags, ExtractorDescription};
use crate::features::stopwords::StopwordHelper;
use crate::features::{
    aligned, nested, ngrams, other_rec, stacked, subsup, AlignedExtractor, ExtractorKind,
    FeatureExtractor, NGramExtractor, NestedExtractor, OtherRecognitionExtractor,
    StackedExtractor, SubSupExtractor,
};
use crate::finder::TrainingPaths;

/// Owns exactly one extractor description and knows how to build it.
#[derive(Debug, Clone)]
pub struct ExtractorFactory {
    description: ExtractorDescription,
}

impl ExtractorFactory {
    pub fn new(description: ExtractorDescription) -> Self {
        Self { description }
    }

    pub fn description(&self) -> &ExtractorDescription {
        &self.description
    }
}

/// A node of the extractor category tree. Categories exclusively own their
/// subcategories and factories; a category may also own a stopword list
/// shared by every extractor beneath it.
#[derive(Debug)]
pub struct ExtractorCategory {
    pub name: &'static str,
    pub description: &'static str,
    subcategories: Vec<ExtractorCategory>,
    factories: Vec<ExtractorFactory>,
    stopwords: Option<Arc<StopwordHelper>>,
}

impl ExtractorCategory {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            subcategories: Vec::new(),
            factories: Vec::new(),
            stopwords: None,
        }
    }

    pub fn with_stopwords(mut self, stopwords: Arc<StopwordHelper>) -> Self {
        self.stopwords = Some(stopwords);
        self
    }

    pub fn with_subcategory(mut self, category: ExtractorCategory) -> Self {
        self.subcategories.push(category);
        self
    }

    pub fn with_factory(mut self, description: ExtractorDescription) -> Self {
        self.factories.push(ExtractorFactory::new(description));
        self
    }

    pub fn subcategories(&self) -> &[ExtractorCategory] {
        &self.subcategories
    }

    pub fn factories(&self) -> &[ExtractorFactory] {
        &self.factories
    }

    fn assign_paths(&mut self, path: &[String]) {
        for factory in &mut self.factories {
            factory.description.category_path = path.to_vec();
        }
        for sub in &mut self.subcategories {
            let mut sub_path = path.to_vec();
            sub_path.push(sub.name.to_string());
            sub.assign_paths(&sub_path);
        }
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a ExtractorDescription>) {
        for sub in &self.subcategories {
            sub.collect(out);
        }
        out.extend(self.factories.iter().map(ExtractorFactory::description));
    }

    /// Finds the factory for `unique_name` along with the nearest stopword
    /// list owned by it or an enclosing category.
    fn locate(
        &self,
        unique_name: &str,
        inherited: Option<&Arc<StopwordHelper>>,
    ) -> Option<(&ExtractorFactory, Option<Arc<StopwordHelper>>)> {
        let stopwords = self.stopwords.as_ref().or(inherited);
        if let Some(factory) = self
            .factories
            .iter()
            .find(|f| f.description.determine_unique_name() == unique_name)
        {
            return Some((factory, stopwords.cloned()));
        }
        self.subcategories
            .iter()
            .find_map(|sub| sub.locate(unique_name, stopwords))
    }
}

/// The full set of registered extractors, rooted at an unnamed `Root`.
#[derive(Debug)]
pub struct ExtractorRegistry {
    root: ExtractorCategory,
    paths: TrainingPaths,
}

impl ExtractorRegistry {
    pub fn new(paths: &TrainingPaths) -> Self {
        let stopwords = Arc::new(StopwordHelper::new(paths.stopwords()));
        let geometric = ExtractorCategory::new("Geometric", "spatial-based features")
            .with_subcategory(
                ExtractorCategory::new("Alignment", "alignment of neighboring blobs").with_factory(
                    ExtractorDescription::new(
                        ExtractorKind::Aligned,
                        aligned::SHORT_NAME,
                        aligned::DESCRIPTION,
                        aligned::FLAGS,
                    ),
                ),
            )
            .with_factory(ExtractorDescription::new(
                ExtractorKind::Nested,
                nested::SHORT_NAME,
                nested::DESCRIPTION,
                nested::FLAGS,
            ))
            .with_factory(ExtractorDescription::new(
                ExtractorKind::Stacked,
                stacked::SHORT_NAME,
                stacked::DESCRIPTION,
                stacked::FLAGS,
            ));
        let recognition = ExtractorCategory::new("Recognition", "recognition-based features")
            .with_stopwords(stopwords)
            .with_factory(ExtractorDescription::new(
                ExtractorKind::SubSup,
                subsup::SHORT_NAME,
                subsup::DESCRIPTION,
                subsup::FLAGS,
            ))
            .with_factory(ExtractorDescription::new(
                ExtractorKind::NGrams,
                ngrams::SHORT_NAME,
                ngrams::DESCRIPTION,
                ngrams::FLAGS,
            ))
            .with_factory(ExtractorDescription::new(
                ExtractorKind::OtherRecognition,
                other_rec::SHORT_NAME,
                other_rec::DESCRIPTION,
                other_rec::FLAGS,
            ));

        let mut root = ExtractorCategory::new("Root", "all feature extractors")
            .with_subcategory(geometric)
            .with_subcategory(recognition);
        root.assign_paths(&[]);
        Self {
            root,
            paths: paths.clone(),
        }
    }

    pub fn root(&self) -> &ExtractorCategory {
        &self.root
    }

    /// Every registered description, in tree order.
    pub fn all(&self) -> Vec<&ExtractorDescription> {
        let mut out = Vec::new();
        self.root.collect(&mut out);
        out
    }

    pub fn find(&self, unique_name: &str) -> Option<&ExtractorDescription> {
        self.root
            .locate(unique_name, None)
            .map(|(factory, _)| factory.description())
    }

    /// Builds the extractor registered under `unique_name` with the named
    /// flags enabled. Flags are validated and put in registration order.
    pub fn create(&self, unique_name: &str, flags: &[String]) -> Result<FeatureExtractor> {
        let (factory, stopwords) = self
            .root
            .locate(unique_name, None)
            .ok_or_else(|| ConfigError::UnknownExtractor(unique_name.to_string()))?;
        let desc = factory.description();

        for flag in flags {
            if desc.flag(flag).is_none() {
                return Err(ConfigError::UnknownFlag {
                    extractor: unique_name.to_string(),
                    flag: flag.clone(),
                }
                .into());
            }
        }
        if !desc.flags.is_empty() && flags.is_empty() {
            return Err(ConfigError::NoFlagsEnabled(unique_name.to_string()).into());
        }
        let enabled_names: Vec<&'static str> = desc
            .flags
            .iter()
            .filter(|f| flags.iter().any(|name| name == f.name))
            .map(|f| f.name)
            .collect();
        let enabled = EnabledFlags::new(unique_name.to_string(), enabled_names);

        let stopwords =
            stopwords.unwrap_or_else(|| Arc::new(StopwordHelper::new(self.paths.stopwords())));
        let extractor = match desc.kind {
            ExtractorKind::Aligned => FeatureExtractor::Aligned(AlignedExtractor::new(enabled)),
            ExtractorKind::Nested => FeatureExtractor::Nested(NestedExtractor::new(enabled)),
            ExtractorKind::Stacked => FeatureExtractor::Stacked(StackedExtractor::new(enabled)),
            ExtractorKind::SubSup => FeatureExtractor::SubSup(SubSupExtractor::new(enabled)),
            ExtractorKind::NGrams => FeatureExtractor::NGrams(NGramExtractor::new(
                enabled,
                stopwords,
                self.paths.ngram_profiles(),
            )),
            ExtractorKind::OtherRecognition => {
                FeatureExtractor::OtherRecognition(OtherRecognitionExtractor::new(
                    enabled,
                    stopwords,
                    self.paths.mathwords(),
                ))
            }
        };
        Ok(extractor)
    }
}
