use serde::{Deserialize, Serialize};

use crate::features::ExtractorKind;

/// A toggleable sub-feature of an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagDescription {
    pub name: &'static str,
    pub description: &'static str,
}

impl FlagDescription {
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self { name, description }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorDescription {
    pub kind: ExtractorKind,
    pub short_name: &'static str,
    pub description: &'static str,
    /// Flags in registration order; features are emitted in this order.
    pub flags: &'static [FlagDescription],
    /// Names of the enclosing categories, outermost first, root excluded.
    pub category_path: Vec<String>,
}

impl ExtractorDescription {
    pub fn new(
        kind: ExtractorKind,
        short_name: &'static str,
        description: &'static str,
        flags: &'static [FlagDescription],
    ) -> Self {
        Self {
            kind,
            short_name,
            description,
            flags,
            category_path: Vec::new(),
        }
    }

    pub fn determine_unique_name(&self) -> String {
        self.category_path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.short_name))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn flag(&self, name: &str) -> Option<&FlagDescription> {
        self.flags.iter().find(|f| f.name == name)
    }
}

/// The flags an extractor instance actually emits, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledFlags {
    pub unique_name: String,
    flags: Vec<&'static str>,
}

impl EnabledFlags {
    pub fn new(unique_name: String, flags: Vec<&'static str>) -> Self {
        Self { unique_name, flags }
    }

    pub fn is_enabled(&self, flag: &FlagDescription) -> bool {
        self.flags.contains(&flag.name)
    }

    pub fn names(&self) -> &[&'static str] {
        &self.flags
    }

    pub fn feature(&self, value: f64, flag: Option<&FlagDescription>) -> DoubleFeature {
        DoubleFeature {
            value,
            extractor: self.unique_name.clone(),
            flag: flag.map(|f| f.name.to_string()),
        }
    }
}

/// One scalar feature tagged with the extractor (and flag) that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleFeature {
    pub value: f64,
    pub extractor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
}
