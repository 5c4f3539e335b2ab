use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// One configured extractor and the flags enabled on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorSelection {
    pub unique_name: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl ExtractorSelection {
    pub fn new(unique_name: impl Into<String>, flags: &[&str]) -> Self {
        Self {
            unique_name: unique_name.into(),
            flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }
}

fn default_resource_dir() -> PathBuf {
    PathBuf::from("training")
}

/// Persisted finder configuration. The order of `extractors` fixes the
/// feature vector layout, so a file must be read back exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinderInfo {
    pub finder_name: String,
    pub detector_name: String,
    pub segmentor_name: String,
    pub extractors: Vec<ExtractorSelection>,
    #[serde(default = "default_resource_dir")]
    pub resource_dir: PathBuf,
}

impl FinderInfo {
    pub fn new(
        finder_name: impl Into<String>,
        detector_name: impl Into<String>,
        segmentor_name: impl Into<String>,
        extractors: Vec<ExtractorSelection>,
    ) -> Self {
        Self {
            finder_name: finder_name.into(),
            detector_name: detector_name.into(),
            segmentor_name: segmentor_name.into(),
            extractors,
            resource_dir: default_resource_dir(),
        }
    }

    pub fn with_resource_dir(mut self, dir: PathBuf) -> Self {
        self.resource_dir = dir;
        self
    }

    pub fn training_paths(&self) -> TrainingPaths {
        TrainingPaths::new(self.resource_dir.clone())
    }

    /// Reads the text form, or the JSON form when the file ends in `.json`.
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read finder info {}", path.display()))?;
        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse finder info {}", path.display()))
        } else {
            Self::parse(&content).with_context(|| format!("in {}", path.display()))
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        let data = if is_json {
            serde_json::to_string_pretty(self)?
        } else {
            self.to_string()
        };
        fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut finder = None;
        let mut detector = None;
        let mut segmentor = None;
        let mut resource_dir = None;
        let mut extractors = Vec::new();

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(key) = fields.next() else { continue };
            let values: Vec<&str> = fields.collect();
            let single = |what: &str| -> Result<String> {
                match values.as_slice() {
                    [value] => Ok(value.to_string()),
                    _ => bail!("line {line_no}: `{what}` takes exactly one value"),
                }
            };
            match key {
                "finder" => finder = Some(single("finder")?),
                "detector" => detector = Some(single("detector")?),
                "segmentor" => segmentor = Some(single("segmentor")?),
                "resources" => resource_dir = Some(PathBuf::from(single("resources")?)),
                "extractor" => {
                    let Some((name, flags)) = values.split_first() else {
                        bail!("line {line_no}: `extractor` needs a unique name");
                    };
                    extractors.push(ExtractorSelection::new(*name, flags));
                }
                other => bail!("line {line_no}: unknown key {other:?}"),
            }
        }

        let (Some(finder), Some(detector), Some(segmentor)) = (finder, detector, segmentor) else {
            bail!("finder info needs `finder`, `detector` and `segmentor` lines");
        };
        Ok(Self {
            finder_name: finder,
            detector_name: detector,
            segmentor_name: segmentor,
            extractors,
            resource_dir: resource_dir.unwrap_or_else(default_resource_dir),
        })
    }
}

impl fmt::Display for FinderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "finder {}", self.finder_name)?;
        writeln!(f, "detector {}", self.detector_name)?;
        writeln!(f, "segmentor {}", self.segmentor_name)?;
        writeln!(f, "resources {}", self.resource_dir.display())?;
        for e in &self.extractors {
            write!(f, "extractor {}", e.unique_name)?;
            for flag in &e.flags {
                write!(f, " {flag}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Locations of the word lists, n-gram profiles and detector models under
/// a resource directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingPaths {
    root: PathBuf,
}

impl TrainingPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stopwords(&self) -> PathBuf {
        self.root.join("stopwords")
    }

    pub fn mathwords(&self) -> PathBuf {
        self.root.join("mathwords")
    }

    pub fn ngram_profiles(&self) -> [PathBuf; 3] {
        let math = self.root.join("math");
        [
            math.join("uni-grams-sub-ranked"),
            math.join("bi-grams-sub-ranked"),
            math.join("tri-grams-sub-ranked"),
        ]
    }

    pub fn detector_model(&self, finder_name: &str, detector_name: &str) -> PathBuf {
        self.root
            .join("detectors")
            .join(format!("{finder_name}.{detector_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INFO: &str = "\
finder spatial
detector linear
segmentor heuristic
resources res
extractor Geometric.Alignment.NumAlignedBlobsFeatureExtractor NumAlignedDownwardEnabled NumAlignedUpwardEnabled
extractor Geometric.NumVerticallyStackedBlobsFeatureExtractor
";

    #[test]
    fn text_form_reads_back_unchanged() {
        let info = FinderInfo::parse(INFO).unwrap();
        assert_eq!(info.finder_name, "spatial");
        assert_eq!(info.resource_dir, PathBuf::from("res"));
        assert_eq!(info.extractors.len(), 2);
        assert_eq!(
            info.extractors[0].flags,
            vec!["NumAlignedDownwardEnabled", "NumAlignedUpwardEnabled"]
        );
        assert_eq!(info.to_string(), INFO);
        assert_eq!(FinderInfo::parse(&info.to_string()).unwrap(), info);
    }

    #[test]
    fn unknown_keys_report_the_line() {
        let err = FinderInfo::parse("finder a\nclassifier svm\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(FinderInfo::parse("finder a\ndetector b\n").is_err());
        assert!(FinderInfo::parse("finder a b\ndetector b\nsegmentor c\n").is_err());
    }

    #[test]
    fn training_paths_layout() {
        let paths = TrainingPaths::new(PathBuf::from("training"));
        assert_eq!(paths.stopwords(), PathBuf::from("training/stopwords"));
        assert_eq!(
            paths.ngram_profiles()[1],
            PathBuf::from("training/math/bi-grams-sub-ranked")
        );
        assert_eq!(
            paths.detector_model("spatial", "linear"),
            PathBuf::from("training/detectors/spatial.linear")
        );
    }
}
