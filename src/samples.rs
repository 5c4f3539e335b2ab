use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::core::geometry::BlobBox;
use crate::grid::BlobDataGrid;

/// One labelled feature vector: `f1 f2 ... fn label [# left top right bottom]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobSample {
    pub features: Vec<f64>,
    pub label: bool,
    pub bbox: Option<BlobBox>,
}

impl BlobSample {
    pub fn new(features: Vec<f64>, label: bool, bbox: Option<BlobBox>) -> Self {
        Self {
            features,
            label,
            bbox,
        }
    }

    pub fn to_line(&self) -> String {
        let mut parts: Vec<String> = self.features.iter().map(|f| f.to_string()).collect();
        parts.push(if self.label { "1" } else { "0" }.to_string());
        let mut line = parts.join(" ");
        if let Some(b) = self.bbox {
            line.push_str(&format!(" # {} {} {} {}", b.left, b.top, b.right, b.bottom));
        }
        line
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let (values, reference) = match line.split_once('#') {
            Some((values, reference)) => (values, Some(reference)),
            None => (line, None),
        };
        let fields: Vec<&str> = values.split_whitespace().collect();
        let Some((label, features)) = fields.split_last() else {
            bail!("empty sample line");
        };
        let label = match *label {
            "1" => true,
            "0" => false,
            other => bail!("label must be 1 or 0, found {other:?}"),
        };
        let features = features
            .iter()
            .map(|f| {
                f.parse::<f64>()
                    .with_context(|| format!("feature {f:?} is not a number"))
            })
            .collect::<Result<Vec<_>>>()?;

        let bbox = match reference {
            None => None,
            Some(reference) => {
                let coords = reference
                    .split_whitespace()
                    .map(|c| {
                        c.parse::<i32>()
                            .with_context(|| format!("box coordinate {c:?} is not an integer"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let [l, t, r, b] = coords[..] else {
                    bail!("expected four box coordinates, found {}", coords.len());
                };
                Some(BlobBox::new(l, t, r, b))
            }
        };
        Ok(Self::new(features, label, bbox))
    }

    /// One sample per blob, labelled with the blob's current math status.
    pub fn from_grid(grid: &BlobDataGrid) -> Vec<Self> {
        grid.ids()
            .map(|id| {
                let blob = grid.blob(id);
                Self::new(blob.feature_vector(), blob.is_math, Some(blob.bbox))
            })
            .collect()
    }
}

/// Reads a sample file. Any malformed line fails the whole read.
pub fn read_samples(path: &Path) -> Result<Vec<BlobSample>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read samples from {}", path.display()))?;
    let mut samples = Vec::new();
    let mut dimension: Option<usize> = None;
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let sample = BlobSample::parse_line(line)
            .with_context(|| format!("{}:{}: malformed sample", path.display(), idx + 1))?;
        match dimension {
            Some(d) if d != sample.features.len() => bail!(
                "{}:{}: expected {d} features, found {}",
                path.display(),
                idx + 1,
                sample.features.len()
            ),
            _ => dimension = Some(sample.features.len()),
        }
        samples.push(sample);
    }
    Ok(samples)
}

pub fn write_samples(path: &Path, samples: &[BlobSample]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut data = samples
        .iter()
        .map(BlobSample::to_line)
        .collect::<Vec<_>>()
        .join("\n");
    data.push('\n');
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn line_with_box_reference_parses() {
        let sample = BlobSample::parse_line("0.5 0 1 # 10 20 30 40").unwrap();
        assert_eq!(sample.features, vec![0.5, 0.0]);
        assert!(sample.label);
        assert_eq!(sample.bbox, Some(BlobBox::new(10, 20, 30, 40)));
    }

    #[test]
    fn written_line_reads_back_unchanged() {
        let sample = BlobSample::new(vec![0.25, 0.8646647167633873, 0.0], false, None);
        let line = sample.to_line();
        assert_eq!(line, "0.25 0.8646647167633873 0 0");
        assert_eq!(BlobSample::parse_line(&line).unwrap(), sample);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(BlobSample::parse_line("0.5 0.2 maybe").is_err());
        assert!(BlobSample::parse_line("0.5 x 1").is_err());
        assert!(BlobSample::parse_line("0.5 1 # 1 2 3").is_err());
        assert!(BlobSample::parse_line("").is_err());
    }
}
