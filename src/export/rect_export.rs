use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::model::MathExpressionFinderResults;
use crate::export::Exporter;

/// Appends one line per segment to `<out>/<results_dir_name>/results.rect`:
/// `<results_name> <type> <left> <top> <right> <bottom>`.
#[derive(Debug, Clone)]
pub struct RectExporter {
    out_dir: PathBuf,
}

impl RectExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

pub fn rect_lines(results: &MathExpressionFinderResults) -> Vec<String> {
    results
        .segments
        .iter()
        .map(|s| {
            format!(
                "{} {} {} {} {} {}",
                results.results_name,
                s.result_type.as_str(),
                s.bbox.left,
                s.bbox.top,
                s.bbox.right,
                s.bbox.bottom
            )
        })
        .collect()
}

impl Exporter for RectExporter {
    fn export(&self, results: &[MathExpressionFinderResults]) -> Result<()> {
        let mut by_dir: Vec<(&str, Vec<String>)> = Vec::new();
        for r in results {
            let lines = rect_lines(r);
            match by_dir.iter_mut().find(|(d, _)| *d == r.results_dir_name) {
                Some((_, acc)) => acc.extend(lines),
                None => by_dir.push((&r.results_dir_name, lines)),
            }
        }
        for (dir_name, lines) in by_dir {
            let dir = self.out_dir.join(dir_name);
            fs::create_dir_all(&dir)?;
            let path = dir.join("results.rect");
            let mut data = lines.join("\n");
            if !data.is_empty() {
                data.push('\n');
            }
            fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(())
    }
}
