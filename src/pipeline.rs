use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::model::{MathExpressionFinderResults, RunMode};
use crate::export::{Exporter, JsonExporter, OverlayExporter, RectExporter};
use crate::finder::{FinderInfo, MathExpressionFinder};
use crate::ocr::{JsonPageSource, PageSource};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub info: PathBuf,
    pub pages: Vec<PathBuf>,
    pub output: PathBuf,
    pub mode: RunMode,
}

impl PipelineConfig {
    pub fn new(info: PathBuf, pages: Vec<PathBuf>, output: PathBuf, mode: RunMode) -> Self {
        Self {
            info,
            pages,
            output,
            mode,
        }
    }
}

pub fn run_pages(config: &PipelineConfig) -> Result<Vec<MathExpressionFinderResults>> {
    let info = FinderInfo::read(&config.info)?;
    let mut finder = MathExpressionFinder::new(info)?;
    run_with_source(&mut finder, &JsonPageSource::new(), &config.pages, config.mode)
}

pub fn run_with_source(
    finder: &mut MathExpressionFinder,
    source: &dyn PageSource,
    pages: &[PathBuf],
    mode: RunMode,
) -> Result<Vec<MathExpressionFinderResults>> {
    match mode {
        RunMode::Detect => finder.detect_math_expressions(source, pages),
        RunMode::Find => finder.find_math_expressions(source, pages),
    }
}

pub fn export_results(results: &[MathExpressionFinderResults], output: &Path) -> Result<()> {
    let rect_exporter = RectExporter::new(output.to_path_buf());
    rect_exporter.export(results)?;

    let json_exporter = JsonExporter::new(output.to_path_buf());
    json_exporter.export(results)?;

    let overlay_exporter = OverlayExporter::new(output.to_path_buf());
    overlay_exporter.export(results)?;

    Ok(())
}
