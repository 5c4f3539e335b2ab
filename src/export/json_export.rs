use std::fs;
use std::path::PathBuf;

use anyhow::Result;

use crate::core::model::{MathExpressionFinderResults, ResultsRecord};
use crate::export::Exporter;

#[derive(Debug, Clone)]
pub struct JsonExporter {
    out_dir: PathBuf,
}

impl JsonExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

impl Exporter for JsonExporter {
    fn export(&self, results: &[MathExpressionFinderResults]) -> Result<()> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join("results.json");
        let records: Vec<ResultsRecord> = results.iter().map(|r| r.to_record()).collect();
        let data = serde_json::to_string_pretty(&records)?;
        fs::write(path, data)?;
        Ok(())
    }
}
