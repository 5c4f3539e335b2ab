use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::grid::BlobDataGrid;
use crate::ocr::layout_builder::GridBuilder;
use crate::ocr::PageSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowInput {
    pub bbox: [i32; 4],
    /// `[slope, intercept]` of `y = slope * x + intercept`.
    #[serde(default)]
    pub baseline: Option<[f64; 2]>,
    #[serde(default)]
    pub normal: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordInput {
    pub text: String,
    #[serde(default)]
    pub certainty: f64,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub row: Option<usize>,
    #[serde(default)]
    pub sentence: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharInput {
    pub text: String,
    pub bbox: [i32; 4],
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub word: Option<usize>,
}

fn default_confidence() -> f64 {
    100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceInput {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobInput {
    pub bbox: [i32; 4],
    #[serde(default, rename = "char")]
    pub char_idx: Option<usize>,
    /// Groundtruth label, only read when training.
    #[serde(default)]
    pub math: Option<bool>,
}

/// One page as handed over by the OCR engine. Cross references are indices
/// into the sibling arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInput {
    pub name: String,
    #[serde(default)]
    pub image: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub rows: Vec<RowInput>,
    #[serde(default)]
    pub words: Vec<WordInput>,
    #[serde(default)]
    pub chars: Vec<CharInput>,
    #[serde(default)]
    pub sentences: Vec<SentenceInput>,
    #[serde(default)]
    pub blobs: Vec<BlobInput>,
}

impl PageInput {
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).with_context(|| "failed to parse page JSON")
    }
}

/// Reads pages saved as JSON files. Relative image paths resolve against
/// the page file's directory.
#[derive(Debug, Clone, Default)]
pub struct JsonPageSource;

impl JsonPageSource {
    pub fn new() -> Self {
        Self
    }
}

fn resolve_image(mut input: PageInput, base: Option<&Path>) -> PageInput {
    if let (Some(image), Some(base)) = (input.image.as_ref(), base) {
        if image.is_relative() {
            input.image = Some(base.join(image));
        }
    }
    input
}

impl PageSource for JsonPageSource {
    fn load_page(&self, path: &Path) -> Result<BlobDataGrid> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read page {}", path.display()))?;
        let input = PageInput::from_json(&data)
            .with_context(|| format!("in {}", path.display()))?;
        let input = resolve_image(input, path.parent());
        GridBuilder::new().build(input)
    }
}

/// Runs an external OCR program on a page image and reads the page JSON it
/// prints on stdout.
#[derive(Debug, Clone)]
pub struct CommandPageSource {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandPageSource {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn run(&self, image_path: &Path) -> Result<PageInput> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image_path)
            .output()
            .with_context(|| format!("failed to invoke {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("OCR command failed: {stderr}");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        PageInput::from_json(&stdout)
    }
}

impl PageSource for CommandPageSource {
    fn load_page(&self, path: &Path) -> Result<BlobDataGrid> {
        let input = self.run(path)?;
        let input = resolve_image(input, path.parent());
        GridBuilder::new().build(input)
    }
}
