pub mod bridge;
pub mod layout_builder;

use anyhow::Result;
use std::path::Path;

use crate::grid::BlobDataGrid;

pub use bridge::{CommandPageSource, JsonPageSource, PageInput};
pub use layout_builder::GridBuilder;

/// Supplies the blob grid of one page from an already-run OCR pass.
pub trait PageSource {
    fn load_page(&self, path: &Path) -> Result<BlobDataGrid>;
}
