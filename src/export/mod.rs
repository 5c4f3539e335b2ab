pub mod json_export;
pub mod overlay;
pub mod rect_export;

use anyhow::Result;

use crate::core::model::MathExpressionFinderResults;

pub use json_export::JsonExporter;
pub use overlay::OverlayExporter;
pub use rect_export::RectExporter;

pub trait Exporter {
    fn export(&self, results: &[MathExpressionFinderResults]) -> Result<()>;
}
