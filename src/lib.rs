pub mod core;
pub mod detect;
pub mod error;
pub mod export;
pub mod features;
pub mod finder;
pub mod grid;
pub mod ocr;
pub mod pipeline;
pub mod samples;
pub mod segment;

pub use core::model::{MathExpressionFinderResults, ResultType, Segmentation};
pub use finder::{FinderInfo, MathExpressionFinder};
