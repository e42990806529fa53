//! Text cleaning
//!
//! Raw extractor output carries layout artifacts (page and slide markers,
//! TOC leaders, boilerplate banners) and OCR noise. The cleaner removes those
//! and redacts email addresses; the line-quality classifier decides which
//! lines are noise.

pub mod cleaner;
pub mod line_quality;

pub use cleaner::{clean, TextCleaner};
pub use line_quality::is_garbage;
