// src/analyze/mod.rs
//! Text-side analysis: preprocessing and sample hygiene.

pub mod antispam;
pub mod preprocess;

// Re-export convenient types.
pub use crate::analyze::antispam::{AntiSpam, AntiSpamParams};
pub use crate::analyze::preprocess::{
    AdjacentTermExtractor, PhraseExtractor, PreprocessOptions, TextAnalysisContext,
    TextPreprocessor,
};
