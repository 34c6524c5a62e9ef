//! Markup extraction
//!
//! The pipeline only sees the [`Extractor`] trait. The shipped implementation
//! is a [`SelectorExtractor`] driven by a field table, with one table per
//! page variant.

mod rules;
mod tables;

pub use rules::{FieldRule, FieldSource, SelectorExtractor};
pub use tables::{business_table, web_table};

use serde_json::{Map, Value};

/// Maps fetched markup to a partial record
pub trait Extractor: Send + Sync {
    /// Returns the extracted fields; missing values are empty strings
    fn extract(&self, html: &str) -> Map<String, Value>;
}
