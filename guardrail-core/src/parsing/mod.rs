//! Result extraction from free-form model output
//!
//! Treatments that let the model answer in prose need to recover a JSON
//! result from that text. Extraction is pluggable through
//! [`ResultExtractor`]; [`JsonResultExtractor`] handles code fences,
//! surrounding prose and common syntax defects.
//!
//! # Example
//!
//! ```rust
//! use guardrail_core::parsing::{JsonResultExtractor, ResultExtractor};
//!
//! let extractor = JsonResultExtractor::new();
//! let value = extractor.extract("```json\n{\"count\": 3,}\n```").unwrap();
//! assert_eq!(value["count"], 3);
//! ```

mod extractor;
mod json;

pub use extractor::{ExtractionFailure, ExtractorConfig, ResultExtractor};
pub use json::JsonResultExtractor;
