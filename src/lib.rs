//! NewsREEL Evaluator Library
//!
//! Exposes the evaluation core for use by the CLI binary and tests.

pub mod evaluation;

// Re-export the entry points at crate root for convenience
pub use evaluation::{EvaluationReport, Evaluator, EvaluatorConfig, GroundTruthMatcher};
