//! Parameter sweep harness
//!
//! Runs an external numeric program once per value of a parameter sweep,
//! scrapes the (input, result) pair out of its text output, and collects
//! everything into an ordered table with explicit gaps for failures.

pub mod aggregate;
pub mod cli;
pub mod commands;
pub mod common;
pub mod format;
pub mod parser;
pub mod pipeline;
pub mod runner;
pub mod sweep;

// Re-export commonly used types for tests
pub use aggregate::{GapReason, ResultAggregator, ResultTable, Row, SortKey};
pub use common::{Error, Result};
pub use parser::{NumericScraper, OutputParser, ParsedResult};
pub use pipeline::{FailurePolicy, Pipeline, PipelineOptions, RunReport, Schedule};
pub use runner::{CommandMode, CommandTemplate};
pub use sweep::{Sweep, SweepSpec};
