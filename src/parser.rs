//! Extracting results from captured output
//!
//! The external program prints free text. The parser only has to find the
//! echoed input and the computed result in it; the rest of the pipeline
//! works with [`ParsedResult`] and does not care how it was obtained.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::common::error::ParseError;
use crate::runner::CapturedOutput;

/// One (input, result) pair scraped from an invocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParsedResult {
    /// Position of the originating invocation in the sweep
    pub index: usize,
    pub input: f64,
    pub result: f64,
}

/// Turns captured output into a result pair
pub trait OutputParser: Send + Sync {
    fn parse(&self, index: usize, output: &CapturedOutput) -> Result<ParsedResult, ParseError>;
}

/// Unsigned decimal numbers: digits, then optionally a point and more digits
fn numeric_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"[0-9]+(?:\.[0-9]*)?").expect("numeric token pattern is valid"))
}

/// Takes the first two numeric tokens of stdout as (input, result)
///
/// Signs and exponents are not recognized: `-1` reads as `1` and `1e-3`
/// reads as the two tokens `1` and `3`. The echoed input is not checked
/// against the value that was sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericScraper;

impl NumericScraper {
    /// Parse raw text directly
    pub fn parse_text(&self, index: usize, text: &str) -> Result<ParsedResult, ParseError> {
        let mut tokens = numeric_token()
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<f64>().ok());

        match (tokens.next(), tokens.next()) {
            // Overlong digit runs parse as infinity
            (Some(input), Some(result)) if !input.is_finite() || !result.is_finite() => {
                Err(ParseError {
                    raw_text: text.to_string(),
                    found: 2,
                })
            }
            (Some(input), Some(result)) => Ok(ParsedResult {
                index,
                input,
                result,
            }),
            (first, _) => Err(ParseError {
                raw_text: text.to_string(),
                found: usize::from(first.is_some()),
            }),
        }
    }
}

impl OutputParser for NumericScraper {
    fn parse(&self, index: usize, output: &CapturedOutput) -> Result<ParsedResult, ParseError> {
        self.parse_text(index, &output.stdout)
    }
}
