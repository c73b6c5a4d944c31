//! Collecting results into an ordered table
//!
//! Each sweep position owns one write-once slot. Invocations may finish in
//! any order; the table is always read back in sweep order, and a position
//! that failed shows up as an explicit [`Gap`] rather than disappearing.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::Serialize;

use crate::common::{Error, Result};
use crate::parser::ParsedResult;

/// Why a sweep position has no result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GapReason {
    /// Output did not contain two numbers
    Parse { raw_text: String },
    /// Program exited unsuccessfully
    ExitStatus { code: Option<i32>, raw_text: String },
    /// Program exceeded its deadline and was killed
    Timeout { secs: f64 },
    /// Run was cancelled before this invocation finished
    Cancelled,
    /// Batch output had no line for this position
    Missing,
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { .. } => write!(f, "unparsable output"),
            Self::ExitStatus { code: Some(code), .. } => write!(f, "exit code {code}"),
            Self::ExitStatus { code: None, .. } => write!(f, "killed by signal"),
            Self::Timeout { secs } => write!(f, "timed out after {secs:.1}s"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Missing => write!(f, "no output line"),
        }
    }
}

/// A sweep position without a result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub index: usize,
    /// Value that was sent
    pub value: f64,
    pub reason: GapReason,
}

/// One table entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Row {
    Parsed(ParsedResult),
    Gap(Gap),
}

impl Row {
    pub fn index(&self) -> usize {
        match self {
            Row::Parsed(p) => p.index,
            Row::Gap(g) => g.index,
        }
    }

    pub fn as_parsed(&self) -> Option<&ParsedResult> {
        match self {
            Row::Parsed(p) => Some(p),
            Row::Gap(_) => None,
        }
    }
}

/// Column to sort a table by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Sweep order
    #[default]
    Index,
    /// Echoed input value
    Input,
    /// Computed result value
    Result,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "index" => Ok(Self::Index),
            "input" => Ok(Self::Input),
            "result" => Ok(Self::Result),
            _ => Err(Error::Config(format!(
                "Unknown sort key '{s}'. Supported keys: 'index', 'input', 'result'"
            ))),
        }
    }
}

/// Ordered rows of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    rows: Vec<Row>,
}

impl ResultTable {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that produced a result
    pub fn parsed(&self) -> impl Iterator<Item = &ParsedResult> {
        self.rows.iter().filter_map(Row::as_parsed)
    }

    /// Rows without a result
    pub fn gaps(&self) -> impl Iterator<Item = &Gap> {
        self.rows.iter().filter_map(|row| match row {
            Row::Gap(g) => Some(g),
            Row::Parsed(_) => None,
        })
    }

    /// Sweep positions that failed, ascending
    pub fn failed_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.gaps().map(|g| g.index).collect();
        indices.sort_unstable();
        indices
    }

    /// Echoed input values of the parsed rows, in table order
    pub fn inputs(&self) -> Vec<f64> {
        self.parsed().map(|p| p.input).collect()
    }

    /// New table stably sorted ascending by `key`
    ///
    /// Gaps have no values to compare, so they follow every parsed row and
    /// keep their relative order. `self` is left as it was.
    pub fn sorted_by(&self, key: SortKey) -> ResultTable {
        self.sorted_by_key(|p| match key {
            SortKey::Index => p.index as f64,
            SortKey::Input => p.input,
            SortKey::Result => p.result,
        })
    }

    /// New table stably sorted ascending by an arbitrary selector
    pub fn sorted_by_key<F>(&self, selector: F) -> ResultTable
    where
        F: Fn(&ParsedResult) -> f64,
    {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| match (a, b) {
            (Row::Parsed(a), Row::Parsed(b)) => selector(a).total_cmp(&selector(b)),
            (Row::Parsed(_), Row::Gap(_)) => Ordering::Less,
            (Row::Gap(_), Row::Parsed(_)) => Ordering::Greater,
            (Row::Gap(_), Row::Gap(_)) => Ordering::Equal,
        });
        ResultTable { rows }
    }
}

/// Shared, index-keyed buffer of results
///
/// Safe to write from several tasks at once; each slot accepts exactly one
/// write.
#[derive(Debug)]
pub struct ResultAggregator {
    values: Vec<f64>,
    slots: Mutex<Vec<Option<Row>>>,
}

impl ResultAggregator {
    /// Aggregator expecting one entry per value of the sweep
    pub fn new(values: Vec<f64>) -> Self {
        let slots = Mutex::new(vec![None; values.len()]);
        Self { values, slots }
    }

    /// Record the outcome for one sweep position
    pub fn accumulate(&self, index: usize, row: Row) -> Result<()> {
        debug_assert_eq!(index, row.index());
        let mut slots = self.lock()?;
        let len = slots.len();
        let slot = slots
            .get_mut(index)
            .ok_or(Error::SlotOutOfRange { index, len })?;
        if slot.is_some() {
            return Err(Error::DuplicateSlot(index));
        }
        tracing::trace!(index, parsed = matches!(row, Row::Parsed(_)), "Slot filled");
        *slot = Some(row);
        Ok(())
    }

    /// Record a parsed result under its own index
    pub fn record(&self, parsed: ParsedResult) -> Result<()> {
        self.accumulate(parsed.index, Row::Parsed(parsed))
    }

    /// Record a failed position
    pub fn record_gap(&self, index: usize, reason: GapReason) -> Result<()> {
        let value = self.values.get(index).copied().unwrap_or(f64::NAN);
        self.accumulate(index, Row::Gap(Gap { index, value, reason }))
    }

    /// Number of filled slots
    pub fn completed(&self) -> usize {
        self.lock()
            .map(|slots| slots.iter().filter(|s| s.is_some()).count())
            .unwrap_or(0)
    }

    /// Fill every empty slot with a gap of the given reason
    pub fn fill_missing(&self, reason: GapReason) -> Result<()> {
        let mut slots = self.lock()?;
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Row::Gap(Gap {
                    index,
                    value: self.values[index],
                    reason: reason.clone(),
                }));
            }
        }
        Ok(())
    }

    /// Contiguous filled prefix, for progressive display
    pub fn partial(&self) -> Result<ResultTable> {
        let slots = self.lock()?;
        let rows = slots.iter().map_while(|slot| slot.clone()).collect();
        Ok(ResultTable { rows })
    }

    /// Complete table in sweep order
    ///
    /// Any slot still empty belongs to an invocation that never finished and
    /// is reported as a cancelled gap.
    pub fn finish(&self) -> Result<ResultTable> {
        let slots = self.lock()?;
        let rows = slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.clone().unwrap_or_else(|| {
                    Row::Gap(Gap {
                        index,
                        value: self.values[index],
                        reason: GapReason::Cancelled,
                    })
                })
            })
            .collect();
        Ok(ResultTable { rows })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Option<Row>>>> {
        self.slots
            .lock()
            .map_err(|_| Error::Internal("result buffer lock poisoned".to_string()))
    }
}
