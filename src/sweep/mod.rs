//! Parameter sweeps
//!
//! A sweep is an ordered, finite list of input values built from one or more
//! segments. Values are computed on demand from each segment, so
//! a sweep can be iterated any number of times and always yields the same
//! sequence.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::common::{Error, Result};

/// Upper bound on the number of values in one sweep
pub const MAX_SWEEP_LEN: usize = 10_000_000;

/// How one segment of a sweep is generated
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SweepSpec {
    /// Values exactly as given
    List { values: Vec<f64> },
    /// `count` evenly spaced values from `start` to `end`, both inclusive
    Linspace { start: f64, end: f64, count: usize },
    /// `start, start + step, ...` up to but excluding `stop`
    Arange { start: f64, stop: f64, step: f64 },
}

impl SweepSpec {
    /// Explicit list of values
    pub fn list(values: impl Into<Vec<f64>>) -> Result<Self> {
        let spec = Self::List {
            values: values.into(),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Linear spacing, numpy `linspace` semantics
    pub fn linspace(start: f64, end: f64, count: usize) -> Result<Self> {
        let spec = Self::Linspace { start, end, count };
        spec.validate()?;
        Ok(spec)
    }

    /// Stepped range, numpy `arange` semantics
    pub fn arange(start: f64, stop: f64, step: f64) -> Result<Self> {
        let spec = Self::Arange { start, stop, step };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the generator parameters
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::List { ref values } => {
                if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
                    return Err(Error::InvalidSweepSpec(format!(
                        "list value {bad} is not a finite number"
                    )));
                }
            }
            Self::Linspace { start, end, count } => {
                if count == 0 {
                    return Err(Error::InvalidSweepSpec(
                        "linspace count must be at least 1".to_string(),
                    ));
                }
                if count > MAX_SWEEP_LEN {
                    return Err(Error::InvalidSweepSpec(format!(
                        "linspace count {count} exceeds the limit of {MAX_SWEEP_LEN} values"
                    )));
                }
                if !start.is_finite() || !end.is_finite() {
                    return Err(Error::InvalidSweepSpec(format!(
                        "linspace bounds {start}..{end} must be finite"
                    )));
                }
            }
            Self::Arange { start, stop, step } => {
                if step == 0.0 {
                    return Err(Error::InvalidSweepSpec(
                        "arange step cannot be zero".to_string(),
                    ));
                }
                if !start.is_finite() || !stop.is_finite() || !step.is_finite() {
                    return Err(Error::InvalidSweepSpec(format!(
                        "arange {start}:{stop}:{step} must use finite numbers"
                    )));
                }
                let count = ((stop - start) / step).ceil();
                if !count.is_finite() || count > MAX_SWEEP_LEN as f64 {
                    return Err(Error::InvalidSweepSpec(format!(
                        "arange {start}:{stop}:{step} would produce more than {MAX_SWEEP_LEN} values"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of values this segment produces
    pub fn len(&self) -> usize {
        match *self {
            Self::List { ref values } => values.len(),
            Self::Linspace { count, .. } => count,
            Self::Arange { start, stop, step } => {
                let n = ((stop - start) / step).ceil();
                if n > 0.0 {
                    n as usize
                } else {
                    0
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at position `i`, or `None` past the end
    pub fn get(&self, i: usize) -> Option<f64> {
        if i >= self.len() {
            return None;
        }
        let value = match *self {
            Self::List { ref values } => values[i],
            Self::Linspace { start, end, count } => {
                if count == 1 {
                    start
                } else if i == count - 1 {
                    // Pin the endpoint so accumulated rounding never moves it
                    end
                } else {
                    start + (i as f64) * (end - start) / ((count - 1) as f64)
                }
            }
            Self::Arange { start, step, .. } => start + (i as f64) * step,
        };
        Some(value)
    }

    /// Iterate the values of this segment
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

impl FromStr for SweepSpec {
    type Err = Error;

    /// Parse `1,10,100`, `linspace:1:2:11` or `arange:1:0:-0.25`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let number = |field: &str, text: &str| -> Result<f64> {
            text.trim().parse::<f64>().map_err(|_| {
                Error::InvalidSweepSpec(format!("invalid {field} '{text}' in '{s}'"))
            })
        };

        if let Some(rest) = s.strip_prefix("linspace:") {
            let parts: Vec<&str> = rest.split(':').collect();
            if parts.len() != 3 {
                return Err(Error::InvalidSweepSpec(format!(
                    "'{s}' must be in format 'linspace:start:end:count'"
                )));
            }
            let count: i64 = parts[2].trim().parse().map_err(|_| {
                Error::InvalidSweepSpec(format!("invalid count '{}' in '{s}'", parts[2]))
            })?;
            if count <= 0 {
                return Err(Error::InvalidSweepSpec(format!(
                    "linspace count must be at least 1, got {count}"
                )));
            }
            return Self::linspace(
                number("start", parts[0])?,
                number("end", parts[1])?,
                count as usize,
            );
        }

        if let Some(rest) = s.strip_prefix("arange:") {
            let parts: Vec<&str> = rest.split(':').collect();
            if parts.len() != 3 {
                return Err(Error::InvalidSweepSpec(format!(
                    "'{s}' must be in format 'arange:start:stop:step'"
                )));
            }
            return Self::arange(
                number("start", parts[0])?,
                number("stop", parts[1])?,
                number("step", parts[2])?,
            );
        }

        if s.is_empty() {
            return Err(Error::InvalidSweepSpec("empty sweep".to_string()));
        }
        let values = s
            .split(',')
            .map(|v| number("value", v))
            .collect::<Result<Vec<_>>>()?;
        Self::list(values)
    }
}

impl fmt::Display for SweepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List { values } => {
                let text: Vec<String> = values.iter().map(|v| canonical(*v)).collect();
                write!(f, "{}", text.join(","))
            }
            Self::Linspace { start, end, count } => write!(f, "linspace:{start}:{end}:{count}"),
            Self::Arange { start, stop, step } => write!(f, "arange:{start}:{stop}:{step}"),
        }
    }
}

/// Ordered concatenation of sweep segments
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sweep {
    segments: Vec<SweepSpec>,
}

impl Sweep {
    /// Build a sweep from validated segments, run back to back
    pub fn new(segments: Vec<SweepSpec>) -> Result<Self> {
        for segment in &segments {
            segment.validate()?;
        }
        check_total(&segments)?;
        Ok(Self { segments })
    }

    /// Sweep over an explicit list
    pub fn from_values(values: impl Into<Vec<f64>>) -> Result<Self> {
        Self::new(vec![SweepSpec::list(values)?])
    }

    /// Append another sweep after this one
    pub fn chain(mut self, other: Sweep) -> Result<Self> {
        self.segments.extend(other.segments);
        check_total(&self.segments)?;
        Ok(self)
    }

    pub fn segments(&self) -> &[SweepSpec] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        total_len(&self.segments).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate all values in sweep order
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.segments.iter().flat_map(SweepSpec::values)
    }

    /// Materialize the sweep
    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }
}

fn total_len(segments: &[SweepSpec]) -> Option<usize> {
    segments
        .iter()
        .try_fold(0usize, |total, segment| total.checked_add(segment.len()))
}

fn check_total(segments: &[SweepSpec]) -> Result<()> {
    match total_len(segments) {
        Some(total) if total <= MAX_SWEEP_LEN => Ok(()),
        _ => Err(Error::InvalidSweepSpec(format!(
            "sweep has more than {MAX_SWEEP_LEN} values"
        ))),
    }
}

/// Canonical decimal text for a parameter value
///
/// This is the text handed to the external program and written to batch
/// input files: the shortest representation that parses back to the same
/// value (`1`, `0.5`, `1.1`).
pub fn canonical(value: f64) -> String {
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_list_preserves_order() {
        let sweep = Sweep::from_values(vec![1.0, 10.0, 100.0]).unwrap();
        assert_eq!(sweep.to_vec(), vec![1.0, 10.0, 100.0]);
        // Restartable
        assert_eq!(sweep.to_vec(), sweep.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_linspace_eleven_values() {
        let spec = SweepSpec::linspace(1.0, 2.0, 11).unwrap();
        let values: Vec<f64> = spec.values().collect();
        assert_eq!(values.len(), 11);
        assert_eq!(values[0], 1.0);
        assert_eq!(values[10], 2.0);
        for pair in values.windows(2) {
            assert!(approx(pair[1] - pair[0], 0.1), "{:?}", pair);
        }
    }

    #[test]
    fn test_linspace_single_value() {
        let spec = SweepSpec::linspace(3.0, 7.0, 1).unwrap();
        assert_eq!(spec.values().collect::<Vec<_>>(), vec![3.0]);
    }

    #[test]
    fn test_arange_negative_step_excludes_stop() {
        let spec = SweepSpec::arange(1.0, 0.0, -0.25).unwrap();
        assert_eq!(spec.values().collect::<Vec<_>>(), vec![1.0, 0.75, 0.5, 0.25]);
    }

    #[test]
    fn test_arange_wrong_direction_is_empty() {
        let spec = SweepSpec::arange(0.0, 1.0, -0.5).unwrap();
        assert!(spec.is_empty());
    }

    #[test]
    fn test_invalid_specs() {
        assert!(matches!(
            SweepSpec::linspace(1.0, 2.0, 0),
            Err(Error::InvalidSweepSpec(_))
        ));
        assert!(matches!(
            SweepSpec::arange(1.0, 2.0, 0.0),
            Err(Error::InvalidSweepSpec(_))
        ));
        assert!(matches!(
            SweepSpec::list(vec![1.0, f64::NAN]),
            Err(Error::InvalidSweepSpec(_))
        ));
        assert!(matches!(
            "linspace:1:2:-3".parse::<SweepSpec>(),
            Err(Error::InvalidSweepSpec(_))
        ));
    }

    #[test]
    fn test_parse_specs() {
        assert_eq!(
            "1,10,100".parse::<SweepSpec>().unwrap(),
            SweepSpec::List {
                values: vec![1.0, 10.0, 100.0]
            }
        );
        assert_eq!(
            "linspace:1:2:11".parse::<SweepSpec>().unwrap(),
            SweepSpec::Linspace {
                start: 1.0,
                end: 2.0,
                count: 11
            }
        );
        assert_eq!(
            "arange:1:0:-0.25".parse::<SweepSpec>().unwrap(),
            SweepSpec::Arange {
                start: 1.0,
                stop: 0.0,
                step: -0.25
            }
        );
        assert!("linspace:1:2".parse::<SweepSpec>().is_err());
        assert!("1,abc".parse::<SweepSpec>().is_err());
    }

    #[test]
    fn test_chain_runs_back_to_back() {
        let first = Sweep::from_values(vec![1.0, 10.0, 100.0]).unwrap();
        let second = Sweep::from_values(vec![1.0, 0.5, 0.25]).unwrap();
        let sweep = first.chain(second).unwrap();
        assert_eq!(sweep.len(), 6);
        assert_eq!(sweep.to_vec(), vec![1.0, 10.0, 100.0, 1.0, 0.5, 0.25]);
    }

    #[test]
    fn test_oversized_arange_rejected() {
        assert!(matches!(
            SweepSpec::arange(0.0, 1e300, 1e-300),
            Err(Error::InvalidSweepSpec(_))
        ));
        assert!(matches!(
            SweepSpec::arange(-1e308, 1e308, 1.0),
            Err(Error::InvalidSweepSpec(_))
        ));
        assert!("arange:0:1e300:1e-300".parse::<SweepSpec>().is_err());
        assert!(SweepSpec::linspace(0.0, 1.0, MAX_SWEEP_LEN + 1).is_err());
    }

    #[test]
    fn test_unvalidated_segment_rejected_by_sweep() {
        let huge = SweepSpec::Arange {
            start: 0.0,
            stop: 1e300,
            step: 1e-300,
        };
        let tail = SweepSpec::list(vec![1.0]).unwrap();
        assert!(matches!(
            Sweep::new(vec![huge, tail]),
            Err(Error::InvalidSweepSpec(_))
        ));
    }

    #[test]
    fn test_chain_past_limit_rejected() {
        let half = MAX_SWEEP_LEN / 2 + 1;
        let first = Sweep::new(vec![SweepSpec::linspace(0.0, 1.0, half).unwrap()]).unwrap();
        let second = Sweep::new(vec![SweepSpec::linspace(1.0, 2.0, half).unwrap()]).unwrap();
        assert_eq!(first.len(), half);
        assert!(matches!(first.chain(second), Err(Error::InvalidSweepSpec(_))));
    }

    #[test]
    fn test_canonical_text() {
        assert_eq!(canonical(1.0), "1");
        assert_eq!(canonical(0.5), "0.5");
        assert_eq!(canonical(100.0), "100");
        assert_eq!(canonical(0.1).parse::<f64>().unwrap(), 0.1);
    }
}
