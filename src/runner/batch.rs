//! File-driven batch mode
//!
//! The batch program takes no arguments. It reads every sweep value from a
//! fixed-name input file in its working directory and writes a fixed-name
//! output file, which is renamed to an archival name once the program has
//! exited successfully.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::aggregate::{GapReason, ResultAggregator, ResultTable};
use crate::common::{Error, Result};
use crate::parser::OutputParser;
use crate::sweep::{canonical, Sweep};

use super::{CapturedOutput, CommandTemplate, ProcessRunner};

/// Number of comment lines that open an input file
pub const INPUT_HEADER_LINES: usize = 5;

/// File names used by the batch program
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BatchFiles {
    /// Directory the batch program runs in
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Input file the program reads
    #[serde(default = "default_input")]
    pub input: String,

    /// Output file the program writes
    #[serde(default = "default_output")]
    pub output: String,

    /// Name the output file is renamed to after success
    #[serde(default = "default_archive")]
    pub archive: String,
}

impl Default for BatchFiles {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            input: default_input(),
            output: default_output(),
            archive: default_archive(),
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_input() -> String {
    "area_files.inp".to_string()
}
fn default_output() -> String {
    "area_files.out".to_string()
}
fn default_archive() -> String {
    "area_files.out2".to_string()
}

impl BatchFiles {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn input_path(&self) -> PathBuf {
        self.dir.join(&self.input)
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.join(&self.output)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dir.join(&self.archive)
    }
}

/// Write a batch input file: five comment lines, then one value per line
///
/// The file is flushed and closed before this returns.
pub fn write_input_file(path: &Path, sweep: &Sweep, program: &str, column: &str) -> Result<()> {
    let write_err = |e: std::io::Error| Error::FileWrite {
        path: path.display().to_string(),
        error: e.to_string(),
    };

    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);

    let header = [
        format!("# This is an input file for the {program} program"),
        "#  After five lines with #'s, any number of values are given".to_string(),
        "#  one to a line, with any alignment and formatting.".to_string(),
        "#".to_string(),
        format!("#   {column}"),
    ];
    debug_assert_eq!(header.len(), INPUT_HEADER_LINES);

    for line in &header {
        writeln!(writer, "{line}").map_err(write_err)?;
    }
    for value in sweep.iter() {
        writeln!(writer, "{}", canonical(value)).map_err(write_err)?;
    }
    writer.flush().map_err(write_err)?;

    tracing::debug!(path = %path.display(), values = sweep.len(), "Wrote batch input file");
    Ok(())
}

/// Read the sweep back from a batch input file
///
/// Comment lines (first character `#`) and blank lines are skipped. The
/// first whitespace-separated token of every other line is the value.
pub fn read_input_file(path: &Path) -> Result<Sweep> {
    let read_err = |e: std::io::Error| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    };

    let reader = BufReader::new(File::open(path).map_err(read_err)?);
    let mut values = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(read_err)?;
        if line.starts_with('#') {
            continue;
        }
        let Some(token) = line.split_whitespace().next() else {
            continue;
        };
        let value = token.parse::<f64>().map_err(|_| {
            Error::InvalidSweepSpec(format!(
                "{}:{}: '{}' is not a number",
                path.display(),
                line_num + 1,
                token
            ))
        })?;
        values.push(value);
    }
    Sweep::from_values(values)
}

/// Read the batch program's output file into a table
///
/// Every non-comment line is parsed as one entry, in sweep order. Positions
/// with no corresponding line are reported as gaps.
pub fn read_output_file(path: &Path, sweep: &Sweep, parser: &dyn OutputParser) -> Result<ResultTable> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    let expected = sweep.len();
    let aggregator = ResultAggregator::new(sweep.to_vec());
    let mut lines = content
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .enumerate();

    for (index, line) in lines.by_ref().take(expected) {
        match parser.parse(index, &CapturedOutput::ok(line)) {
            Ok(parsed) => aggregator.record(parsed)?,
            Err(e) => aggregator.record_gap(index, GapReason::Parse { raw_text: e.raw_text })?,
        }
    }

    let extra = lines.count();
    if extra > 0 {
        tracing::warn!(
            path = %path.display(),
            expected,
            extra,
            "Output file has more lines than the sweep; ignoring the rest"
        );
    }
    aggregator.fill_missing(GapReason::Missing)?;
    aggregator.finish()
}

/// Result of one batch run
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// What the program printed while it ran
    pub captured: CapturedOutput,
    /// Where the output file now lives
    pub archive: PathBuf,
}

/// Runs a file-driven program once for a whole sweep
#[derive(Debug, Clone)]
pub struct BatchRunner {
    template: CommandTemplate,
    files: BatchFiles,
    column: String,
}

impl BatchRunner {
    /// The template runs inside `files.dir`
    pub fn new(template: CommandTemplate, files: BatchFiles) -> Self {
        let template = template.in_dir(files.dir.clone());
        Self {
            template,
            files,
            column: "radius".to_string(),
        }
    }

    /// Label written on the last header line of the input file
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn files(&self) -> &BatchFiles {
        &self.files
    }

    /// Write the input file, run the program, archive its output
    pub async fn run(&self, sweep: &Sweep, deadline: Option<Duration>) -> Result<BatchOutcome> {
        let input = self.files.input_path();
        let program = self
            .template
            .program_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.template.program_name());
        write_input_file(&input, sweep, &program, &self.column)?;

        tracing::info!(program = %self.template.program_name(), values = sweep.len(), "Running batch program");
        let captured = ProcessRunner::new()
            .run(&self.template, None, deadline, 0)
            .await?;

        for line in captured.stdout.lines() {
            tracing::debug!(line, "batch program output");
        }

        if !captured.success {
            return Err(Error::BatchFailed(captured.exit_code));
        }

        let from = self.files.output_path();
        let to = self.files.archive_path();
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| Error::rename(&from, &to, e))?;
        tracing::info!(archive = %to.display(), "Archived batch output");

        Ok(BatchOutcome {
            captured,
            archive: to,
        })
    }
}
