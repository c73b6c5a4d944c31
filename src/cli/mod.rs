//! CLI command handling
//!
//! Builds a pipeline from config and flags, runs it, and prints the report.

use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;

use crate::aggregate::{ResultTable, SortKey};
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::format::{format_table, TableFormat};
use crate::parser::NumericScraper;
use crate::pipeline::{FailurePolicy, Pipeline, PipelineOptions, RunReport, Schedule};
use crate::runner::{self, BatchRunner, CommandMode, CommandTemplate};
use crate::sweep::{canonical, Sweep, SweepSpec};

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Every sweep value produced a result
    Complete,
    /// Some positions are gaps, or the run was cancelled
    Incomplete,
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: &Config) -> Result<Status> {
    match command {
        Commands::Values { sweeps } => {
            let sweep = Sweep::new(sweeps)?;
            for value in sweep.iter() {
                println!("{}", canonical(value));
            }
            Ok(Status::Complete)
        }

        Commands::Run {
            sweeps,
            program,
            args,
            workers,
            timeout,
            fail_fast,
            unsafe_shell,
            sort,
            json,
            raw_output,
        } => {
            let sweep = Sweep::new(sweeps)?;

            let mode = if unsafe_shell {
                CommandMode::Shell
            } else {
                config.runner.mode
            };
            let args = if args.is_empty() {
                config.runner.args.clone()
            } else {
                args
            };
            let program = program.unwrap_or_else(|| config.runner.program.clone());
            let template = template_for(program, args, mode)?;

            let workers = workers.unwrap_or(config.pool.workers);
            if workers == 0 {
                return Err(Error::Config("--workers must be at least 1".to_string()));
            }
            let options = PipelineOptions {
                schedule: Schedule::with_workers(workers),
                policy: if fail_fast {
                    FailurePolicy::FailFast
                } else {
                    config.policy.failure
                },
                deadline: deadline(timeout.or(config.runner.timeout_secs))?,
                keep_raw_output: raw_output.is_some(),
            };

            let pipeline = Pipeline::new(template).with_options(options);
            let token = pipeline.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            });

            let report = pipeline.run(&sweep).await?;

            if let Some(path) = raw_output {
                write_raw_outputs(&path, &report)?;
            }

            let status = if report.has_gaps() || report.cancelled {
                Status::Incomplete
            } else {
                Status::Complete
            };

            if json {
                let mut report = report;
                report.table = report.table.sorted_by(sort);
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_table(&report.table, sort, &config.table);
                print_summary(&report);
            }

            Ok(status)
        }

        Commands::Batch {
            sweeps,
            program,
            dir,
            input_file,
            output_file,
            archive_file,
            timeout,
            sort,
            json,
        } => {
            let sweep = Sweep::new(sweeps)?;

            let mut files = config.batch.clone();
            if let Some(dir) = dir {
                files.dir = dir;
            }
            if let Some(name) = input_file {
                files.input = name;
            }
            if let Some(name) = output_file {
                files.output = name;
            }
            if let Some(name) = archive_file {
                files.archive = name;
            }

            let program = program.unwrap_or_else(|| config.runner.batch_program.clone());
            let template = template_for(program, Vec::new(), CommandMode::Argv)?;
            let runner = BatchRunner::new(template, files)
                .with_column(config.table.input_label.clone());

            let outcome = runner
                .run(&sweep, deadline(timeout.or(config.runner.timeout_secs))?)
                .await?;
            println!(
                "Batch output archived to {}",
                outcome.archive.display().to_string().green()
            );

            let table = runner::read_output_file(&outcome.archive, &sweep, &NumericScraper)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&table.sorted_by(sort))?);
            } else {
                print_table(&table, sort, &config.table);
            }

            Ok(if table.gaps().next().is_some() {
                Status::Incomplete
            } else {
                Status::Complete
            })
        }
    }
}

/// Parse a list of sweep spec strings
pub fn parse_sweeps(specs: &[&str]) -> Result<Sweep> {
    let specs = specs
        .iter()
        .map(|s| s.parse::<SweepSpec>())
        .collect::<Result<Vec<_>>>()?;
    Sweep::new(specs)
}

/// Command template for a program given on the command line or in config
fn template_for(program: PathBuf, args: Vec<String>, mode: CommandMode) -> Result<CommandTemplate> {
    // Relative paths are anchored here, before any working directory change
    let program = program.canonicalize().unwrap_or(program);
    let template = CommandTemplate::new(program).with_args(args).with_mode(mode);
    match mode {
        // The shell does its own lookup
        CommandMode::Shell => Ok(template),
        CommandMode::Argv => template.resolve(),
    }
}

fn deadline(secs: Option<f64>) -> Result<Option<Duration>> {
    match secs {
        None => Ok(None),
        Some(s) if s > 0.0 && s.is_finite() => Ok(Some(Duration::from_secs_f64(s))),
        Some(s) => Err(Error::Config(format!(
            "timeout must be a positive number of seconds, got {s}"
        ))),
    }
}

fn print_table(table: &ResultTable, sort: SortKey, layout: &TableFormat) {
    let table = table.sorted_by(sort);
    let text = format_table(&table, layout);
    for line in text.lines() {
        if line.contains("failed:") {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
    }
}

fn print_summary(report: &RunReport) {
    if report.cancelled {
        eprintln!("{}", "Run cancelled before every value finished".yellow().bold());
    }
    if report.has_gaps() {
        let indices: Vec<String> = report.failed.iter().map(|i| i.to_string()).collect();
        eprintln!(
            "{} {}",
            "Failed invocations:".red().bold(),
            indices.join(", ")
        );
    }
    match report.last_exit_code {
        Some(code) => eprintln!("The last return code was {}", code),
        None => eprintln!("No invocation ran to completion"),
    }
}

fn write_raw_outputs(path: &std::path::Path, report: &RunReport) -> Result<()> {
    let content: String = report
        .raw_outputs
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    std::fs::write(path, content).map_err(|e| Error::FileWrite {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    tracing::info!(path = %path.display(), "Wrote captured output");
    Ok(())
}
