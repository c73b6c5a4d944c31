//! The sweep pipeline
//!
//! A [`Pipeline`] is built once per run from a command template, a launcher,
//! a parser and options. [`Pipeline::run`] drives every sweep value through
//! launch, capture and parse, and collects the outcomes in a
//! [`ResultAggregator`]. Nothing is kept in process-wide state: the sweep,
//! outputs and table are passed between stages explicitly.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::aggregate::{GapReason, ResultAggregator, ResultTable};
use crate::common::{Error, Result};
use crate::parser::{NumericScraper, OutputParser};
use crate::runner::{CommandTemplate, Invocation, Launcher, ProcessRunner};
use crate::sweep::Sweep;

/// What to do when one invocation fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record a gap and carry on with the remaining values
    #[default]
    ContinueOnError,
    /// Stop the run at the first failed invocation
    FailFast,
}

/// How invocations are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Schedule {
    /// One at a time, in sweep order
    #[default]
    Sequential,
    /// Up to `workers` processes at once
    Pool { workers: usize },
}

impl Schedule {
    /// Sequential for one worker, a pool otherwise
    pub fn with_workers(workers: usize) -> Self {
        if workers <= 1 {
            Self::Sequential
        } else {
            Self::Pool { workers }
        }
    }
}

/// Per-run settings
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub schedule: Schedule,
    pub policy: FailurePolicy,
    /// Per-invocation deadline
    pub deadline: Option<Duration>,
    /// Keep each invocation's stdout on the report
    pub keep_raw_output: bool,
}

/// Cancels a running pipeline from outside
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Rows in sweep order
    pub table: ResultTable,
    /// Sweep positions without a result
    pub failed: Vec<usize>,
    /// Exit code of the last invocation in sweep order that ran to exit
    pub last_exit_code: Option<i32>,
    /// Whether the run was cancelled before every value finished
    pub cancelled: bool,
    /// Stdout of each invocation, when requested
    #[serde(skip)]
    pub raw_outputs: Vec<Option<String>>,
}

impl RunReport {
    pub fn has_gaps(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Exit code and stdout per sweep position
#[derive(Debug, Default, Clone)]
struct InvocationRecord {
    exit_code: Option<i32>,
    stdout: Option<String>,
}

/// State shared by concurrent invocations of one run
struct Harvest {
    aggregator: ResultAggregator,
    records: Mutex<Vec<InvocationRecord>>,
    launcher: Arc<dyn Launcher>,
    parser: Arc<dyn OutputParser>,
    deadline: Option<Duration>,
    keep_raw: bool,
}

impl Harvest {
    /// Launch, parse and record one invocation
    ///
    /// Returns the gap reason when the invocation failed. Launch errors
    /// and other fatal conditions are returned as `Err`.
    async fn invoke(&self, invocation: Invocation) -> Result<Option<GapReason>> {
        let index = invocation.index;
        let started = Instant::now();

        let captured = match self.launcher.launch(&invocation, self.deadline).await {
            Ok(captured) => captured,
            Err(Error::Timeout { secs, .. }) => {
                let reason = GapReason::Timeout { secs };
                self.aggregator.record_gap(index, reason.clone())?;
                return Ok(Some(reason));
            }
            Err(e) => return Err(e),
        };

        self.remember(index, captured.exit_code, &captured.stdout)?;

        if !captured.success {
            let reason = GapReason::ExitStatus {
                code: captured.exit_code,
                raw_text: captured.stdout,
            };
            self.aggregator.record_gap(index, reason.clone())?;
            return Ok(Some(reason));
        }

        match self.parser.parse(index, &captured) {
            Ok(parsed) => {
                tracing::debug!(
                    index,
                    input = parsed.input,
                    result = parsed.result,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Parsed result"
                );
                self.aggregator.record(parsed)?;
                Ok(None)
            }
            Err(e) => {
                let reason = GapReason::Parse {
                    raw_text: e.raw_text,
                };
                self.aggregator.record_gap(index, reason.clone())?;
                Ok(Some(reason))
            }
        }
    }

    fn remember(&self, index: usize, exit_code: Option<i32>, stdout: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::Internal("invocation records lock poisoned".to_string()))?;
        if let Some(record) = records.get_mut(index) {
            record.exit_code = exit_code;
            if self.keep_raw {
                record.stdout = Some(stdout.to_string());
            }
        }
        Ok(())
    }
}

/// Launch-capture-parse-aggregate pipeline for one run
pub struct Pipeline {
    template: Arc<CommandTemplate>,
    launcher: Arc<dyn Launcher>,
    parser: Arc<dyn OutputParser>,
    options: PipelineOptions,
    cancel: CancelToken,
}

impl Pipeline {
    /// Pipeline using real processes and the numeric scraper
    pub fn new(template: CommandTemplate) -> Self {
        Self {
            template: Arc::new(template),
            launcher: Arc::new(ProcessRunner::new()),
            parser: Arc::new(NumericScraper),
            options: PipelineOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Token that cancels this pipeline's runs
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Drive the whole sweep and return the report
    ///
    /// Under [`FailurePolicy::FailFast`] the first failed invocation stops
    /// the run with [`Error::InvocationFailed`]. Launch errors always stop
    /// the run. In-flight processes are killed whenever the run stops early.
    pub async fn run(&self, sweep: &Sweep) -> Result<RunReport> {
        let values = sweep.to_vec();
        let harvest = Arc::new(Harvest {
            aggregator: ResultAggregator::new(values.clone()),
            records: Mutex::new(vec![InvocationRecord::default(); values.len()]),
            launcher: self.launcher.clone(),
            parser: self.parser.clone(),
            deadline: self.options.deadline,
            keep_raw: self.options.keep_raw_output,
        });

        tracing::info!(
            program = %self.template.program_name(),
            values = values.len(),
            schedule = ?self.options.schedule,
            policy = ?self.options.policy,
            "Starting sweep"
        );
        let started = Instant::now();

        match self.options.schedule {
            Schedule::Sequential => self.run_sequential(&harvest, &values).await?,
            Schedule::Pool { workers } => self.run_pool(&harvest, &values, workers).await?,
        }

        let cancelled = harvest.aggregator.completed() < values.len();
        let table = harvest.aggregator.finish()?;
        let failed = table.failed_indices();

        let records = harvest
            .records
            .lock()
            .map_err(|_| Error::Internal("invocation records lock poisoned".to_string()))?;
        let last_exit_code = records.iter().rev().find_map(|r| r.exit_code);
        let raw_outputs = records.iter().map(|r| r.stdout.clone()).collect();

        tracing::info!(
            parsed = table.len() - failed.len(),
            failed = failed.len(),
            cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sweep finished"
        );

        Ok(RunReport {
            table,
            failed,
            last_exit_code,
            cancelled,
            raw_outputs,
        })
    }

    async fn run_sequential(&self, harvest: &Arc<Harvest>, values: &[f64]) -> Result<()> {
        for (index, &value) in values.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let invocation = Invocation::new(index, value, self.template.clone());

            // Losing the race drops the launch future, which kills the child
            let outcome = tokio::select! {
                outcome = harvest.invoke(invocation) => outcome?,
                _ = self.cancel.cancelled() => {
                    tracing::warn!(index, "Sweep cancelled");
                    break;
                }
            };

            if let Some(reason) = outcome {
                self.on_failure(index, value, &reason)?;
            }
        }
        Ok(())
    }

    async fn run_pool(&self, harvest: &Arc<Harvest>, values: &[f64], workers: usize) -> Result<()> {
        let mut pending = values.iter().copied().enumerate();
        let mut set: JoinSet<(usize, f64, Result<Option<GapReason>>)> = JoinSet::new();

        loop {
            if !self.cancel.is_cancelled() {
                while set.len() < workers {
                    let Some((index, value)) = pending.next() else {
                        break;
                    };
                    let harvest = harvest.clone();
                    let invocation = Invocation::new(index, value, self.template.clone());
                    set.spawn(async move { (index, value, harvest.invoke(invocation).await) });
                }
            }

            let joined = tokio::select! {
                joined = set.join_next() => joined,
                _ = self.cancel.cancelled() => {
                    tracing::warn!(in_flight = set.len(), "Sweep cancelled");
                    set.shutdown().await;
                    return Ok(());
                }
            };

            let Some(joined) = joined else {
                return Ok(());
            };
            let (index, value, outcome) =
                joined.map_err(|e| Error::Internal(format!("invocation task failed: {e}")))?;

            let step = match outcome {
                Ok(Some(reason)) => self.on_failure(index, value, &reason),
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = step {
                set.shutdown().await;
                return Err(e);
            }
        }
    }

    /// Apply the failure policy to a failed invocation
    fn on_failure(&self, index: usize, value: f64, reason: &GapReason) -> Result<()> {
        match self.options.policy {
            FailurePolicy::ContinueOnError => {
                tracing::warn!(index, value, %reason, "Invocation failed, continuing");
                Ok(())
            }
            FailurePolicy::FailFast => {
                tracing::error!(index, value, %reason, "Invocation failed, stopping sweep");
                Err(Error::InvocationFailed {
                    index,
                    reason: reason.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CapturedOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers like the area program, after a delay that shrinks as the
    /// value grows so larger values finish first
    struct FakeArea {
        delay_per_unit: Duration,
        garbage_on: Option<f64>,
        fail_on: Option<f64>,
        launches: AtomicUsize,
    }

    impl FakeArea {
        fn new() -> Self {
            Self {
                delay_per_unit: Duration::ZERO,
                garbage_on: None,
                fail_on: None,
                launches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Launcher for FakeArea {
        async fn launch(
            &self,
            invocation: &Invocation,
            deadline: Option<Duration>,
        ) -> Result<CapturedOutput> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            let value = invocation.value;
            let delay = self.delay_per_unit.mul_f64((10.0 - value).max(0.0));
            if let Some(limit) = deadline {
                if delay > limit {
                    tokio::time::sleep(limit).await;
                    return Err(Error::Timeout {
                        index: invocation.index,
                        secs: limit.as_secs_f64(),
                    });
                }
            }
            tokio::time::sleep(delay).await;

            if self.garbage_on == Some(value) {
                return Ok(CapturedOutput::ok("usage: area <radius>"));
            }
            if self.fail_on == Some(value) {
                return Ok(CapturedOutput {
                    stdout: String::new(),
                    stderr: "boom".to_string(),
                    exit_code: Some(3),
                    success: false,
                });
            }
            Ok(CapturedOutput::ok(format!(
                "radius = {},  area = {}\n",
                invocation.argument(),
                std::f64::consts::PI * value * value
            )))
        }
    }

    fn pipeline(fake: FakeArea, options: PipelineOptions) -> (Pipeline, Arc<FakeArea>) {
        let fake = Arc::new(fake);
        let pipeline = Pipeline::new(CommandTemplate::new("area_cmdline"))
            .with_launcher(fake.clone())
            .with_options(options);
        (pipeline, fake)
    }

    #[tokio::test]
    async fn test_sequential_preserves_sweep_order() {
        let (pipeline, _) = pipeline(FakeArea::new(), PipelineOptions::default());
        let sweep = Sweep::from_values(vec![1.0, 10.0, 100.0]).unwrap();
        let report = pipeline.run(&sweep).await.unwrap();
        assert_eq!(report.table.inputs(), vec![1.0, 10.0, 100.0]);
        assert!(!report.has_gaps());
        assert_eq!(report.last_exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_pool_out_of_order_completion_keeps_sweep_order() {
        let fake = FakeArea {
            delay_per_unit: Duration::from_millis(20),
            ..FakeArea::new()
        };
        let options = PipelineOptions {
            schedule: Schedule::with_workers(3),
            ..PipelineOptions::default()
        };
        let (pipeline, fake) = pipeline(fake, options);
        let sweep = Sweep::from_values(vec![5.0, 6.0, 7.0, 8.0, 9.0]).unwrap();
        let report = pipeline.run(&sweep).await.unwrap();
        assert_eq!(report.table.inputs(), vec![5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(fake.launches.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_parse_failure_becomes_gap_and_run_continues() {
        let fake = FakeArea {
            garbage_on: Some(10.0),
            ..FakeArea::new()
        };
        let (pipeline, _) = pipeline(fake, PipelineOptions::default());
        let sweep = Sweep::from_values(vec![1.0, 10.0, 100.0]).unwrap();
        let report = pipeline.run(&sweep).await.unwrap();

        assert_eq!(report.failed, vec![1]);
        assert_eq!(report.table.inputs(), vec![1.0, 100.0]);
        let gap = report.table.gaps().next().unwrap();
        assert_eq!(gap.value, 10.0);
        assert_eq!(
            gap.reason,
            GapReason::Parse {
                raw_text: "usage: area <radius>".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_gap_with_code() {
        let fake = FakeArea {
            fail_on: Some(2.0),
            ..FakeArea::new()
        };
        let options = PipelineOptions {
            schedule: Schedule::with_workers(2),
            ..PipelineOptions::default()
        };
        let (pipeline, _) = pipeline(fake, options);
        let sweep = Sweep::from_values(vec![1.0, 2.0, 3.0]).unwrap();
        let report = pipeline.run(&sweep).await.unwrap();
        assert_eq!(report.failed, vec![1]);
        assert!(matches!(
            report.table.gaps().next().unwrap().reason,
            GapReason::ExitStatus { code: Some(3), .. }
        ));
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        let fake = FakeArea {
            garbage_on: Some(2.0),
            ..FakeArea::new()
        };
        let options = PipelineOptions {
            policy: FailurePolicy::FailFast,
            ..PipelineOptions::default()
        };
        let (pipeline, fake) = pipeline(fake, options);
        let sweep = Sweep::from_values(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let err = pipeline.run(&sweep).await.unwrap_err();
        assert!(matches!(err, Error::InvocationFailed { index: 1, .. }));
        assert_eq!(fake.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deadline_produces_timeout_gap() {
        let fake = FakeArea {
            delay_per_unit: Duration::from_millis(50),
            ..FakeArea::new()
        };
        let options = PipelineOptions {
            deadline: Some(Duration::from_millis(100)),
            ..PipelineOptions::default()
        };
        let (pipeline, _) = pipeline(fake, options);
        // 1.0 needs 450ms, 9.5 needs 25ms
        let sweep = Sweep::from_values(vec![1.0, 9.5]).unwrap();
        let report = pipeline.run(&sweep).await.unwrap();
        assert_eq!(report.failed, vec![0]);
        assert!(matches!(
            report.table.gaps().next().unwrap().reason,
            GapReason::Timeout { .. }
        ));
        assert_eq!(report.table.inputs(), vec![9.5]);
    }

    #[tokio::test]
    async fn test_cancel_discards_in_flight_invocations() {
        let fake = FakeArea {
            delay_per_unit: Duration::from_millis(100),
            ..FakeArea::new()
        };
        let options = PipelineOptions {
            schedule: Schedule::with_workers(2),
            ..PipelineOptions::default()
        };
        let (pipeline, _) = pipeline(fake, options);
        let token = pipeline.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let sweep = Sweep::from_values(vec![1.0, 2.0, 3.0]).unwrap();
        let report = pipeline.run(&sweep).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.failed, vec![0, 1, 2]);
        assert!(report
            .table
            .gaps()
            .all(|g| g.reason == GapReason::Cancelled));
    }

    #[tokio::test]
    async fn test_sequential_cancel_leaves_cancelled_gaps() {
        let fake = FakeArea {
            delay_per_unit: Duration::from_millis(100),
            ..FakeArea::new()
        };
        let (pipeline, fake) = pipeline(fake, PipelineOptions::default());
        let token = pipeline.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            token.cancel();
        });

        // 9.5 finishes after 50ms, 1.0 is still running at 150ms
        let sweep = Sweep::from_values(vec![9.5, 1.0, 2.0]).unwrap();
        let report = pipeline.run(&sweep).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.table.inputs(), vec![9.5]);
        assert_eq!(report.failed, vec![1, 2]);
        assert!(report
            .table
            .gaps()
            .all(|g| g.reason == GapReason::Cancelled));
        assert_eq!(fake.launches.load(Ordering::SeqCst), 2);
        assert_eq!(report.last_exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_raw_output_kept_on_request() {
        let options = PipelineOptions {
            keep_raw_output: true,
            ..PipelineOptions::default()
        };
        let (pipeline, _) = pipeline(FakeArea::new(), options);
        let sweep = Sweep::from_values(vec![0.5]).unwrap();
        let report = pipeline.run(&sweep).await.unwrap();
        assert_eq!(
            report.raw_outputs[0].as_deref().map(|s| s.starts_with("radius = 0.5")),
            Some(true)
        );
    }
}
