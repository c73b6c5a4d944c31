//! CLI command definitions
//!
//! Defines the clap commands for the sweep CLI.

use clap::Subcommand;
use std::path::PathBuf;

use crate::aggregate::SortKey;
use crate::sweep::SweepSpec;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the program once per sweep value and print the result table
    Run {
        /// Sweep specs, run back to back: `1,10,100`, `linspace:1:2:11`, `arange:1:0:-0.25`
        #[arg(required = true)]
        sweeps: Vec<SweepSpec>,

        /// Program to run (default from config: ./area_cmdline)
        #[arg(long, short)]
        program: Option<PathBuf>,

        /// Fixed argument placed before the value; repeatable
        #[arg(long = "arg")]
        args: Vec<String>,

        /// Number of processes to run at once
        #[arg(long, short = 'j')]
        workers: Option<usize>,

        /// Per-invocation deadline in seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Stop the sweep at the first failed invocation
        #[arg(long)]
        fail_fast: bool,

        /// Pass the command line through the shell. Unsafe with untrusted values
        #[arg(long)]
        unsafe_shell: bool,

        /// Sort the table by this column before printing
        #[arg(long, default_value = "index")]
        sort: SortKey,

        /// Print the run report as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Also write every captured output, in sweep order, to this file
        #[arg(long)]
        raw_output: Option<PathBuf>,
    },

    /// Write the sweep to an input file and run the file-driven program once
    Batch {
        /// Sweep specs, run back to back
        #[arg(required = true)]
        sweeps: Vec<SweepSpec>,

        /// Batch program to run (default from config: ./area_files)
        #[arg(long, short)]
        program: Option<PathBuf>,

        /// Directory the batch program runs in
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Input file name the program reads
        #[arg(long)]
        input_file: Option<String>,

        /// Output file name the program writes
        #[arg(long)]
        output_file: Option<String>,

        /// Name the output file is renamed to after success
        #[arg(long)]
        archive_file: Option<String>,

        /// Deadline for the batch program in seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Sort the table by this column before printing
        #[arg(long, default_value = "index")]
        sort: SortKey,

        /// Print the table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the sweep values without launching anything
    Values {
        /// Sweep specs, run back to back
        #[arg(required = true)]
        sweeps: Vec<SweepSpec>,
    },
}
