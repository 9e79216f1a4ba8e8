//! CLI argument parsing for coldtrace

use crate::coldstart_file::{Comparison, Section};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Output format for the analysis report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Sectioned `.coldstart` text document (default)
    Text,
    /// Structured report as JSON
    Json,
}

/// Ledger section to compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Metric {
    /// Host JIT times
    Jit,
    /// Language worker JIT times
    WorkerJit,
    /// Language worker assembly loader times
    WorkerAsmLoader,
}

impl From<Metric> for Section {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Jit => Section::Jit,
            Metric::WorkerJit => Section::WorkerJit,
            Metric::WorkerAsmLoader => Section::WorkerAssemblyLoader,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompareMode {
    /// Names present in both files
    Shared,
    /// Names present in only one file
    Diff,
    /// Times of every name in the first file, side by side
    MethodTimes,
}

impl From<CompareMode> for Comparison {
    fn from(mode: CompareMode) -> Self {
        match mode {
            CompareMode::Shared => Comparison::Shared,
            CompareMode::Diff => Comparison::Diff,
            CompareMode::MethodTimes => Comparison::MethodTimes,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "coldtrace")]
#[command(version)]
#[command(
    about = "Cold-start trace correlation: attribute JIT, GC, disk and CPU time to the processes of one cold start",
    long_about = None
)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze one decoded trace (JSON Lines event feed)
    Analyze(AnalyzeArgs),
    /// Compare one ledger section across two .coldstart files
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Event feed, one JSON event per line
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Substring identifying the cold-start request URL (default: SLA /api/ sites)
    #[arg(value_name = "URL_PATTERN")]
    pub url_pattern: Option<String>,

    /// Where to write the .coldstart document (default: derived from TRACE)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Skip writing the .coldstart document
    #[arg(long = "no-output-file", conflicts_with = "output")]
    pub no_output_file: bool,

    /// Format of the report printed to stdout
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Analyzer configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl AnalyzeArgs {
    /// Explicit `--output`, else derived from the trace file name
    pub fn output_path(&self) -> Option<PathBuf> {
        if self.no_output_file {
            return None;
        }
        Some(
            self.output
                .clone()
                .unwrap_or_else(|| default_output_path(&self.trace)),
        )
    }
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Section to compare
    #[arg(long, value_enum, default_value = "jit")]
    pub metric: Metric,

    /// Comparison to run
    #[arg(long, value_enum, default_value = "shared")]
    pub mode: CompareMode,

    /// First .coldstart file
    pub left: PathBuf,

    /// Second .coldstart file
    pub right: PathBuf,
}

/// `<dir>/<name>.coldstart`; a name like `site-Profile.etl` becomes `site`
pub fn default_output_path(trace: &Path) -> PathBuf {
    let file_name = trace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let stem = match file_name.find("Profile") {
        Some(idx) if idx > 0 => {
            let mut prefix = file_name[..idx].to_string();
            prefix.pop();
            prefix
        }
        _ => file_name,
    };

    trace.with_file_name(format!("{stem}.coldstart"))
}
