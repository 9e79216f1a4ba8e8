use anyhow::{Context, Result};
use clap::Parser;
use coldtrace::cli::{AnalyzeArgs, Cli, Command, CompareArgs, OutputFormat};
use coldtrace::coldstart_file::{self, Section};
use coldtrace::config::AnalyzerConfig;
use coldtrace::correlator::Correlator;
use coldtrace::error::AnalysisError;
use coldtrace::feed::EventFeed;
use coldtrace::telemetry::{self, TelemetryRecord};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_NO_WINDOW: u8 = 1;
const EXIT_FAILURE: u8 = 2;

/// Initialize tracing subscriber; `--debug` forces trace level
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &AnalyzeArgs) -> Result<AnalyzerConfig> {
    let config = match &args.config {
        Some(path) => AnalyzerConfig::from_toml(path)?,
        None => AnalyzerConfig::default(),
    };
    Ok(match &args.url_pattern {
        Some(pattern) => config.with_url_pattern(pattern.clone()),
        None => config,
    })
}

fn run_analyze(args: &AnalyzeArgs) -> Result<ExitCode> {
    let config = load_config(args)?;
    if config.url_pattern.is_empty() {
        info!(filter = %config.describe_filter(), "no url pattern given, using default filter");
    }

    let feed = EventFeed::from_jsonl_file(&args.trace)?;
    let trace_name = args.trace.display().to_string();
    info!(
        trace = %trace_name,
        events = feed.len(),
        skipped_lines = feed.skipped_lines,
        "loaded event feed"
    );

    let report = match Correlator::new(config.clone()).analyze(feed.events()) {
        Ok(report) => report,
        Err(err @ AnalysisError::NoWindowFound { .. }) => {
            telemetry::emit_no_window(&trace_name);
            eprintln!("{err}");
            return Ok(ExitCode::from(EXIT_NO_WINDOW));
        }
    };

    let text = report.render_text();
    match args.format {
        OutputFormat::Text => println!("{text}"),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        ),
    }

    if let Some(path) = args.output_path() {
        match std::fs::write(&path, &text) {
            Ok(()) => info!(output = %path.display(), "wrote cold start report"),
            Err(e) => warn!(output = %path.display(), error = %e, "failed to write output file"),
        }
    }

    TelemetryRecord::from_report(&report, &trace_name, config.telemetry_max_field_len).emit();
    Ok(ExitCode::SUCCESS)
}

fn run_compare(args: &CompareArgs) -> Result<ExitCode> {
    let section = Section::from(args.metric);
    let left = coldstart_file::read_section(&args.left, section)?;
    let right = coldstart_file::read_section(&args.right, section)?;

    let file_name = |p: &std::path::Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| p.display().to_string())
    };

    let result = coldstart_file::compare(&left, &right, args.mode.into());
    print!(
        "{}",
        result.render(section, &file_name(&args.left), &file_name(&args.right))
    );
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Cli::parse();

    init_tracing(args.debug);

    let outcome = match &args.command {
        Command::Analyze(a) => run_analyze(a),
        Command::Compare(c) => run_compare(c),
    };

    outcome.unwrap_or_else(|e| {
        eprintln!("Error: {e:#}");
        ExitCode::from(EXIT_FAILURE)
    })
}
