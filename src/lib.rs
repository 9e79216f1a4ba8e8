//! coldtrace - cold-start trace correlation
//!
//! Reads a decoded trace (one JSON event per line), finds the single
//! cold-start request window, works out which processes played the host,
//! secondary-service and language-worker roles, and attributes JIT, GC,
//! assembly/type loading, disk, hard-fault and CPU time to them.
//!
//! ```no_run
//! use coldtrace::config::AnalyzerConfig;
//! use coldtrace::correlator::Correlator;
//! use coldtrace::feed::EventFeed;
//!
//! let feed = EventFeed::from_jsonl_file("trace.jsonl")?;
//! let config = AnalyzerConfig::default().with_url_pattern("/api/httptrigger");
//! let report = Correlator::new(config).analyze(feed.events())?;
//! println!("{}", report.render_text());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cli;
pub mod coldstart_file;
pub mod config;
pub mod correlator;
pub mod error;
pub mod event;
pub mod feed;
pub mod ledger;
pub mod metrics;
pub mod report;
pub mod roles;
pub mod telemetry;
pub mod window;
