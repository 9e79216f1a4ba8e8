//! Buffered event feed
//!
//! The external decoder hands over its output as JSON Lines, one
//! [`TraceEvent`] per line. The whole feed is materialized so the correlator
//! can iterate it a second time when it needs a replay pass.

use crate::event::TraceEvent;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// A fully materialized, timestamp-ordered event feed
#[derive(Debug, Clone, Default)]
pub struct EventFeed {
    events: Vec<TraceEvent>,
    /// Lines that were not valid events
    pub skipped_lines: usize,
}

impl EventFeed {
    pub fn from_events(mut events: Vec<TraceEvent>) -> Self {
        sort_if_needed(&mut events);
        Self {
            events,
            skipped_lines: 0,
        }
    }

    /// Load a JSON Lines feed from disk
    pub fn from_jsonl_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read event feed: {}", path.as_ref().display())
        })?;
        Ok(Self::parse_jsonl(&content))
    }

    /// Parse JSON Lines; blank lines are ignored, malformed lines skipped
    pub fn parse_jsonl(content: &str) -> Self {
        let mut events = Vec::new();
        let mut skipped_lines = 0;

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    skipped_lines += 1;
                    warn!(line = line_no + 1, error = %e, "skipping malformed feed line");
                }
            }
        }

        sort_if_needed(&mut events);
        Self {
            events,
            skipped_lines,
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

fn sort_if_needed(events: &mut [TraceEvent]) {
    let ordered = events
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp);
    if !ordered {
        debug!(events = events.len(), "feed out of order, sorting by timestamp");
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }
}
