//! Cold-start window detection
//!
//! The window is the half-open interval `(start, end]` between the front-end
//! receiving the request under test and the matching request-end event. The
//! detector only classifies events into [`WindowSignal`]s; the correlator
//! decides what a signal means for its current state (open, reset, close).

use crate::config::AnalyzerConfig;
use crate::error::EventError;
use crate::event::{EventKind, TraceEvent};
use serde::{Deserialize, Serialize};

/// Case-insensitive request URL filter
#[derive(Debug, Clone)]
pub struct UrlFilter {
    pattern: String,
    prefixes: Vec<String>,
    marker: String,
}

impl UrlFilter {
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            pattern: config.url_pattern.to_lowercase(),
            prefixes: config
                .default_url_prefixes
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            marker: config.default_url_marker.to_lowercase(),
        }
    }

    /// An explicit pattern is a substring match; without one the URL must
    /// start with a default prefix and contain the default marker.
    pub fn matches(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        if !self.pattern.is_empty() {
            return url.contains(&self.pattern);
        }
        self.prefixes.iter().any(|p| url.starts_with(p)) && url.contains(&self.marker)
    }

    /// Path marker every API request URL carries
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Needle for free-form argument lists (pattern, or the marker)
    pub fn needle(&self) -> &str {
        if self.pattern.is_empty() {
            &self.marker
        } else {
            &self.pattern
        }
    }
}

/// How the current window was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowSource {
    /// Front-end request-start / request-end pair
    #[default]
    Request,
    /// Diagnostic activity start/stop inside the host (local placeholder mode)
    Placeholder,
}

/// The cold-start request under analysis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColdStartWindow {
    pub start_ms: Option<f64>,
    pub end_ms: Option<f64>,
    pub correlation_id: Option<String>,
    pub source: WindowSource,
    pub http_status: i64,
    pub app_name: String,
    pub activity_id: String,
    pub host_version: String,
}

impl ColdStartWindow {
    pub fn is_open(&self) -> bool {
        self.start_ms.is_some() && self.end_ms.is_none()
    }

    /// `(start, end]`; an unresolved end is treated as +infinity
    pub fn contains(&self, timestamp: f64) -> bool {
        match self.start_ms {
            Some(start) => timestamp > start && timestamp <= self.end_ms.unwrap_or(f64::INFINITY),
            None => false,
        }
    }

    /// Strictly after the window start, regardless of the end
    pub fn after_start(&self, timestamp: f64) -> bool {
        self.start_ms.is_some_and(|start| timestamp > start)
    }

    pub fn duration_ms(&self) -> Option<f64> {
        Some(self.end_ms? - self.start_ms?)
    }

    pub(crate) fn open(&mut self, start: &WindowStart) {
        self.start_ms = Some(start.timestamp);
        self.correlation_id = start.correlation_id.clone();
        self.source = start.source;
    }

    pub(crate) fn close(&mut self, end: &WindowEnd) {
        self.end_ms = Some(end.timestamp);
        self.http_status = end.http_status;
    }

    /// Host log line summarizing the executed request
    pub(crate) fn record_app_details(&mut self, event: &TraceEvent) {
        if event.payload.text_or_empty("EventName") != "ExecutedHttpRequest" {
            return;
        }
        self.app_name = event.payload.text_or_empty("AppName");
        self.host_version = event.payload.text_or_empty("HostVersion");
        if let Some(id) = request_id_from_summary(&event.payload.text_or_empty("Summary")) {
            self.activity_id = id;
        }
    }
}

/// Extract the request id from either `requestId: "<id>"` or `"requestId":"<id>"`
pub fn request_id_from_summary(summary: &str) -> Option<String> {
    let start = summary.find("requestId")? + "requestId".len();
    let rest = summary[start..].trim_start_matches('"').trim_start();
    let rest = rest.strip_prefix(':')?.trim_start().trim_start_matches('"');
    let id: String = rest.chars().take_while(|c| *c != '"' && *c != ',').collect();
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowStart {
    pub timestamp: f64,
    pub correlation_id: Option<String>,
    pub source: WindowSource,
    /// Placeholder-mode starts identify the host directly
    pub host_pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowEnd {
    pub timestamp: f64,
    pub http_status: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowSignal {
    Start(WindowStart),
    End(WindowEnd),
}

/// Classifies events that open or close the cold-start window
#[derive(Debug, Clone)]
pub struct WindowDetector {
    filter: UrlFilter,
    forwarder_app_pool: String,
    host_process_name: String,
}

impl WindowDetector {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            filter: UrlFilter::from_config(config),
            forwarder_app_pool: config.forwarder_app_pool.clone(),
            host_process_name: config.host_process_name.to_lowercase(),
        }
    }

    pub fn detect(
        &self,
        event: &TraceEvent,
        kind: EventKind,
        window: &ColdStartWindow,
    ) -> Result<Option<WindowSignal>, EventError> {
        match kind {
            EventKind::RequestStart => self.request_start(event),
            EventKind::ActivityStart if self.in_host_process(event) => {
                Ok(self.placeholder_start(event))
            }
            EventKind::RequestEnd => self.request_end(event, window),
            EventKind::ActivityStop
                if window.source == WindowSource::Placeholder && self.in_host_process(event) =>
            {
                Ok(Some(WindowSignal::End(WindowEnd {
                    timestamp: event.timestamp,
                    http_status: 200,
                })))
            }
            _ => Ok(None),
        }
    }

    fn in_host_process(&self, event: &TraceEvent) -> bool {
        event
            .process_name
            .to_lowercase()
            .contains(&self.host_process_name)
    }

    fn request_start(&self, event: &TraceEvent) -> Result<Option<WindowSignal>, EventError> {
        if event.payload.text_or_empty("AppPoolId") != self.forwarder_app_pool {
            return Ok(None);
        }
        let url = event.payload.str_field("RequestURL")?;
        if !self.filter.matches(url) {
            return Ok(None);
        }
        let correlation_id = event.payload.guid_field("ContextId")?;

        Ok(Some(WindowSignal::Start(WindowStart {
            timestamp: event.timestamp,
            correlation_id: Some(correlation_id),
            source: WindowSource::Request,
            host_pid: None,
        })))
    }

    fn placeholder_start(&self, event: &TraceEvent) -> Option<WindowSignal> {
        let args = event.payload.list_field("Arguments").ok()?;
        let request = args.get(2)?;
        if !request.contains_text(self.filter.marker()) {
            return None;
        }

        Some(WindowSignal::Start(WindowStart {
            timestamp: event.timestamp,
            correlation_id: None,
            source: WindowSource::Placeholder,
            host_pid: Some(event.process_id),
        }))
    }

    fn request_end(
        &self,
        event: &TraceEvent,
        window: &ColdStartWindow,
    ) -> Result<Option<WindowSignal>, EventError> {
        let Some(expected) = window.correlation_id.as_deref() else {
            return Ok(None);
        };
        if event.payload.guid_field("ContextId")? != expected {
            return Ok(None);
        }
        let http_status = event.payload.i64_field("HttpStatus").unwrap_or(0);

        Ok(Some(WindowSignal::End(WindowEnd {
            timestamp: event.timestamp,
            http_status,
        })))
    }
}
