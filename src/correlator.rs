//! Cold-start correlation driver
//!
//! Streams the feed once to find the window and the host, falls back to a
//! single replay pass when the host can't be resolved, and assembles the
//! [`ColdStartReport`]. All mutable analysis state lives in one [`Correlator`];
//! independent analyses share nothing.
//!
//! # State machine
//!
//! ```text
//! SeekingWindow --start--> WindowOpen --end--> WindowClosed
//!   WindowClosed --end--> WindowClosed (ignored, the end is final)
//!   WindowOpen   --start--> WindowOpen   (reset, keep only the later start)
//!   WindowClosed --start--> WindowOpen   (reset, new subject)
//!   WindowOpen|WindowClosed --eos, host known--> Finalized
//!   WindowOpen|WindowClosed --eos, no host-----> Replaying (reset, pin fallback host)
//!   Replaying     --eos--> Finalized
//!   SeekingWindow --eos--> no window found
//! ```

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, EventError};
use crate::event::{EventKind, TraceEvent};
use crate::metrics::MetricsAccumulator;
use crate::report::ColdStartReport;
use crate::roles::{ProcessRoles, Role, RoleResolver};
use crate::window::{ColdStartWindow, WindowDetector, WindowSignal};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelatorState {
    SeekingWindow,
    WindowOpen,
    WindowClosed,
    Replaying,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    QualifyingStart,
    MatchingEnd,
    EndOfStream { host_resolved: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Ignore,
    Open,
    ResetAndOpen,
    Close,
    Replay,
    Finalize,
    Fail,
}

impl CorrelatorState {
    /// Transition table
    fn on(self, signal: Signal) -> (CorrelatorState, Action) {
        use CorrelatorState::*;
        match (self, signal) {
            (SeekingWindow, Signal::QualifyingStart) => (WindowOpen, Action::Open),
            (WindowOpen | WindowClosed, Signal::QualifyingStart) => {
                (WindowOpen, Action::ResetAndOpen)
            }
            (WindowOpen, Signal::MatchingEnd) => (WindowClosed, Action::Close),
            // a closed window's end is final
            (WindowClosed, Signal::MatchingEnd) => (WindowClosed, Action::Ignore),
            (SeekingWindow, Signal::MatchingEnd) => (SeekingWindow, Action::Ignore),
            (SeekingWindow, Signal::EndOfStream { .. }) => (Finalized, Action::Fail),
            (WindowOpen | WindowClosed, Signal::EndOfStream { host_resolved: false }) => {
                (Replaying, Action::Replay)
            }
            (WindowOpen | WindowClosed, Signal::EndOfStream { host_resolved: true }) => {
                (Finalized, Action::Finalize)
            }
            (Replaying, Signal::EndOfStream { .. }) => (Finalized, Action::Finalize),
            // the replay keeps the discovery pass' window
            (Replaying, _) => (Replaying, Action::Ignore),
            (Finalized, _) => (Finalized, Action::Ignore),
        }
    }
}

/// One cold-start analysis
#[derive(Debug)]
pub struct Correlator {
    config: AnalyzerConfig,
    detector: WindowDetector,
    resolver: RoleResolver,
    state: CorrelatorState,
    window: ColdStartWindow,
    roles: ProcessRoles,
    metrics: MetricsAccumulator,
    passes: u32,
    skipped_events: u64,
}

impl Correlator {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            detector: WindowDetector::new(&config),
            resolver: RoleResolver::new(&config),
            config,
            state: CorrelatorState::SeekingWindow,
            window: ColdStartWindow::default(),
            roles: ProcessRoles::default(),
            metrics: MetricsAccumulator::new(),
            passes: 0,
            skipped_events: 0,
        }
    }

    pub fn state(&self) -> CorrelatorState {
        self.state
    }

    /// Run the whole analysis over a buffered feed
    ///
    /// # Errors
    /// [`AnalysisError::NoWindowFound`] when no request-start event matches the
    /// URL filter anywhere in the feed.
    pub fn analyze(mut self, events: &[TraceEvent]) -> Result<ColdStartReport, AnalysisError> {
        self.scan(events);

        let host_resolved = self.roles.is_resolved(Role::Host);
        if self.transition(Signal::EndOfStream { host_resolved }) == Action::Fail {
            warn!(filter = %self.config.describe_filter(), "no cold start window found");
            return Err(AnalysisError::NoWindowFound {
                filter: self.config.describe_filter(),
            });
        }

        if self.state == CorrelatorState::Replaying {
            let fallback = self.resolver.fallback_host(events, &self.window);
            self.begin_replay(fallback);
            self.scan(events);
            self.transition(Signal::EndOfStream {
                host_resolved: self.roles.is_resolved(Role::Host),
            });
        }

        if self.window.end_ms.is_none() {
            warn!(
                start_ms = self.window.start_ms,
                "cold start window never closed; duration unavailable"
            );
        }

        Ok(ColdStartReport::build(
            &self.window,
            &self.roles,
            &self.metrics,
            self.passes,
            self.skipped_events,
        ))
    }

    fn transition(&mut self, signal: Signal) -> Action {
        let (next, action) = self.state.on(signal);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, ?signal, "correlator transition");
        }
        self.state = next;
        action
    }

    fn scan(&mut self, events: &[TraceEvent]) {
        self.passes += 1;
        for event in events {
            if let Err(e) = self.process_event(event) {
                self.skipped_events += 1;
                trace!(
                    timestamp = event.timestamp,
                    provider = %event.provider_name,
                    event = %event.event_name,
                    error = %e,
                    "skipping malformed event"
                );
            }
        }
    }

    fn process_event(&mut self, event: &TraceEvent) -> Result<(), EventError> {
        let kind = event.kind();

        let signal = match kind {
            Some(kind) if self.state != CorrelatorState::Replaying => {
                self.detector.detect(event, kind, &self.window)?
            }
            _ => None,
        };

        if let Some(WindowSignal::Start(start)) = &signal {
            match self.transition(Signal::QualifyingStart) {
                Action::Open => {}
                Action::ResetAndOpen => {
                    info!(
                        previous_start_ms = self.window.start_ms,
                        new_start_ms = start.timestamp,
                        "later cold start found, discarding earlier window"
                    );
                    self.reset();
                }
                _ => return Ok(()),
            }
            self.window.open(start);
            if let Some(pid) = start.host_pid {
                self.roles.resolve(Role::Host, pid);
            }
            debug!(start_ms = start.timestamp, "cold start window opened");
        }

        if let Some(kind) = kind {
            self.resolver
                .resolve_host(event, kind, &self.window, &mut self.roles)?;
        }

        if self.window.contains(event.timestamp) {
            self.record_in_window(event, kind)?;
        }

        if kind == Some(EventKind::ProcessRundown) && self.roles.is_resolved(Role::Host) {
            self.metrics
                .record_rundown(event, self.config.command_line_max_len)?;
        }

        if let Some(WindowSignal::End(end)) = &signal {
            if self.transition(Signal::MatchingEnd) == Action::Close {
                self.window.close(end);
                debug!(
                    end_ms = end.timestamp,
                    http_status = end.http_status,
                    "cold start window closed"
                );
            }
        }
        Ok(())
    }

    fn record_in_window(
        &mut self,
        event: &TraceEvent,
        kind: Option<EventKind>,
    ) -> Result<(), EventError> {
        self.resolver.resolve_secondary(event, &mut self.roles);

        let Some(kind) = kind else {
            return Ok(());
        };

        if let Some(host) = self.roles.get(Role::Host) {
            if kind == EventKind::HostLogInfo && event.process_id == host {
                self.window.record_app_details(event);
            }
            self.resolver.resolve_worker(event, kind, &mut self.roles)?;
        }

        self.metrics.record(event, kind, &self.roles)
    }

    /// Discard the window together with everything accumulated for it
    fn reset(&mut self) {
        self.window = ColdStartWindow::default();
        self.roles = ProcessRoles::default();
        self.metrics.clear();
        self.skipped_events = 0;
    }

    /// Keep the window bounds, drop everything else, pin the fallback host
    fn begin_replay(&mut self, host: Option<u32>) {
        info!(fallback_host = host, "host not resolved, replaying feed");
        self.metrics.clear();
        self.roles = ProcessRoles::default();
        if let Some(pid) = host {
            self.roles.resolve(Role::Host, pid);
        }
        self.window.app_name.clear();
        self.window.activity_id.clear();
        self.window.host_version.clear();
        self.skipped_events = 0;
    }
}
