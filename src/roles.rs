//! Process role resolution
//!
//! Three cooperating processes make up one cold start: the host, the secondary
//! (site provisioning) service and an optional language worker. None of their
//! pids are known up front; each is discovered from event content. Every
//! resolution is monotonic within a pass: once set, a role id is never
//! overwritten.

use crate::config::AnalyzerConfig;
use crate::error::EventError;
use crate::event::{EventKind, TraceEvent};
use crate::window::{ColdStartWindow, UrlFilter};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const BEGIN_REQUEST_EVENT: &str = "Microsoft.AspNetCore.Hosting.BeginRequest";
const WORKER_RELOAD_PATTERN: &str =
    r"Sending FunctionEnvironmentReloadRequest to WorkerProcess with Pid: '?(\d+)'?";
const WORKER_STARTED_PATTERN: &str = r"process with Id=\s*(\d+)\s*started$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Host,
    SecondaryService,
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::SecondaryService => write!(f, "secondary-service"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

/// Resolved pid per role; `None` means not yet resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessRoles {
    host: Option<u32>,
    secondary: Option<u32>,
    worker: Option<u32>,
}

impl ProcessRoles {
    pub fn get(&self, role: Role) -> Option<u32> {
        match role {
            Role::Host => self.host,
            Role::SecondaryService => self.secondary,
            Role::Worker => self.worker,
        }
    }

    /// Set a role's pid unless it is already resolved. Pid 0 never resolves.
    pub fn resolve(&mut self, role: Role, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        let slot = match role {
            Role::Host => &mut self.host,
            Role::SecondaryService => &mut self.secondary,
            Role::Worker => &mut self.worker,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(pid);
        debug!(%role, pid, "resolved process role");
        true
    }

    /// Role played by `pid`; the host wins if one pid holds several roles
    pub fn role_of(&self, pid: u32) -> Option<Role> {
        [Role::Host, Role::SecondaryService, Role::Worker]
            .into_iter()
            .find(|role| self.get(*role) == Some(pid))
    }

    pub fn is_resolved(&self, role: Role) -> bool {
        self.get(role).is_some()
    }
}

/// Discovers role pids from event content
#[derive(Debug, Clone)]
pub struct RoleResolver {
    filter: UrlFilter,
    secondary_service_process: String,
    worker_launcher_process: String,
    worker_reload: Regex,
    worker_started: Regex,
}

impl RoleResolver {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            filter: UrlFilter::from_config(config),
            secondary_service_process: config.secondary_service_process.clone(),
            worker_launcher_process: config.worker_launcher_process.to_lowercase(),
            worker_reload: Regex::new(WORKER_RELOAD_PATTERN).expect("worker reload pattern"),
            worker_started: Regex::new(WORKER_STARTED_PATTERN).expect("worker started pattern"),
        }
    }

    /// Primary host resolution: the first URL-matching request-start strictly
    /// after the window start. The window-opening event itself belongs to the
    /// front-end forwarder.
    pub fn resolve_host(
        &self,
        event: &TraceEvent,
        kind: EventKind,
        window: &ColdStartWindow,
        roles: &mut ProcessRoles,
    ) -> Result<(), EventError> {
        if roles.is_resolved(Role::Host)
            || kind != EventKind::RequestStart
            || !window.after_start(event.timestamp)
        {
            return Ok(());
        }
        let url = event.payload.str_field("RequestURL")?;
        if self.filter.matches(url) {
            roles.resolve(Role::Host, event.process_id);
        }
        Ok(())
    }

    /// The secondary service is recognized by its well-known process name
    pub fn resolve_secondary(&self, event: &TraceEvent, roles: &mut ProcessRoles) {
        if !roles.is_resolved(Role::SecondaryService)
            && event.process_name == self.secondary_service_process
        {
            roles.resolve(Role::SecondaryService, event.process_id);
        }
    }

    /// The worker is announced by a host log line, or recognized by the
    /// runtime-start event of the worker launcher process.
    pub fn resolve_worker(
        &self,
        event: &TraceEvent,
        kind: EventKind,
        roles: &mut ProcessRoles,
    ) -> Result<(), EventError> {
        if roles.is_resolved(Role::Worker) {
            return Ok(());
        }

        if kind == EventKind::HostLogVerbose && roles.get(Role::Host) == Some(event.process_id) {
            let summary = event.payload.text_field("Summary")?;
            if let Some(pid) = self.worker_pid_from_log(&summary) {
                roles.resolve(Role::Worker, pid);
                return Ok(());
            }
        }

        if kind == EventKind::RuntimeStart
            && event
                .process_name
                .to_lowercase()
                .contains(&self.worker_launcher_process)
        {
            roles.resolve(Role::Worker, event.process_id);
        }
        Ok(())
    }

    pub fn worker_pid_from_log(&self, summary: &str) -> Option<u32> {
        let captures = self
            .worker_reload
            .captures(summary)
            .or_else(|| self.worker_started.captures(summary.trim_end()))?;
        captures.get(1)?.as_str().parse().ok()
    }

    /// Fallback host resolution: a diagnostic begin-request event after the
    /// window start whose argument list mentions the URL pattern.
    pub fn fallback_host(&self, events: &[TraceEvent], window: &ColdStartWindow) -> Option<u32> {
        let needle = self.filter.needle();
        events
            .iter()
            .filter(|e| window.after_start(e.timestamp))
            .filter(|e| e.kind() == Some(EventKind::ActivityStart))
            .find(|e| {
                e.payload.str_field("EventName").ok() == Some(BEGIN_REQUEST_EVENT)
                    && e.payload
                        .list_field("Arguments")
                        .is_ok_and(|args| args.iter().any(|a| a.contains_text(needle)))
            })
            .map(|e| e.process_id)
    }
}
