//! In-window metric accumulation
//!
//! Every event inside the cold-start window is routed here. Runtime events
//! (JIT, GC, assembly/type loads, hard faults, allocation ticks) go to the
//! ledgers of the role owning the emitting pid; disk reads and CPU samples are
//! counted for every process. Accumulation is purely additive: the only way
//! anything shrinks is [`MetricsAccumulator::clear`].

use crate::error::EventError;
use crate::event::{EventKind, TraceEvent};
use crate::ledger::{IntervalLedger, NamedLedger};
use crate::roles::{ProcessRoles, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Interval and counter ledgers for one process role
#[derive(Debug, Clone, Default)]
pub struct RuntimeLedgers {
    /// Keyed by method id, named `Namespace::Method`
    pub jit: IntervalLedger<String>,
    /// Keyed by collection count, unnamed
    pub gc: IntervalLedger<i64>,
    /// Keyed and named by assembly name (or path)
    pub assembly_loads: IntervalLedger<String>,
    /// Keyed by type-load id, named by type
    pub type_loads: IntervalLedger<String>,
    /// Per-file hard fault count and time
    pub hard_faults: NamedLedger,
    pub gc_allocation_bytes: i64,
}

impl RuntimeLedgers {
    /// Route one runtime event emitted by this role's process
    pub fn record(&mut self, event: &TraceEvent, kind: EventKind) -> Result<(), EventError> {
        let payload = &event.payload;
        let ts = event.timestamp;

        match kind {
            EventKind::JitStart => {
                // methods jitted more than once only report the last attempt
                self.jit.open(payload.text_field("MethodID")?, ts);
            }
            EventKind::JitLoad => {
                let method_id = payload.text_field("MethodID")?;
                let name = format!(
                    "{}::{}",
                    payload.text_field("MethodNamespace")?,
                    payload.text_field("MethodName")?
                );
                self.jit.close(&method_id, Some(&name), ts);
            }
            EventKind::GcStart => self.gc.open(payload.i64_field("Count")?, ts),
            EventKind::GcStop => {
                self.gc.close(&payload.i64_field("Count")?, None, ts);
            }
            EventKind::AssemblyLoadStart => {
                self.assembly_loads.open(assembly_key(event), ts);
            }
            EventKind::AssemblyLoadStop => {
                let key = assembly_key(event);
                self.assembly_loads.close(&key, Some(&key), ts);
            }
            EventKind::TypeLoadStart => {
                let id = payload.text_or_empty("TypeLoadStartID");
                if !id.is_empty() {
                    self.type_loads.open(id, ts);
                }
            }
            EventKind::TypeLoadStop => {
                let id = payload.text_or_empty("TypeLoadStartID");
                if !id.is_empty() {
                    let type_name = payload.text_or_empty("TypeName");
                    let name = (!type_name.is_empty()).then_some(type_name.as_str());
                    self.type_loads.close(&id, name, ts);
                }
            }
            EventKind::HardFault => {
                let file = payload.text_field("FileName")?;
                let elapsed = payload.f64_field("ElapsedTimeMSec")?;
                self.hard_faults.add(&file, elapsed);
            }
            EventKind::GcAllocationTick => {
                let amount = payload.i64_field("AllocationAmount")?;
                self.gc_allocation_bytes = self.gc_allocation_bytes.saturating_add(amount);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Assembly name if present, else its path
fn assembly_key(event: &TraceEvent) -> String {
    let name = event.payload.text_or_empty("AssemblyName");
    if !name.is_empty() {
        return name;
    }
    event.payload.text_or_empty("AssemblyPath")
}

/// One outbound call made by the secondary service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundCall {
    pub target: String,
    pub latency_ms: i64,
}

/// Provisioning summary reported by the secondary service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provisioning {
    pub total_ms: i64,
    /// Opaque perf blob, kept verbatim
    pub perf_data: String,
}

/// CPU sample counts per `(process name, pid)`
#[derive(Debug, Clone, Default)]
pub struct CpuSamples {
    pub total: u64,
    by_process: HashMap<(String, u32), u64>,
}

impl CpuSamples {
    pub fn record(&mut self, process_name: &str, pid: u32) {
        self.total += 1;
        *self
            .by_process
            .entry((process_name.to_string(), pid))
            .or_insert(0) += 1;
    }

    /// Samples attributed to `pid` across every name it was seen with
    pub fn samples_for_pid(&self, pid: u32) -> u64 {
        self.by_process
            .iter()
            .filter(|((_, p), _)| *p == pid)
            .map(|(_, count)| count)
            .sum()
    }

    /// `(name, pid, samples)` ordered by samples descending, ties by name/pid
    pub fn ranked(&self) -> Vec<(&str, u32, u64)> {
        let mut ranked: Vec<_> = self
            .by_process
            .iter()
            .map(|((name, pid), count)| (name.as_str(), *pid, *count))
            .collect();
        ranked.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(b.0)).then(a.1.cmp(&b.1)));
        ranked
    }

    /// Share of all samples, as a percentage rounded to two decimals
    pub fn percent(&self, samples: u64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let pct = samples as f64 / self.total as f64 * 100.0;
        (pct * 100.0).round_ties_even() / 100.0
    }
}

/// All state accumulated for the current window
#[derive(Debug, Clone, Default)]
pub struct MetricsAccumulator {
    host: RuntimeLedgers,
    secondary: RuntimeLedgers,
    worker: RuntimeLedgers,
    pub disk_reads: NamedLedger,
    pub cpu: CpuSamples,
    pub network_shares: Vec<String>,
    pub outbound_calls: Vec<OutboundCall>,
    pub outbound_calls_ms: i64,
    pub provisioning: Option<Provisioning>,
    /// `name(pid)` → truncated command line from process rundown
    pub command_lines: HashMap<String, String>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&self, role: Role) -> &RuntimeLedgers {
        match role {
            Role::Host => &self.host,
            Role::SecondaryService => &self.secondary,
            Role::Worker => &self.worker,
        }
    }

    fn role_mut(&mut self, role: Role) -> &mut RuntimeLedgers {
        match role {
            Role::Host => &mut self.host,
            Role::SecondaryService => &mut self.secondary,
            Role::Worker => &mut self.worker,
        }
    }

    /// Route an in-window event
    pub fn record(
        &mut self,
        event: &TraceEvent,
        kind: EventKind,
        roles: &ProcessRoles,
    ) -> Result<(), EventError> {
        let role = roles.role_of(event.process_id);

        match kind {
            EventKind::DiskRead => {
                let file = event.payload.text_field("FileName")?;
                let service_ms = event.payload.f64_field("DiskServiceTimeMSec")?;
                self.disk_reads.add(&file, service_ms);
            }
            EventKind::CpuSample => self.cpu.record(&event.process_name, event.process_id),
            EventKind::FileCreate if role.is_some() => {
                let file = event.payload.text_field("FileName")?;
                if file.starts_with(r"\\") {
                    self.network_shares.push(file);
                }
            }
            EventKind::OutboundCall if role == Some(Role::SecondaryService) => {
                let target = event.payload.text_field("RequestUrl")?;
                let latency_ms = event.payload.i64_field("LatencyInMilliseconds")?;
                self.outbound_calls_ms = self.outbound_calls_ms.saturating_add(latency_ms);
                self.outbound_calls.push(OutboundCall { target, latency_ms });
            }
            EventKind::ProvisioningSummary if role == Some(Role::SecondaryService) => {
                let total_ms = event.payload.i64_field("TotalTimeTakenForProvisioning")?;
                let perf_data = event.payload.text_or_empty("ColdStartPerfData");
                self.provisioning = Some(Provisioning {
                    total_ms,
                    perf_data,
                });
            }
            _ => {}
        }

        if let Some(role) = role {
            self.role_mut(role).record(event, kind)?;
        }
        Ok(())
    }

    /// Process rundown events carry each process' command line once
    pub fn record_rundown(&mut self, event: &TraceEvent, max_len: usize) -> Result<(), EventError> {
        let command_line = event.payload.text_field("CommandLine")?;
        let truncated: String = command_line.chars().take(max_len).collect();
        self.command_lines
            .entry(event.process_label())
            .or_insert(truncated);
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.total == 0
            && self.disk_reads.is_empty()
            && self.network_shares.is_empty()
            && self.outbound_calls.is_empty()
            && self.provisioning.is_none()
            && self.command_lines.is_empty()
            && [Role::Host, Role::SecondaryService, Role::Worker]
                .into_iter()
                .all(|r| {
                    let l = self.role(r);
                    l.jit.closed_count() == 0
                        && l.jit.open_count() == 0
                        && l.gc.closed_count() == 0
                        && l.gc.open_count() == 0
                        && l.assembly_loads.open_count() == 0
                        && l.assembly_loads.closed_count() == 0
                        && l.type_loads.open_count() == 0
                        && l.type_loads.closed_count() == 0
                        && l.hard_faults.is_empty()
                        && l.gc_allocation_bytes == 0
                })
    }
}
