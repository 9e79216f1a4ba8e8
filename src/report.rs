//! Cold-start report
//!
//! [`ColdStartReport`] is the structured result of one analysis. It serializes
//! with serde for `--format json`, and [`ColdStartReport::render_text`]
//! produces the sectioned `.coldstart` document that downstream tools scrape.
//! Section headers in that document are matched verbatim by consumers (see
//! [`crate::coldstart_file`]), so their spelling must not change.

use crate::ledger::{IntervalLedger, NamedLedger};
use crate::metrics::{MetricsAccumulator, OutboundCall, RuntimeLedgers};
use crate::roles::{ProcessRoles, Role};
use crate::window::{ColdStartWindow, WindowSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::Hash;

pub const CPU_USAGE_HEADER: &str = "CPU Usage by active processes during cold start:";
pub const NETWORK_SHARES_HEADER: &str = "Network share accesses:";
pub const JIT_HEADER: &str = "Detailed JIT Times:";
pub const SECONDARY_JIT_HEADER: &str = "Detailed DWAS JIT Times:";
pub const DISK_READS_HEADER: &str = "Detailed Disk Reads:";
pub const HARD_FAULTS_HEADER: &str = "Detailed Memory Hard Faults:";
pub const OUTBOUND_CALLS_HEADER: &str = "DWAS outbound calls:";
pub const PERF_DATA_HEADER: &str = "DWAS cold start perf data:";
pub const WORKER_HARD_FAULTS_HEADER: &str = "Detailed Language Worker Memory Hard Faults:";
pub const WORKER_JIT_HEADER: &str = "Detailed Language Worker JIT Times:";
pub const WORKER_ASSEMBLY_LOADER_HEADER: &str = "Detailed Language Worker Assembly Loader Times:";
pub const WORKER_TYPE_LOAD_HEADER: &str = "Detailed Language Worker Type Load Times:";

const ACTIVE_PROCESS_COLUMN: usize = 50;

/// One named ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub name: String,
    pub total_ms: f64,
    pub count: u64,
}

fn ledger_lines(ledger: &NamedLedger) -> Vec<LedgerLine> {
    ledger
        .sorted_desc()
        .into_iter()
        .map(|(name, entry)| LedgerLine {
            name: name.to_string(),
            total_ms: entry.total_ms,
            count: entry.count,
        })
        .collect()
}

/// Totals and named breakdown of one interval ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalSummary {
    pub total_ms: f64,
    /// Matched spans, named or not
    pub spans: u64,
    pub lines: Vec<LedgerLine>,
}

impl IntervalSummary {
    fn from_ledger<K: Eq + Hash>(ledger: &IntervalLedger<K>) -> Self {
        Self {
            total_ms: ledger.total_ms(),
            spans: ledger.closed_count(),
            lines: ledger_lines(ledger.named()),
        }
    }

    /// Distinct names, the count shown in the text report
    pub fn distinct(&self) -> usize {
        self.lines.len()
    }
}

/// Everything measured for one process role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleReport {
    pub pid: Option<u32>,
    pub cpu_samples: u64,
    pub jit: IntervalSummary,
    pub gc_ms: f64,
    pub gc_count: u64,
    pub assembly_loads: IntervalSummary,
    pub type_loads: IntervalSummary,
    pub hard_fault_ms: f64,
    pub hard_faults: Vec<LedgerLine>,
    pub gc_allocation_bytes: i64,
}

impl RoleReport {
    fn build(pid: Option<u32>, ledgers: &RuntimeLedgers, metrics: &MetricsAccumulator) -> Self {
        Self {
            pid,
            cpu_samples: pid.map_or(0, |p| metrics.cpu.samples_for_pid(p)),
            jit: IntervalSummary::from_ledger(&ledgers.jit),
            gc_ms: ledgers.gc.total_ms(),
            gc_count: ledgers.gc.closed_count(),
            assembly_loads: IntervalSummary::from_ledger(&ledgers.assembly_loads),
            type_loads: IntervalSummary::from_ledger(&ledgers.type_loads),
            hard_fault_ms: ledgers.hard_faults.total_ms(),
            hard_faults: ledger_lines(&ledgers.hard_faults),
            gc_allocation_bytes: ledgers.gc_allocation_bytes,
        }
    }
}

/// One row of the CPU ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveProcess {
    /// `name(pid)`
    pub label: String,
    pub pid: u32,
    pub samples: u64,
    pub percent: f64,
    pub command_line: String,
}

/// Result of one cold-start analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColdStartReport {
    pub window_start_ms: f64,
    pub window_end_ms: Option<f64>,
    pub cold_start_ms: Option<f64>,
    pub http_status: i64,
    pub window_source: WindowSource,

    pub app_name: String,
    pub activity_id: String,
    pub host_version: String,

    pub host_pid: Option<u32>,
    pub secondary_pid: Option<u32>,
    pub worker_pid: Option<u32>,

    pub host: RoleReport,
    pub secondary: RoleReport,
    pub worker: RoleReport,

    /// One sample per millisecond per core
    pub total_cpu_samples: u64,
    pub active_processes: Vec<ActiveProcess>,
    /// `name(pid)` → command line from process rundown
    pub command_lines: BTreeMap<String, String>,
    pub network_shares: Vec<String>,
    pub disk_read_ms: f64,
    pub disk_reads: Vec<LedgerLine>,
    pub outbound_calls: Vec<OutboundCall>,
    pub outbound_calls_ms: i64,
    pub provisioning_ms: i64,
    pub provisioning_perf_data: String,

    /// 2 when the feed was replayed to recover the host
    pub passes: u32,
    pub skipped_events: u64,
}

impl ColdStartReport {
    pub fn build(
        window: &ColdStartWindow,
        roles: &ProcessRoles,
        metrics: &MetricsAccumulator,
        passes: u32,
        skipped_events: u64,
    ) -> Self {
        let command_lines: BTreeMap<String, String> = metrics
            .command_lines
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let active_processes = metrics
            .cpu
            .ranked()
            .into_iter()
            .map(|(name, pid, samples)| {
                let label = format!("{name}({pid})");
                ActiveProcess {
                    command_line: command_lines.get(&label).cloned().unwrap_or_default(),
                    label,
                    pid,
                    samples,
                    percent: metrics.cpu.percent(samples),
                }
            })
            .collect();

        let role_report = |role: Role| {
            RoleReport::build(roles.get(role), metrics.role(role), metrics)
        };

        let (provisioning_ms, provisioning_perf_data) = metrics
            .provisioning
            .as_ref()
            .map(|p| (p.total_ms, p.perf_data.clone()))
            .unwrap_or_default();

        Self {
            window_start_ms: window.start_ms.unwrap_or_default(),
            window_end_ms: window.end_ms,
            cold_start_ms: window.duration_ms(),
            http_status: window.http_status,
            window_source: window.source,
            app_name: window.app_name.clone(),
            activity_id: window.activity_id.clone(),
            host_version: window.host_version.clone(),
            host_pid: roles.get(Role::Host),
            secondary_pid: roles.get(Role::SecondaryService),
            worker_pid: roles.get(Role::Worker),
            host: role_report(Role::Host),
            secondary: role_report(Role::SecondaryService),
            worker: role_report(Role::Worker),
            total_cpu_samples: metrics.cpu.total,
            active_processes,
            command_lines,
            network_shares: metrics.network_shares.clone(),
            disk_read_ms: metrics.disk_reads.total_ms(),
            disk_reads: ledger_lines(&metrics.disk_reads),
            outbound_calls: metrics.outbound_calls.clone(),
            outbound_calls_ms: metrics.outbound_calls_ms,
            provisioning_ms,
            provisioning_perf_data,
            passes,
            skipped_events,
        }
    }

    pub fn active_processes_text(&self) -> String {
        let mut out = String::new();
        for p in &self.active_processes {
            let share = format!("{} : {}%", p.label, p.percent);
            out.push_str(&format!(
                "{share:<width$}, {}\n",
                p.command_line,
                width = ACTIVE_PROCESS_COLUMN
            ));
        }
        out
    }

    pub fn network_shares_text(&self) -> String {
        self.network_shares
            .iter()
            .map(|share| format!("{share}\n"))
            .collect()
    }

    pub fn outbound_calls_text(&self) -> String {
        self.outbound_calls
            .iter()
            .map(|call| format!("{} : {}\n", call.target, call.latency_ms))
            .collect()
    }

    /// Render the `.coldstart` text document
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let end = self
            .window_end_ms
            .map_or_else(|| "n/a".to_string(), |e| e.to_string());
        let duration = self
            .cold_start_ms
            .map_or_else(|| "n/a".to_string(), |d| d.to_string());
        let host = &self.host;
        let secondary = &self.secondary;

        out.push('\n');
        out.push_str(&format!(
            "--pid {} --exclude-events-before {} --exclude-events-after {}\n",
            self.host_pid.unwrap_or(0),
            self.window_start_ms,
            end
        ));
        out.push_str(&format!(
            "--app-name {} --activity-id {} --host-version {}\n",
            self.app_name, self.activity_id, self.host_version
        ));

        out.push_str(&format!("\nTotal cold start time msec: {duration}\n"));
        out.push_str(&format!("HttpStatus: {}\n", self.http_status));

        out.push_str(&format!(
            "\nTotal CPU time during cold start msec (2 cores): {}\n",
            self.total_cpu_samples
        ));
        out.push_str(&format!(
            "Functions WebHost CPU time during cold start msec: {}\n",
            host.cpu_samples
        ));
        out.push_str(&format!(
            "DWAS CPU time during cold start msec: {}\n",
            secondary.cpu_samples
        ));
        out.push_str(&format!(
            "Language Worker CPU time during cold start msec: {}\n",
            self.worker.cpu_samples
        ));

        out.push_str(&format!(
            "\nFunctions WebHost JIT time during specialization msec: {} (count:{})\n",
            host.jit.total_ms,
            host.jit.distinct()
        ));
        out.push_str(&format!(
            "Functions WebHost GC time during specialization msec: {}\n",
            host.gc_ms
        ));
        out.push_str(&format!(
            "DWAS GC time during specialization msec: {}\n",
            secondary.gc_ms
        ));
        out.push_str(&format!(
            "DWAS JIT time during specialization msec: {}  (count:{})\n",
            secondary.jit.total_ms,
            secondary.jit.distinct()
        ));
        out.push_str(&format!(
            "Total Disk read time during specialization msec: {}\n",
            self.disk_read_ms
        ));
        out.push_str(&format!(
            "Total WebHost Functions memory hard faults time during specialization msec: {}\n",
            host.hard_fault_ms
        ));

        out.push_str(&format!(
            "\nTotal DWAS provisioning time msec: {}\n",
            self.provisioning_ms
        ));
        out.push_str(&format!(
            "Total DWAS outbound calls time during specialization msec: {}\n",
            self.outbound_calls_ms
        ));

        out.push_str(&format!(
            "\nFunctions WebHost GC allocation during specialization in bytes: {}\n",
            group_thousands(host.gc_allocation_bytes)
        ));
        out.push_str(&format!(
            "DWAS GC allocation during specialization in bytes: {}\n",
            group_thousands(secondary.gc_allocation_bytes)
        ));

        if let Some(worker_pid) = self.worker_pid {
            let worker = &self.worker;
            out.push_str(&format!("\nLanguageWorkerPid: {worker_pid}\n"));
            out.push_str(&format!(
                "Language Worker JIT time during specialization msec: {} (count:{})\n",
                worker.jit.total_ms,
                worker.jit.distinct()
            ));
            out.push_str(&format!(
                "Language Worker Assembly Loader time during specialization msec: {} (count:{})\n",
                worker.assembly_loads.total_ms,
                worker.assembly_loads.distinct()
            ));
            out.push_str(&format!(
                "Language Worker Type Load time during specialization msec: {} (count:{})\n",
                worker.type_loads.total_ms,
                worker.type_loads.distinct()
            ));
            out.push_str(&format!(
                "Language Worker GC time during specialization msec: {}\n",
                worker.gc_ms
            ));
            out.push_str(&format!(
                "Total Language Worker memory hard faults time during specialization msec: {}\n",
                worker.hard_fault_ms
            ));
        }

        push_section(&mut out, CPU_USAGE_HEADER, &self.active_processes_text());
        push_section(&mut out, NETWORK_SHARES_HEADER, &self.network_shares_text());
        push_section(&mut out, JIT_HEADER, &ledger_text(&host.jit.lines));
        push_section(&mut out, SECONDARY_JIT_HEADER, &ledger_text(&secondary.jit.lines));
        push_section(&mut out, DISK_READS_HEADER, &ledger_text(&self.disk_reads));
        push_section(&mut out, HARD_FAULTS_HEADER, &hard_faults_text(&host.hard_faults));
        push_section(&mut out, OUTBOUND_CALLS_HEADER, &self.outbound_calls_text());
        push_section(&mut out, PERF_DATA_HEADER, &self.provisioning_perf_data);

        if self.worker_pid.is_some() {
            let worker = &self.worker;
            push_section(
                &mut out,
                WORKER_HARD_FAULTS_HEADER,
                &hard_faults_text(&worker.hard_faults),
            );
            push_section(&mut out, WORKER_JIT_HEADER, &ledger_text(&worker.jit.lines));
            push_section(
                &mut out,
                WORKER_ASSEMBLY_LOADER_HEADER,
                &ledger_text(&worker.assembly_loads.lines),
            );
            push_section(
                &mut out,
                WORKER_TYPE_LOAD_HEADER,
                &ledger_text(&worker.type_loads.lines),
            );
        }

        out
    }
}

fn push_section(out: &mut String, header: &str, body: &str) {
    out.push_str(&format!("\n{header}\n\n{body}\n"));
}

/// `name : value` rows, one per line
pub fn ledger_text(lines: &[LedgerLine]) -> String {
    lines
        .iter()
        .map(|l| format!("{} : {}\n", l.name, l.total_ms))
        .collect()
}

/// `name (count: N) : value` rows, one per line
pub fn hard_faults_text(lines: &[LedgerLine]) -> String {
    lines
        .iter()
        .map(|l| format!("{} (count: {}) : {}\n", l.name, l.count, l.total_ms))
        .collect()
}

/// `1234567` → `1,234,567`
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
