//! Flat per-analysis telemetry record
//!
//! One [`TelemetryRecord`] is emitted per analyzed trace as a single structured
//! `tracing` event (target `coldtrace::telemetry`). Column names are PascalCase
//! to stay compatible with existing cold-start dashboards; millisecond values
//! are rounded to whole numbers and every free-text column is truncated.

use crate::report::{hard_faults_text, ledger_text, ColdStartReport};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const TELEMETRY_TARGET: &str = "coldtrace::telemetry";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TelemetryRecord {
    pub app_name: String,
    pub activity_id: String,
    pub functions_host_pid: u32,
    pub start_time: u64,
    pub end_time: u64,
    pub trace_file_name: String,
    pub cold_start_time: u64,
    pub http_status: i64,
    pub functions_host_version: String,

    pub jit_time: u64,
    pub jit_count: u64,
    #[serde(rename = "DetailedJIT")]
    pub detailed_jit: String,
    #[serde(rename = "FunctionsGCTime")]
    pub functions_gc_time: u64,
    #[serde(rename = "GCAllocationInBytes")]
    pub gc_allocation_in_bytes: u64,
    pub functions_memory_hard_fault_time: u64,
    pub functions_detailed_memory_hard_faults: String,

    #[serde(rename = "DwasGCTime")]
    pub dwas_gc_time: u64,
    pub dwas_jit_time: u64,
    pub dwas_jit_count: u64,
    #[serde(rename = "DwasDetailedJIT")]
    pub dwas_detailed_jit: String,
    #[serde(rename = "DwasGCAllocationInBytes")]
    pub dwas_gc_allocation_in_bytes: u64,
    pub total_dwas_outbound_calls_time: i64,
    pub dwas_outbound_calls: String,
    pub total_dwas_provisioning_time: i64,
    pub dwas_cold_start_perf_data: String,

    pub disk_read_time: u64,
    pub detailed_disk_read: String,
    pub active_processes: String,
    pub network_share_accesses: String,

    pub language_worker_jit_time: u64,
    pub language_worker_jit_count: u64,
    #[serde(rename = "LanguageWorkerDetailedJIT")]
    pub language_worker_detailed_jit: String,
    pub language_worker_assembly_loader_time: u64,
    pub language_worker_assembly_loader_count: u64,
    pub language_worker_detailed_assembly_loader: String,
    pub language_worker_type_load_time: u64,
    pub language_worker_type_load_count: u64,
    pub language_worker_detailed_type_load: String,
    #[serde(rename = "LanguageWorkerGCTime")]
    pub language_worker_gc_time: u64,
    pub language_worker_memory_hard_fault_time: u64,
    pub language_worker_memory_hard_faults: String,

    pub total_cpu_time: f64,
    pub functions_host_cpu_time: f64,
    pub dwas_cpu_time: f64,
    pub language_worker_cpu_time: f64,

    pub passes: u32,
    pub skipped_events: u64,
}

/// Whole milliseconds, negative values clamp to zero
fn whole_ms(ms: f64) -> u64 {
    let rounded = ms.round_ties_even();
    if rounded.is_finite() && rounded > 0.0 {
        rounded as u64
    } else {
        0
    }
}

/// Keep at most `max_len` characters
pub fn truncate_field(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

impl TelemetryRecord {
    pub fn from_report(report: &ColdStartReport, trace_file_name: &str, max_field_len: usize) -> Self {
        let cut = |text: &str| truncate_field(text, max_field_len);
        let host = &report.host;
        let dwas = &report.secondary;
        let worker = &report.worker;

        Self {
            app_name: cut(&report.app_name),
            activity_id: cut(&report.activity_id),
            functions_host_pid: report.host_pid.unwrap_or(0),
            start_time: whole_ms(report.window_start_ms),
            end_time: report.window_end_ms.map_or(0, whole_ms),
            trace_file_name: cut(trace_file_name),
            cold_start_time: report.cold_start_ms.map_or(0, whole_ms),
            http_status: report.http_status,
            functions_host_version: cut(&report.host_version),

            jit_time: whole_ms(host.jit.total_ms),
            jit_count: host.jit.distinct() as u64,
            detailed_jit: cut(&ledger_text(&host.jit.lines)),
            functions_gc_time: whole_ms(host.gc_ms),
            gc_allocation_in_bytes: host.gc_allocation_bytes.max(0) as u64,
            functions_memory_hard_fault_time: whole_ms(host.hard_fault_ms),
            functions_detailed_memory_hard_faults: cut(&hard_faults_text(&host.hard_faults)),

            dwas_gc_time: whole_ms(dwas.gc_ms),
            dwas_jit_time: whole_ms(dwas.jit.total_ms),
            dwas_jit_count: dwas.jit.distinct() as u64,
            dwas_detailed_jit: cut(&ledger_text(&dwas.jit.lines)),
            dwas_gc_allocation_in_bytes: dwas.gc_allocation_bytes.max(0) as u64,
            total_dwas_outbound_calls_time: report.outbound_calls_ms,
            dwas_outbound_calls: cut(&report.outbound_calls_text()),
            total_dwas_provisioning_time: report.provisioning_ms,
            dwas_cold_start_perf_data: cut(&report.provisioning_perf_data),

            disk_read_time: whole_ms(report.disk_read_ms),
            detailed_disk_read: cut(&ledger_text(&report.disk_reads)),
            active_processes: cut(&report.active_processes_text()),
            network_share_accesses: cut(&report.network_shares_text()),

            language_worker_jit_time: whole_ms(worker.jit.total_ms),
            language_worker_jit_count: worker.jit.distinct() as u64,
            language_worker_detailed_jit: cut(&ledger_text(&worker.jit.lines)),
            language_worker_assembly_loader_time: whole_ms(worker.assembly_loads.total_ms),
            language_worker_assembly_loader_count: worker.assembly_loads.distinct() as u64,
            language_worker_detailed_assembly_loader: cut(&ledger_text(&worker.assembly_loads.lines)),
            language_worker_type_load_time: whole_ms(worker.type_loads.total_ms),
            language_worker_type_load_count: worker.type_loads.distinct() as u64,
            language_worker_detailed_type_load: cut(&ledger_text(&worker.type_loads.lines)),
            language_worker_gc_time: whole_ms(worker.gc_ms),
            language_worker_memory_hard_fault_time: whole_ms(worker.hard_fault_ms),
            language_worker_memory_hard_faults: cut(&hard_faults_text(&worker.hard_faults)),

            total_cpu_time: report.total_cpu_samples as f64,
            functions_host_cpu_time: host.cpu_samples as f64,
            dwas_cpu_time: dwas.cpu_samples as f64,
            language_worker_cpu_time: worker.cpu_samples as f64,

            passes: report.passes,
            skipped_events: report.skipped_events,
        }
    }

    /// Log the record as one structured event
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(json) => info!(
                target: TELEMETRY_TARGET,
                app_name = %self.app_name,
                cold_start_ms = self.cold_start_time,
                record = %json,
                "cold start analysis"
            ),
            Err(e) => warn!(target: TELEMETRY_TARGET, error = %e, "failed to serialize telemetry record"),
        }
    }
}

/// Log that a trace held no cold-start window
pub fn emit_no_window(trace_file_name: &str) {
    warn!(
        target: TELEMETRY_TARGET,
        trace_file = trace_file_name,
        "no cold start request found in trace"
    );
}
