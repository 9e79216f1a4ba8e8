// Integration test utilities
//
// Builders for synthetic cold-start feeds and helpers to write them to disk
#![allow(dead_code)]

use coldtrace::event::{provider, PayloadValue, TraceEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const FORWARDER_PID: u32 = 10;
pub const FORWARDER_POOL: &str = "OnDemandConfigAndForwarder";

/// Front-end request start that opens the window
pub fn forwarder_start(ts: f64, url: &str, context_id: &str) -> TraceEvent {
    TraceEvent::new(ts, provider::IIS, "IISGeneral/GENERAL_REQUEST_START", FORWARDER_PID, "w3wp")
        .with("AppPoolId", FORWARDER_POOL)
        .with("RequestURL", url)
        .with("ContextId", context_id)
}

/// The same request arriving at the site's own pipeline
pub fn site_start(ts: f64, pid: u32, url: &str) -> TraceEvent {
    TraceEvent::new(ts, provider::IIS, "IISGeneral/GENERAL_REQUEST_START", pid, "w3wp")
        .with("AppPoolId", "mysite")
        .with("RequestURL", url)
        .with("ContextId", "{11111111-2222-3333-4444-555555555555}")
}

pub fn request_end(ts: f64, context_id: &str, status: i64) -> TraceEvent {
    TraceEvent::new(ts, provider::IIS, "IISGeneral/GENERAL_REQUEST_END", FORWARDER_PID, "w3wp")
        .with("ContextId", context_id)
        .with("HttpStatus", status)
}

pub fn jit_start(ts: f64, pid: u32, method_id: &str) -> TraceEvent {
    TraceEvent::new(ts, provider::DOTNET_RUNTIME, "Method/JittingStarted", pid, "w3wp")
        .with("MethodID", method_id)
}

pub fn jit_load(ts: f64, pid: u32, method_id: &str, namespace: &str, name: &str) -> TraceEvent {
    TraceEvent::new(ts, provider::DOTNET_RUNTIME, "Method/LoadVerbose", pid, "w3wp")
        .with("MethodID", method_id)
        .with("MethodNamespace", namespace)
        .with("MethodName", name)
}

pub fn gc(ts: f64, pid: u32, stop: bool, count: i64) -> TraceEvent {
    let name = if stop { "GC/Stop" } else { "GC/Start" };
    TraceEvent::new(ts, provider::DOTNET_RUNTIME, name, pid, "w3wp").with("Count", count)
}

pub fn cpu_sample(ts: f64, pid: u32, process: &str) -> TraceEvent {
    TraceEvent::new(ts, provider::KERNEL, "PerfInfo/Sample", pid, process)
}

pub fn disk_read(ts: f64, pid: u32, file: &str, ms: f64) -> TraceEvent {
    TraceEvent::new(ts, provider::KERNEL, "DiskIO/Read", pid, "w3wp")
        .with("FileName", file)
        .with("DiskServiceTimeMSec", ms)
}

/// Diagnostic begin-request seen by the fallback host resolver
pub fn begin_request(ts: f64, pid: u32, url: &str) -> TraceEvent {
    TraceEvent::new(ts, provider::DIAGNOSTIC_SOURCE, "Activity1Start/Start", pid, "w3wp")
        .with("EventName", "Microsoft.AspNetCore.Hosting.BeginRequest")
        .with("Arguments", vec![PayloadValue::from(format!("GET {url}"))])
}

pub fn host_log_verbose(ts: f64, pid: u32, summary: &str) -> TraceEvent {
    TraceEvent::new(ts, provider::FUNCTIONS_LOGS, "RaiseFunctionsEventVerbose", pid, "w3wp")
        .with("Summary", summary)
}

pub fn executed_request(ts: f64, pid: u32, app: &str, request_id: &str) -> TraceEvent {
    TraceEvent::new(ts, provider::FUNCTIONS_LOGS, "RaiseFunctionsEventInfo", pid, "w3wp")
        .with("EventName", "ExecutedHttpRequest")
        .with("AppName", app)
        .with("HostVersion", "4.34.1")
        .with("Summary", format!("Executed HTTP request: {{ requestId: \"{request_id}\", method: \"GET\" }}"))
}

/// The reference scenario: host 77 jits one method for 4 ms in a 20 ms cold start
pub fn reference_feed() -> Vec<TraceEvent> {
    vec![
        forwarder_start(0.0, "http://myapp.azurewebsites.net/api/x", "{AAAA-0001}"),
        site_start(1.0, 77, "http://myapp.azurewebsites.net/api/x"),
        jit_start(2.0, 77, "m1"),
        jit_load(6.0, 77, "m1", "Foo", "Bar"),
        request_end(20.0, "aaaa-0001", 200),
    ]
}

pub fn to_jsonl(events: &[TraceEvent]) -> String {
    events
        .iter()
        .map(|e| serde_json::to_string(e).unwrap() + "\n")
        .collect()
}

/// Write `events` as a JSON Lines feed named `name` under `dir`
pub fn write_feed(dir: &Path, name: &str, events: &[TraceEvent]) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(to_jsonl(events).as_bytes()).unwrap();
    path
}
