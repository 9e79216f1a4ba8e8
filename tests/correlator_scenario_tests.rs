//! End-to-end correlation scenarios over synthetic feeds

mod utils;

use coldtrace::config::AnalyzerConfig;
use coldtrace::correlator::Correlator;
use coldtrace::error::AnalysisError;
use coldtrace::event::{provider, TraceEvent};
use coldtrace::feed::EventFeed;
use coldtrace::window::WindowSource;
use utils::*;

const URL: &str = "http://myapp.azurewebsites.net/api/x";

fn config() -> AnalyzerConfig {
    AnalyzerConfig::default().with_url_pattern("/api/x")
}

fn analyze(events: &[TraceEvent]) -> Result<coldtrace::report::ColdStartReport, AnalysisError> {
    Correlator::new(config()).analyze(events)
}

#[test]
fn test_reference_scenario() {
    let report = analyze(&reference_feed()).unwrap();

    assert_eq!(report.host_pid, Some(77));
    assert_eq!(report.host.jit.total_ms, 4.0);
    assert_eq!(report.host.jit.lines.len(), 1);
    assert_eq!(report.host.jit.lines[0].name, "Foo::Bar");
    assert_eq!(report.host.jit.lines[0].total_ms, 4.0);
    assert_eq!(report.cold_start_ms, Some(20.0));
    assert_eq!(report.http_status, 200);
    assert_eq!(report.passes, 1);
    assert_eq!(report.skipped_events, 0);
}

#[test]
fn test_no_qualifying_start_reports_no_window() {
    // same request, but not through the forwarder pool
    let events = vec![
        site_start(1.0, 77, URL),
        jit_start(2.0, 77, "m1"),
        jit_load(6.0, 77, "m1", "Foo", "Bar"),
    ];
    assert!(matches!(
        analyze(&events),
        Err(AnalysisError::NoWindowFound { .. })
    ));
    assert!(matches!(
        analyze(&[]),
        Err(AnalysisError::NoWindowFound { .. })
    ));
}

#[test]
fn test_url_filter_excludes_other_requests() {
    let events = vec![
        forwarder_start(0.0, "http://myapp.azurewebsites.net/api/other", "A"),
        request_end(3.0, "A", 200),
    ];
    assert!(analyze(&events).is_err());
}

#[test]
fn test_default_filter_matches_sla_sites() {
    let events = vec![
        forwarder_start(0.0, "http://sla-ws-func-123.azurewebsites.net/api/ping", "A"),
        site_start(1.0, 77, "http://sla-ws-func-123.azurewebsites.net/api/ping"),
        request_end(9.0, "A", 202),
    ];
    let report = Correlator::new(AnalyzerConfig::default())
        .analyze(&events)
        .unwrap();
    assert_eq!(report.host_pid, Some(77));
    assert_eq!(report.http_status, 202);
}

#[test]
fn test_duplicate_start_keeps_only_later_window() {
    let events = vec![
        forwarder_start(0.0, URL, "A"),
        site_start(1.0, 50, URL),
        jit_start(2.0, 50, "m1"),
        jit_load(3.0, 50, "m1", "Early", "Method"),
        cpu_sample(3.5, 50, "w3wp"),
        forwarder_start(5.0, URL, "B"),
        site_start(6.0, 77, URL),
        jit_start(7.0, 77, "m2"),
        jit_load(9.0, 77, "m2", "Late", "Method"),
        request_end(10.0, "B", 200),
    ];
    let report = analyze(&events).unwrap();

    assert_eq!(report.window_start_ms, 5.0);
    assert_eq!(report.cold_start_ms, Some(5.0));
    assert_eq!(report.host_pid, Some(77));
    assert_eq!(report.host.jit.total_ms, 2.0);
    assert!(report.host.jit.lines.iter().all(|l| l.name == "Late::Method"));
    assert_eq!(report.total_cpu_samples, 0);
}

#[test]
fn test_window_boundaries_are_start_exclusive_end_inclusive() {
    let events = vec![
        forwarder_start(0.0, URL, "A"),
        site_start(0.5, 77, URL),
        cpu_sample(0.0, 77, "w3wp"),
        cpu_sample(10.0, 77, "w3wp"),
        disk_read(0.0, 77, "C:\\before.dll", 1.0),
        disk_read(10.0, 77, "C:\\at-end.dll", 2.0),
        request_end(10.0, "A", 200),
        cpu_sample(10.5, 77, "w3wp"),
    ];
    let feed = EventFeed::from_events(events);
    let report = analyze(feed.events()).unwrap();

    assert_eq!(report.total_cpu_samples, 1);
    assert_eq!(report.disk_reads.len(), 1);
    assert_eq!(report.disk_reads[0].name, "C:\\at-end.dll");
}

#[test]
fn test_primary_host_resolution_never_replays() {
    let mut events = reference_feed();
    events.insert(2, begin_request(1.5, 99, URL));
    let report = analyze(&events).unwrap();
    assert_eq!(report.passes, 1);
    assert_eq!(report.host_pid, Some(77));
}

#[test]
fn test_replay_recovers_host_from_begin_request() {
    let events = vec![
        forwarder_start(0.0, URL, "A"),
        begin_request(1.0, 77, URL),
        jit_start(2.0, 77, "m1"),
        jit_load(6.0, 77, "m1", "Foo", "Bar"),
        gc(7.0, 77, false, 1),
        gc(8.5, 77, true, 1),
        cpu_sample(9.0, 77, "w3wp"),
        request_end(20.0, "A", 200),
    ];
    let report = analyze(&events).unwrap();

    assert_eq!(report.passes, 2);
    assert_eq!(report.host_pid, Some(77));
    // nothing counted twice across the passes
    assert_eq!(report.host.jit.total_ms, 4.0);
    assert_eq!(report.host.gc_ms, 1.5);
    assert_eq!(report.total_cpu_samples, 1);
    assert_eq!(report.host.cpu_samples, 1);
}

#[test]
fn test_unresolved_host_after_replay_omits_host_metrics() {
    let events = vec![
        forwarder_start(0.0, URL, "A"),
        jit_start(2.0, 77, "m1"),
        jit_load(6.0, 77, "m1", "Foo", "Bar"),
        cpu_sample(7.0, 77, "w3wp"),
        request_end(20.0, "A", 500),
    ];
    let report = analyze(&events).unwrap();

    assert_eq!(report.passes, 2);
    assert_eq!(report.host_pid, None);
    assert_eq!(report.host.jit.total_ms, 0.0);
    // unattributed counters still hold
    assert_eq!(report.total_cpu_samples, 1);
    assert_eq!(report.http_status, 500);
}

#[test]
fn test_worker_resolved_from_host_log() {
    let mut events = reference_feed();
    events.insert(
        2,
        host_log_verbose(
            1.5,
            77,
            "Sending FunctionEnvironmentReloadRequest to WorkerProcess with Pid: '4312'",
        ),
    );
    events.insert(4, jit_start(3.0, 4312, "w1"));
    events.insert(5, jit_load(5.0, 4312, "w1", "Worker", "Init"));
    let report = analyze(&events).unwrap();

    assert_eq!(report.worker_pid, Some(4312));
    assert_eq!(report.worker.jit.total_ms, 2.0);
    assert_eq!(report.host.jit.total_ms, 4.0);
    assert!(report.render_text().contains("LanguageWorkerPid: 4312"));
}

#[test]
fn test_secondary_service_resolved_in_window_only() {
    let mut events = reference_feed();
    events.insert(
        0,
        TraceEvent::new(-5.0, provider::DOTNET_RUNTIME, "GC/Start", 400, "DWASSVC").with("Count", 1i64),
    );
    events.insert(
        4,
        TraceEvent::new(3.0, provider::DOTNET_RUNTIME, "GC/Start", 500, "DWASSVC").with("Count", 2i64),
    );
    events.insert(
        5,
        TraceEvent::new(4.0, provider::DOTNET_RUNTIME, "GC/Stop", 500, "DWASSVC").with("Count", 2i64),
    );
    let report = analyze(&events).unwrap();
    assert_eq!(report.secondary_pid, Some(500));
    assert_eq!(report.secondary.gc_ms, 1.0);
}

#[test]
fn test_app_details_recorded_from_host_log() {
    let mut events = reference_feed();
    events.insert(4, executed_request(10.0, 77, "myapp", "req-42"));
    let report = analyze(&events).unwrap();
    assert_eq!(report.app_name, "myapp");
    assert_eq!(report.activity_id, "req-42");
    assert_eq!(report.host_version, "4.34.1");
}

#[test]
fn test_malformed_events_are_counted_not_fatal() {
    let mut events = reference_feed();
    events.insert(
        2,
        TraceEvent::new(1.5, provider::KERNEL, "DiskIO/Read", 77, "w3wp").with("FileName", "C:\\x"),
    );
    let report = analyze(&events).unwrap();
    assert_eq!(report.skipped_events, 1);
    assert_eq!(report.host.jit.total_ms, 4.0);
}

#[test]
fn test_start_after_closed_window_begins_new_subject() {
    let mut events = reference_feed();
    events.extend([
        forwarder_start(30.0, URL, "B"),
        site_start(31.0, 88, URL),
        request_end(45.0, "B", 201),
    ]);
    let report = analyze(&events).unwrap();
    assert_eq!(report.window_start_ms, 30.0);
    assert_eq!(report.host_pid, Some(88));
    assert_eq!(report.http_status, 201);
    assert_eq!(report.host.jit.total_ms, 0.0);
}

#[test]
fn test_placeholder_window_from_host_activity() {
    use coldtrace::event::PayloadValue;

    let host = "Microsoft.Azure.WebJobs.Script.WebHost";
    let args = vec![
        PayloadValue::from("HttpRequestIn"),
        PayloadValue::from("GET"),
        PayloadValue::from(vec![PayloadValue::from("Path=/api/x")]),
    ];
    let events = vec![
        TraceEvent::new(1.0, provider::DIAGNOSTIC_SOURCE, "Activity1Start/Start", 66, host)
            .with("EventName", "Microsoft.AspNetCore.Hosting.HttpRequestIn.Start")
            .with("Arguments", args),
        jit_start(2.0, 66, "m1"),
        jit_load(5.0, 66, "m1", "Foo", "Bar"),
        TraceEvent::new(8.0, provider::DIAGNOSTIC_SOURCE, "Activity1Stop/Stop", 66, host),
    ];
    let report = analyze(&events).unwrap();

    assert_eq!(report.window_source, WindowSource::Placeholder);
    assert_eq!(report.host_pid, Some(66));
    assert_eq!(report.cold_start_ms, Some(7.0));
    assert_eq!(report.http_status, 200);
    assert_eq!(report.host.jit.total_ms, 3.0);
}

const HOST_PROCESS: &str = "Microsoft.Azure.WebJobs.Script.WebHost";

fn placeholder_start(ts: f64, pid: u32, path: &str) -> TraceEvent {
    use coldtrace::event::PayloadValue;

    let args = vec![
        PayloadValue::from("HttpRequestIn"),
        PayloadValue::from("GET"),
        PayloadValue::from(vec![PayloadValue::from(format!("Path={path}"))]),
    ];
    TraceEvent::new(ts, provider::DIAGNOSTIC_SOURCE, "Activity1Start/Start", pid, HOST_PROCESS)
        .with("EventName", "Microsoft.AspNetCore.Hosting.HttpRequestIn.Start")
        .with("Arguments", args)
}

fn placeholder_stop(ts: f64, pid: u32) -> TraceEvent {
    TraceEvent::new(ts, provider::DIAGNOSTIC_SOURCE, "Activity1Stop/Stop", pid, HOST_PROCESS)
}

#[test]
fn test_placeholder_window_end_is_not_moved_by_later_stop() {
    let events = vec![
        placeholder_start(0.0, 66, "/api/x"),
        jit_start(1.0, 66, "m1"),
        jit_load(3.0, 66, "m1", "Foo", "Bar"),
        placeholder_stop(5.0, 66),
        jit_start(10.0, 66, "m2"),
        jit_load(20.0, 66, "m2", "Late", "Method"),
        placeholder_stop(50.0, 66),
    ];
    let report = analyze(&events).unwrap();

    assert_eq!(report.window_end_ms, Some(5.0));
    assert_eq!(report.cold_start_ms, Some(5.0));
    assert_eq!(report.host.jit.total_ms, 2.0);
}

#[test]
fn test_placeholder_window_opens_on_any_api_path() {
    // the configured pattern names the request under test, the placeholder
    // request only has to be an API call
    let events = vec![
        placeholder_start(0.0, 66, "/api/HttpTrigger"),
        placeholder_stop(4.0, 66),
    ];
    let report = analyze(&events).unwrap();
    assert_eq!(report.window_source, WindowSource::Placeholder);
    assert_eq!(report.host_pid, Some(66));
    assert_eq!(report.cold_start_ms, Some(4.0));
}

#[test]
fn test_allocation_total_saturates() {
    let mut events = reference_feed();
    let tick = |ts: f64| {
        TraceEvent::new(ts, provider::DOTNET_RUNTIME, "GC/AllocationTick", 77, "w3wp")
            .with("AllocationAmount", i64::MAX)
    };
    events.insert(3, tick(3.0));
    events.insert(4, tick(4.0));
    let report = analyze(&events).unwrap();
    assert_eq!(report.host.gc_allocation_bytes, i64::MAX);
    assert_eq!(report.skipped_events, 0);
}

#[test]
fn test_independent_analyses_share_nothing() {
    let a = Correlator::new(config()).analyze(&reference_feed()).unwrap();
    let b = Correlator::new(config()).analyze(&reference_feed()).unwrap();
    assert_eq!(a, b);
}
