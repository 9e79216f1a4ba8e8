#![no_main]

use coldtrace::config::AnalyzerConfig;
use coldtrace::correlator::Correlator;
use coldtrace::feed::EventFeed;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Any feed, however malformed, must parse and analyze without panicking
        let feed = EventFeed::parse_jsonl(input);
        let _ = Correlator::new(AnalyzerConfig::default()).analyze(feed.events());
    }
});
