#![no_main]

use coldtrace::coldstart_file::{parse_section, Section};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        for section in [Section::Jit, Section::WorkerJit, Section::WorkerAssemblyLoader] {
            let _ = parse_section(input, section);
        }
    }
});
