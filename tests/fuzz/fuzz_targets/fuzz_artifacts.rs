#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Artifact parsing and reconciliation must not panic on any input.
    if let Ok(artifacts) = bundlecov::ingest::parse_artifacts(data) {
        for (key, usage) in artifacts.js_usage {
            for (_, sample) in usage.into_samples(&key) {
                let _ = bundlecov::usage::reconcile(&[sample], data.len());
            }
        }
    }
});
