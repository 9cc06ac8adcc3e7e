#![no_main]
use libfuzzer_sys::fuzz_target;

use bundlecov::attribution::compute_file_size_map;
use bundlecov::mapping::{self, MappingPolicy};

fuzz_target!(|data: &[u8]| {
    // First line is the generated content, the rest a `mappings` string.
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let (content, mappings) = s.split_once('\n').unwrap_or((s, "AAAA"));
    let map = serde_json::json!({
        "version": 3,
        "sources": ["a.js", "b.js"],
        "names": [],
        "mappings": mappings,
    });
    if let Ok(decoded) = mapping::decode(&map) {
        if let Ok(sizes) = compute_file_size_map(&decoded, content, MappingPolicy::Lenient) {
            assert_eq!(sizes.mapped_bytes() + sizes.unmapped_bytes, sizes.total_bytes);
        }
    }
});
