#![allow(dead_code)]

use std::path::Path;

use bundlecov::config::{AnalysisConfig, JourneyConfig, PageConfig};
use bundlecov::model::{CoverageRange, CoverageSample, FunctionCoverage};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const ORIGIN: &str = "https://shop.example.com";

pub fn page(name: &str) -> PageConfig {
    PageConfig {
        name: name.to_string(),
        url: format!("{ORIGIN}/{name}"),
    }
}

/// A config over `pages` reading from `dir`.
pub fn config(dir: &Path, pages: &[&str], journeys: &[(&str, &[&str])]) -> AnalysisConfig {
    AnalysisConfig {
        data_dir: dir.to_path_buf(),
        pages: pages.iter().map(|p| page(p)).collect(),
        journeys: journeys
            .iter()
            .map(|(name, pages)| JourneyConfig {
                name: name.to_string(),
                pages: pages.iter().map(|p| p.to_string()).collect(),
            })
            .collect(),
        ..Default::default()
    }
}

/// A v3 source map.
pub fn source_map(sources: &[&str], mappings: &str) -> Value {
    json!({
        "version": 3,
        "sources": sources,
        "names": [],
        "mappings": mappings,
    })
}

/// Coverage in the browser's wire shape: a script-level range over
/// `[0, length)` plus the given unexecuted blocks.
pub fn coverage(length: usize, unexecuted: &[(usize, usize)]) -> Value {
    let mut ranges = vec![json!({ "startOffset": 0, "endOffset": length, "count": 1 })];
    ranges.extend(
        unexecuted
            .iter()
            .map(|(start, end)| json!({ "startOffset": start, "endOffset": end, "count": 0 })),
    );
    json!([{ "functionName": "", "ranges": ranges, "isBlockCoverage": true }])
}

pub fn sample(length: usize, unexecuted: &[(usize, usize)]) -> CoverageSample {
    let mut ranges = vec![CoverageRange {
        start_offset: 0,
        end_offset: length,
        count: 1,
    }];
    ranges.extend(unexecuted.iter().map(|&(start_offset, end_offset)| CoverageRange {
        start_offset,
        end_offset,
        count: 0,
    }));
    CoverageSample::new(vec![FunctionCoverage {
        function_name: String::new(),
        ranges,
        is_block_coverage: true,
    }])
}

/// Builds one page load's `artifacts.json`.
#[derive(Default)]
pub struct Capture {
    scripts: Vec<Value>,
    maps: Vec<Value>,
    usage: serde_json::Map<String, Value>,
}

impl Capture {
    pub fn script(mut self, url: &str, content: &str) -> Self {
        self.scripts.push(json!({ "src": url, "content": content }));
        self
    }

    pub fn map(mut self, url: &str, map: Value) -> Self {
        self.maps.push(json!({
            "scriptUrl": url,
            "sourceMapUrl": format!("{url}.map"),
            "map": map,
        }));
        self
    }

    pub fn usage(mut self, url: &str, coverage: Value) -> Self {
        self.usage.insert(url.to_string(), coverage);
        self
    }

    /// Write under `<dir>/<sanitized page url>/<load>/artifacts.json`.
    pub fn write(self, dir: &Path, page: &PageConfig, load: &str) {
        let load_dir = bundlecov::ingest::page_dir(dir, &page.url).join(load);
        std::fs::create_dir_all(&load_dir).unwrap();
        let artifacts = json!({
            "ScriptElements": self.scripts,
            "SourceMaps": self.maps,
            "JsUsage": self.usage,
        });
        std::fs::write(load_dir.join("artifacts.json"), artifacts.to_string()).unwrap();
    }
}

pub fn tempdir() -> TempDir {
    tempfile::tempdir().unwrap()
}
