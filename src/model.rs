//! Uniform in-memory representation of captured bundles and of everything
//! derived from them. Ingestion produces `ScriptRecord`s; the analysis
//! modules turn them into file-size maps, usage ranges and group reports.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Compute a byte ratio, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// A script captured on one or more pages. Identity is the URL.
#[derive(Debug, Clone, Default)]
pub struct ScriptRecord {
    pub url: String,
    pub content: String,
    /// Raw source-map payload, decoded lazily by the analysis.
    pub map: Option<serde_json::Value>,
    pub source_map_url: Option<String>,
    /// Names of the pages that loaded this script.
    pub seen: BTreeSet<String>,
    /// One sample per page load.
    pub coverage: Vec<CoverageSample>,
}

impl ScriptRecord {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Raw content length in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// A single `{startOffset, endOffset, count}` block as reported by the
/// browser's precise coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRange {
    pub start_offset: usize,
    pub end_offset: usize,
    pub count: u64,
}

/// Coverage of one function within a script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCoverage {
    #[serde(default)]
    pub function_name: String,
    pub ranges: Vec<CoverageRange>,
    #[serde(default)]
    pub is_block_coverage: bool,
}

/// One page load's execution record for a script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageSample {
    pub functions: Vec<FunctionCoverage>,
}

impl CoverageSample {
    pub fn new(functions: Vec<FunctionCoverage>) -> Self {
        Self { functions }
    }

    /// Every range of every function, in report order.
    pub fn ranges(&self) -> impl Iterator<Item = &CoverageRange> {
        self.functions.iter().flat_map(|f| f.ranges.iter())
    }

    /// Script length this sample reports: the end of its outermost range.
    #[must_use]
    pub fn length(&self) -> usize {
        self.ranges().map(|r| r.end_offset).max().unwrap_or(0)
    }
}

/// One decoded source-map entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapping {
    /// `None` for generated code without an original file.
    pub source: Option<String>,
    /// 1-based.
    pub generated_line: u32,
    /// 0-based.
    pub generated_column: u32,
    /// 0-based, inclusive. `None` means the span runs to end of line.
    pub last_generated_column: Option<u32>,
}

/// Bytes contributed by each original source file to one script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSizeMap {
    pub files: BTreeMap<String, u64>,
    pub unmapped_bytes: u64,
    /// Content length excluding newline bytes.
    pub total_bytes: u64,
}

impl FileSizeMap {
    #[must_use]
    pub fn mapped_bytes(&self) -> u64 {
        self.files.values().sum()
    }

    /// Files sorted by size descending, ties by name.
    #[must_use]
    pub fn sorted_files(&self) -> Vec<(&str, u64)> {
        let mut files: Vec<(&str, u64)> = self
            .files
            .iter()
            .map(|(name, size)| (name.as_str(), *size))
            .collect();
        files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        files
    }
}

/// A compressed run of equal per-offset values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRange {
    pub start_offset: usize,
    pub end_offset: usize,
    pub count: u32,
}

impl UsageRange {
    #[must_use]
    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }
}

/// Ordered ranges covering `[0, length)` exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRanges {
    pub length: usize,
    pub ranges: Vec<UsageRange>,
}

impl UsageRanges {
    /// Bytes in ranges with a non-zero value.
    #[must_use]
    pub fn wasted_bytes(&self) -> u64 {
        self.ranges
            .iter()
            .filter(|r| r.count > 0)
            .map(|r| r.len() as u64)
            .sum()
    }
}

/// A single duplicated source or unused script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasteItem {
    /// Original source name (duplication) or script URL (unused bytes).
    pub source: String,
    pub wasted_bytes: u64,
    pub occurrences: usize,
}

/// Ranked waste items with their total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasteReport {
    pub wasted_bytes: u64,
    pub items: Vec<WasteItem>,
}

impl WasteReport {
    /// Sort items by wasted bytes descending (ties by source) and recompute
    /// the total from the items.
    #[must_use]
    pub fn from_items(mut items: Vec<WasteItem>) -> Self {
        items.sort_by(|a, b| {
            b.wasted_bytes
                .cmp(&a.wasted_bytes)
                .then_with(|| a.source.cmp(&b.source))
        });
        let wasted_bytes = items.iter().map(|i| i.wasted_bytes).sum();
        Self {
            wasted_bytes,
            items,
        }
    }
}

/// A named set of pages whose scripts are aggregated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGroup {
    pub name: String,
    pub pages: BTreeSet<String>,
}

/// Aggregate over the scripts loaded by one page group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupReport {
    pub name: String,
    pub pages: Vec<String>,
    pub script_count: usize,
    pub first_party_bytes: u64,
    pub third_party_bytes: u64,
    pub total_bytes: u64,
    pub duplication: WasteReport,
    pub unused: WasteReport,
    /// Set when the duplication audit failed for this group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_error: Option<String>,
}

impl GroupReport {
    #[must_use]
    pub fn duplicated_bytes(&self) -> u64 {
        self.duplication.wasted_bytes
    }
}

/// Per-script analysis output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptAnalysis {
    pub url: String,
    pub size: u64,
    pub first_party: bool,
    pub pages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_sizes: Option<FileSizeMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageRanges>,
    /// Wasted bytes attributed to original source files.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unused_by_source: BTreeMap<String, u64>,
    pub coverage_samples: usize,
}

/// Which part of a script's analysis was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipStage {
    SourceMap,
    Coverage,
}

impl std::fmt::Display for SkipStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SkipStage::SourceMap => "source-map",
            SkipStage::Coverage => "coverage",
        })
    }
}

/// A script whose attribution or usage could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedScript {
    pub url: String,
    pub stage: SkipStage,
    pub reason: String,
}

/// Everything one analysis run produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: String,
    pub base_origin: String,
    pub scripts: Vec<ScriptAnalysis>,
    pub groups: Vec<GroupReport>,
    pub skipped: Vec<SkippedScript>,
}
