//! Boundary to the duplication audit.
//!
//! The aggregator shapes each group's scripts into [`AuditArtifacts`] and
//! hands them to a [`DuplicationAudit`]. [`SourceDuplicationAudit`] is the
//! built-in implementation: a source shipped in several bundles wastes every
//! copy but the largest.

use std::collections::BTreeMap;

use crate::attribution::compute_file_size_map;
use crate::error::Result;
use crate::mapping::MappingPolicy;
use crate::model::{SourceMapping, WasteItem, WasteReport};

/// Default minimum wasted bytes for a duplicated source to be reported.
pub const DEFAULT_DUPLICATION_THRESHOLD: u64 = 1024;

/// One script with a decoded source map.
#[derive(Debug, Clone, Copy)]
pub struct AuditBundle<'a> {
    pub script_url: &'a str,
    pub content: &'a str,
    pub mappings: &'a [SourceMapping],
}

/// Everything the audit sees for one group.
#[derive(Debug, Clone, Default)]
pub struct AuditArtifacts<'a> {
    pub bundles: Vec<AuditBundle<'a>>,
}

/// Computes duplicated bytes across the bundles of a group.
pub trait DuplicationAudit: Sync {
    fn audit(&self, artifacts: &AuditArtifacts<'_>) -> Result<WasteReport>;
}

/// Built-in duplication audit over normalized source names.
#[derive(Debug, Clone)]
pub struct SourceDuplicationAudit {
    pub threshold: u64,
}

impl Default for SourceDuplicationAudit {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DUPLICATION_THRESHOLD,
        }
    }
}

impl SourceDuplicationAudit {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }
}

impl DuplicationAudit for SourceDuplicationAudit {
    fn audit(&self, artifacts: &AuditArtifacts<'_>) -> Result<WasteReport> {
        let mut copies: BTreeMap<String, Vec<u64>> = BTreeMap::new();

        for bundle in &artifacts.bundles {
            let sizes =
                compute_file_size_map(bundle.mappings, bundle.content, MappingPolicy::Lenient)?;

            // Several raw names can normalize to one source within a bundle.
            let mut per_bundle: BTreeMap<String, u64> = BTreeMap::new();
            for (source, size) in &sizes.files {
                if should_ignore_source(source) {
                    continue;
                }
                *per_bundle.entry(normalize_source(source)).or_insert(0) += size;
            }

            for (source, size) in per_bundle {
                copies.entry(source).or_default().push(size);
            }
        }

        let items = copies
            .into_iter()
            .filter(|(_, sizes)| sizes.len() > 1)
            .filter_map(|(source, mut sizes)| {
                sizes.sort_unstable_by(|a, b| b.cmp(a));
                let wasted_bytes: u64 = sizes[1..].iter().sum();
                (wasted_bytes >= self.threshold).then(|| WasteItem {
                    source,
                    wasted_bytes,
                    occurrences: sizes.len(),
                })
            })
            .collect();

        Ok(WasteReport::from_items(items))
    }
}

/// Drop a trailing `?` and everything before the last `node_modules`.
#[must_use]
pub fn normalize_source(source: &str) -> String {
    let source = source.strip_suffix('?').unwrap_or(source);
    match source.rfind("node_modules") {
        Some(idx) => source[idx..].to_string(),
        None => source.to_string(),
    }
}

/// Bundler runtime and shim sources.
#[must_use]
pub fn should_ignore_source(source: &str) -> bool {
    source.contains("webpack/bootstrap")
        || source.contains("(webpack)/buildin")
        || source.contains("external ")
}
