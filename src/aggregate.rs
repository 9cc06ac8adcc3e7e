//! Script aggregator.
//!
//! Prepares every captured script once (source-map attribution, coverage
//! reconciliation), then builds one [`GroupReport`] per page group. Groups
//! only read the prepared scripts, so they can be spread over a bounded
//! number of threads; reports always come back in plan order.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, info, warn};
use url::{Origin, Url};

use crate::attribution::{compute_file_size_map, unused_by_source};
use crate::audit::{AuditArtifacts, AuditBundle, DuplicationAudit};
use crate::config::{AnalysisConfig, JourneyConfig, PageConfig};
use crate::error::Result;
use crate::mapping::{self, MappingPolicy};
use crate::model::{
    FileSizeMap, GroupReport, PageGroup, RunReport, ScriptAnalysis, ScriptRecord, SkipStage,
    SkippedScript, SourceMapping, UsageRanges, WasteItem, WasteReport,
};
use crate::usage;

/// Name of the group holding every page.
pub const ALL_PAGES: &str = "all";

/// Whether `url` shares `origin`. Unparseable URLs are third-party.
#[must_use]
pub fn is_same_origin(url: &str, origin: &Origin) -> bool {
    Url::parse(url).is_ok_and(|u| &u.origin() == origin)
}

/// All pages, then each journey, then each page alone. Groups with the same
/// membership as an earlier one are dropped.
#[must_use]
pub fn plan_groups(pages: &[PageConfig], journeys: &[JourneyConfig]) -> Vec<PageGroup> {
    let all = PageGroup {
        name: ALL_PAGES.to_string(),
        pages: pages.iter().map(|p| p.name.clone()).collect(),
    };
    let journeys = journeys.iter().map(|j| PageGroup {
        name: j.name.clone(),
        pages: j.pages.iter().cloned().collect(),
    });
    let singles = pages.iter().map(|p| PageGroup {
        name: p.name.clone(),
        pages: BTreeSet::from([p.name.clone()]),
    });

    let mut memberships: HashSet<BTreeSet<String>> = HashSet::new();
    std::iter::once(all)
        .chain(journeys)
        .chain(singles)
        .filter(|group| memberships.insert(group.pages.clone()))
        .collect()
}

/// A captured script together with everything derived from it.
#[derive(Debug, Clone)]
pub struct PreparedScript<'a> {
    pub record: &'a ScriptRecord,
    pub first_party: bool,
    /// Decoded mappings; `None` without a usable source map.
    pub mappings: Option<Vec<SourceMapping>>,
    pub file_sizes: Option<FileSizeMap>,
    pub usage: Option<UsageRanges>,
    pub unused_by_source: BTreeMap<String, u64>,
}

impl PreparedScript<'_> {
    fn is_in(&self, group: &PageGroup) -> bool {
        !self.record.seen.is_disjoint(&group.pages)
    }

    fn to_analysis(&self) -> ScriptAnalysis {
        ScriptAnalysis {
            url: self.record.url.clone(),
            size: self.record.size(),
            first_party: self.first_party,
            pages: self.record.seen.iter().cloned().collect(),
            file_sizes: self.file_sizes.clone(),
            usage: self.usage.clone(),
            unused_by_source: self.unused_by_source.clone(),
            coverage_samples: self.record.coverage.len(),
        }
    }
}

/// Attribute and reconcile one script. Failures are returned as skip
/// records; the script itself is always kept for size totals.
pub fn prepare_script<'a>(
    record: &'a ScriptRecord,
    origin: &Origin,
    policy: MappingPolicy,
) -> (PreparedScript<'a>, Vec<SkippedScript>) {
    let mut skipped = Vec::new();
    let mut skip = |stage: SkipStage, reason: String| {
        warn!(script = %record.url, %stage, %reason, "skipping script");
        skipped.push(SkippedScript {
            url: record.url.clone(),
            stage,
            reason,
        });
    };

    let attributed = record.map.as_ref().and_then(|map| {
        let attributed = mapping::decode(map).and_then(|mappings| {
            let sizes = compute_file_size_map(&mappings, &record.content, policy)?;
            Ok((mappings, sizes))
        });
        match attributed {
            Ok(pair) => Some(pair),
            Err(e) => {
                skip(SkipStage::SourceMap, e.to_string());
                None
            }
        }
    });

    let usage = if record.coverage.is_empty() {
        None
    } else {
        match usage::reconcile(&record.coverage, record.content.len()) {
            Ok(mask) => Some(mask.to_ranges()),
            Err(e) => {
                skip(SkipStage::Coverage, e.to_string());
                None
            }
        }
    };

    let unused = match (&attributed, &usage) {
        (Some((mappings, _)), Some(usage)) => {
            match unused_by_source(mappings, &record.content, usage, policy) {
                Ok(unused) => unused,
                Err(e) => {
                    skip(SkipStage::Coverage, e.to_string());
                    BTreeMap::new()
                }
            }
        }
        _ => BTreeMap::new(),
    };

    let (mappings, file_sizes) = match attributed {
        Some((mappings, sizes)) => (Some(mappings), Some(sizes)),
        None => (None, None),
    };

    debug!(script = %record.url, size = record.size(), "prepared script");
    let prepared = PreparedScript {
        record,
        first_party: is_same_origin(&record.url, origin),
        mappings,
        file_sizes,
        usage,
        unused_by_source: unused,
    };
    (prepared, skipped)
}

/// Aggregate the scripts loaded by one group.
pub fn group_report(
    group: &PageGroup,
    scripts: &[PreparedScript<'_>],
    audit: &dyn DuplicationAudit,
    unused_threshold: u64,
) -> GroupReport {
    let selected: Vec<&PreparedScript<'_>> = scripts.iter().filter(|s| s.is_in(group)).collect();

    let (first_party_bytes, third_party_bytes) =
        selected.iter().fold((0u64, 0u64), |(first, third), s| {
            if s.first_party {
                (first + s.record.size(), third)
            } else {
                (first, third + s.record.size())
            }
        });

    let artifacts = AuditArtifacts {
        bundles: selected
            .iter()
            .filter_map(|s| {
                s.mappings.as_deref().map(|mappings| AuditBundle {
                    script_url: &s.record.url,
                    content: &s.record.content,
                    mappings,
                })
            })
            .collect(),
    };

    let (duplication, audit_error) = match audit.audit(&artifacts) {
        Ok(report) => (WasteReport::from_items(report.items), None),
        Err(e) => {
            warn!(group = %group.name, error = %e, "duplication audit failed");
            (WasteReport::default(), Some(e.to_string()))
        }
    };

    let unused = WasteReport::from_items(
        selected
            .iter()
            .filter_map(|s| {
                let usage = s.usage.as_ref()?;
                let wasted_bytes = usage.wasted_bytes();
                (wasted_bytes > 0 && wasted_bytes >= unused_threshold).then(|| WasteItem {
                    source: s.record.url.clone(),
                    wasted_bytes,
                    occurrences: s.record.coverage.len(),
                })
            })
            .collect(),
    );

    debug!(
        group = %group.name,
        scripts = selected.len(),
        bundles = artifacts.bundles.len(),
        duplicated = duplication.wasted_bytes,
        "aggregated group"
    );

    GroupReport {
        name: group.name.clone(),
        pages: group.pages.iter().cloned().collect(),
        script_count: selected.len(),
        first_party_bytes,
        third_party_bytes,
        total_bytes: first_party_bytes + third_party_bytes,
        duplication,
        unused,
        audit_error,
    }
}

/// Build every group report, on up to `workers` threads.
pub fn run_groups(
    groups: &[PageGroup],
    scripts: &[PreparedScript<'_>],
    audit: &dyn DuplicationAudit,
    unused_threshold: u64,
    workers: usize,
) -> Vec<GroupReport> {
    if workers <= 1 || groups.len() <= 1 {
        return groups
            .iter()
            .map(|g| group_report(g, scripts, audit, unused_threshold))
            .collect();
    }

    let chunk_size = groups.len().div_ceil(workers);
    std::thread::scope(|scope| {
        let handles: Vec<_> = groups
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|g| group_report(g, scripts, audit, unused_threshold))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

/// Run the whole analysis over captured scripts.
pub fn analyze(
    records: &[ScriptRecord],
    config: &AnalysisConfig,
    audit: &dyn DuplicationAudit,
) -> Result<RunReport> {
    let origin = config.base_origin()?;
    let policy = config.mapping_policy();

    let mut skipped = Vec::new();
    let mut prepared = Vec::with_capacity(records.len());
    for record in records {
        let (script, skips) = prepare_script(record, &origin, policy);
        prepared.push(script);
        skipped.extend(skips);
    }

    let groups = plan_groups(&config.pages, &config.journeys);
    let reports = run_groups(
        &groups,
        &prepared,
        audit,
        config.unused_threshold,
        config.workers,
    );

    let mut scripts: Vec<ScriptAnalysis> = prepared.iter().map(|s| s.to_analysis()).collect();
    scripts.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.url.cmp(&b.url)));

    info!(
        scripts = scripts.len(),
        groups = reports.len(),
        skipped = skipped.len(),
        "analysis complete"
    );

    Ok(RunReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        base_origin: origin.ascii_serialization(),
        scripts,
        groups: reports,
        skipped,
    })
}
