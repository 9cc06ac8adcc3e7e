//! Output formatting for analysis runs.

use std::fmt::Write;

use serde::Serialize;
use url::Url;

use crate::model::{rate, GroupReport, RunReport, SkippedScript, WasteReport};
use crate::rank::{top_n, RankedRow};

/// A bundle with its largest original source files.
#[derive(Debug, Clone, Serialize)]
pub struct BundleSummary {
    pub url: String,
    pub size: u64,
    pub files: Vec<RankedRow>,
}

/// One first-party script in the size table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeRow {
    /// Path and query of the script URL.
    pub script: String,
    pub size_kb: u64,
    pub pages: String,
}

/// Bundles with a source map, largest first, each with its top `limit`
/// source files.
#[must_use]
pub fn bundle_summaries(report: &RunReport, limit: usize) -> Vec<BundleSummary> {
    report
        .scripts
        .iter()
        .filter_map(|script| {
            let sizes = script.file_sizes.as_ref()?;
            Some(BundleSummary {
                url: script.url.clone(),
                size: script.size,
                files: top_n(sizes.sorted_files(), limit),
            })
        })
        .collect()
}

/// First-party scripts, largest first.
#[must_use]
pub fn size_rows(report: &RunReport) -> Vec<SizeRow> {
    report
        .scripts
        .iter()
        .filter(|s| s.first_party)
        .map(|s| SizeRow {
            script: trim_same_origin(&s.url, &report.base_origin),
            size_kb: kilobytes(s.size),
            pages: s.pages.join(", "),
        })
        .collect()
}

/// Strip the origin from first-party URLs, leaving path and query.
#[must_use]
pub fn trim_same_origin(url: &str, base_origin: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.origin().ascii_serialization() == base_origin => {
            let mut trimmed = parsed.path().to_string();
            if let Some(query) = parsed.query() {
                trimmed.push('?');
                trimmed.push_str(query);
            }
            trimmed
        }
        _ => url.to_string(),
    }
}

#[must_use]
pub fn kilobytes(bytes: u64) -> u64 {
    (bytes as f64 / 1024.0).round() as u64
}

/// Trait for rendering the sections of a run.
pub trait ReportFormatter {
    fn bundles(&self, bundles: &[BundleSummary]) -> String;
    fn sizes(&self, rows: &[SizeRow]) -> String;
    fn groups(&self, groups: &[GroupReport], limit: usize) -> String;
    fn skipped(&self, skipped: &[SkippedScript]) -> String;

    /// Every section, in reading order.
    fn format(&self, report: &RunReport, limit: usize) -> String {
        let mut out = String::new();
        out.push_str(&self.groups(&report.groups, limit));
        out.push_str(&self.bundles(&bundle_summaries(report, limit)));
        out.push_str(&self.sizes(&size_rows(report)));
        if !report.skipped.is_empty() {
            out.push_str(&self.skipped(&report.skipped));
        }
        out
    }
}

fn waste_rows(waste: &WasteReport, limit: usize) -> Vec<RankedRow> {
    top_n(
        waste
            .items
            .iter()
            .map(|i| (i.source.as_str(), i.wasted_bytes)),
        limit,
    )
}

/// Plain text formatter.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn bundles(&self, bundles: &[BundleSummary]) -> String {
        let mut out = String::from("====== bundles\n");
        for bundle in bundles {
            writeln!(out, "______ {} {}", bundle.url, bundle.size).unwrap();
            for row in &bundle.files {
                writeln!(out, "{} {}", row.label, row.value).unwrap();
            }
        }
        out
    }

    fn sizes(&self, rows: &[SizeRow]) -> String {
        let mut out = String::from("====== javascript size and pages\n");
        if rows.is_empty() {
            out.push_str("No first-party scripts.\n");
            return out;
        }
        writeln!(out, "{:<60} {:>10}  PAGES", "SCRIPT", "SIZE (KB)").unwrap();
        writeln!(out, "{}", "-".repeat(88)).unwrap();
        for row in rows {
            writeln!(out, "{:<60} {:>10}  {}", row.script, row.size_kb, row.pages).unwrap();
        }
        out
    }

    fn groups(&self, groups: &[GroupReport], limit: usize) -> String {
        let mut out = String::new();
        for group in groups {
            let pages = group.pages.join(", ");
            writeln!(out, "====== group '{}' ({pages})", group.name).unwrap();
            writeln!(
                out,
                "Scripts:      {}\nFirst-party:  {} bytes\nThird-party:  {} bytes\nTotal:        {} bytes\nDuplicated:   {} bytes ({:.1}%)",
                group.script_count,
                group.first_party_bytes,
                group.third_party_bytes,
                group.total_bytes,
                group.duplicated_bytes(),
                rate(group.duplicated_bytes(), group.total_bytes) * 100.0,
            )
            .unwrap();
            if let Some(ref err) = group.audit_error {
                writeln!(out, "Duplication audit failed: {err}").unwrap();
            }
            for row in waste_rows(&group.duplication, limit) {
                writeln!(out, "  {:<70} {:>10}", row.label, row.value).unwrap();
            }
            if group.unused.wasted_bytes > 0 {
                writeln!(
                    out,
                    "Unused:       {} bytes ({:.1}%)",
                    group.unused.wasted_bytes,
                    rate(group.unused.wasted_bytes, group.total_bytes) * 100.0
                )
                .unwrap();
                for row in waste_rows(&group.unused, limit) {
                    writeln!(out, "  {:<70} {:>10}", row.label, row.value).unwrap();
                }
            }
            out.push('\n');
        }
        out
    }

    fn skipped(&self, skipped: &[SkippedScript]) -> String {
        let mut out = String::from("====== skipped\n");
        for s in skipped {
            writeln!(out, "{} [{}] {}", s.url, s.stage, s.reason).unwrap();
        }
        out
    }
}

/// Markdown formatter.
pub struct MarkdownFormatter;

impl ReportFormatter for MarkdownFormatter {
    fn bundles(&self, bundles: &[BundleSummary]) -> String {
        let mut md = String::from("### Bundles\n\n");
        for bundle in bundles {
            writeln!(md, "**`{}`** ({} bytes)\n", bundle.url, bundle.size).unwrap();
            md.push_str("| Source | Bytes |\n|:-------|------:|\n");
            for row in &bundle.files {
                if row.remainder {
                    writeln!(md, "| _{}_ | {} |", row.label, row.value).unwrap();
                } else {
                    writeln!(md, "| `{}` | {} |", row.label, row.value).unwrap();
                }
            }
            md.push('\n');
        }
        md
    }

    fn sizes(&self, rows: &[SizeRow]) -> String {
        let mut md = String::from("### JavaScript size and pages\n\n");
        if rows.is_empty() {
            md.push_str("No first-party scripts.\n\n");
            return md;
        }
        md.push_str("| Script | Size (KB) | Pages |\n|:-------|----------:|:------|\n");
        for row in rows {
            writeln!(md, "| `{}` | {} | {} |", row.script, row.size_kb, row.pages).unwrap();
        }
        md.push('\n');
        md
    }

    fn groups(&self, groups: &[GroupReport], limit: usize) -> String {
        let mut md = String::from("### Page groups\n\n");
        md.push_str("| Group | Scripts | First-party | Third-party | Total | Duplicated | Unused |\n");
        md.push_str("|:------|--------:|------------:|------------:|------:|-----------:|-------:|\n");
        for g in groups {
            writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} | {} |",
                g.name,
                g.script_count,
                g.first_party_bytes,
                g.third_party_bytes,
                g.total_bytes,
                g.duplicated_bytes(),
                g.unused.wasted_bytes,
            )
            .unwrap();
        }
        md.push('\n');

        for g in groups.iter().filter(|g| !g.duplication.items.is_empty()) {
            writeln!(md, "<details>\n<summary>Duplicated in {}</summary>\n", g.name).unwrap();
            md.push_str("| Source | Wasted bytes |\n|:-------|-------------:|\n");
            for row in waste_rows(&g.duplication, limit) {
                writeln!(md, "| `{}` | {} |", row.label, row.value).unwrap();
            }
            md.push_str("\n</details>\n\n");
        }

        for g in groups.iter().filter(|g| !g.unused.items.is_empty()) {
            writeln!(md, "<details>\n<summary>Unused in {}</summary>\n", g.name).unwrap();
            md.push_str("| Script | Unused bytes |\n|:-------|-------------:|\n");
            for row in waste_rows(&g.unused, limit) {
                writeln!(md, "| `{}` | {} |", row.label, row.value).unwrap();
            }
            md.push_str("\n</details>\n\n");
        }
        md
    }

    fn skipped(&self, skipped: &[SkippedScript]) -> String {
        let mut md = String::from("### Skipped scripts\n\n");
        for s in skipped {
            writeln!(md, "- `{}` ({}): {}", s.url, s.stage, s.reason).unwrap();
        }
        md.push('\n');
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileSizeMap, ScriptAnalysis, SkipStage, WasteItem};

    fn sample_report() -> RunReport {
        let mut sizes = FileSizeMap::default();
        for (i, size) in [500u64, 400, 300, 200, 100, 50, 25].iter().enumerate() {
            sizes.files.insert(format!("src/f{i}.ts"), *size);
        }
        sizes.total_bytes = 1600;
        sizes.unmapped_bytes = 25;

        RunReport {
            generated_at: "2024-01-01T00:00:00+00:00".to_string(),
            base_origin: "https://www.example.com".to_string(),
            scripts: vec![
                ScriptAnalysis {
                    url: "https://www.example.com/app.js?v=2".to_string(),
                    size: 4096,
                    first_party: true,
                    pages: vec!["home".to_string(), "search".to_string()],
                    file_sizes: Some(sizes),
                    ..Default::default()
                },
                ScriptAnalysis {
                    url: "https://cdn.other.com/lib.js".to_string(),
                    size: 1000,
                    first_party: false,
                    pages: vec!["home".to_string()],
                    ..Default::default()
                },
            ],
            groups: vec![GroupReport {
                name: "all".to_string(),
                pages: vec!["home".to_string(), "search".to_string()],
                script_count: 2,
                first_party_bytes: 4096,
                third_party_bytes: 1000,
                total_bytes: 5096,
                duplication: WasteReport::from_items(vec![WasteItem {
                    source: "node_modules/react/index.js".to_string(),
                    wasted_bytes: 2048,
                    occurrences: 2,
                }]),
                ..Default::default()
            }],
            skipped: vec![SkippedScript {
                url: "https://www.example.com/bad.js".to_string(),
                stage: SkipStage::Coverage,
                reason: "mismatch".to_string(),
            }],
        }
    }

    #[test]
    fn test_trim_same_origin() {
        let origin = "https://www.example.com";
        assert_eq!(trim_same_origin("https://www.example.com/a/b.js?x=1", origin), "/a/b.js?x=1");
        assert_eq!(trim_same_origin("https://www.example.com/a.js", origin), "/a.js");
        assert_eq!(
            trim_same_origin("https://cdn.other.com/a.js", origin),
            "https://cdn.other.com/a.js"
        );
    }

    #[test]
    fn test_kilobytes_rounds() {
        assert_eq!(kilobytes(0), 0);
        assert_eq!(kilobytes(511), 0);
        assert_eq!(kilobytes(512), 1);
        assert_eq!(kilobytes(4096), 4);
    }

    #[test]
    fn test_bundle_summaries_fold_tail() {
        let bundles = bundle_summaries(&sample_report(), 5);
        assert_eq!(bundles.len(), 1);
        let files = &bundles[0].files;
        assert_eq!(files.len(), 6);
        assert_eq!(files[0].label, "src/f0.ts");
        assert_eq!(files[5].label, "2 more");
        assert_eq!(files[5].value, 75);
    }

    #[test]
    fn test_size_rows_first_party_only() {
        let rows = size_rows(&sample_report());
        assert_eq!(
            rows,
            vec![SizeRow {
                script: "/app.js?v=2".to_string(),
                size_kb: 4,
                pages: "home, search".to_string(),
            }]
        );
    }

    #[test]
    fn test_format_text() {
        let out = TextFormatter.format(&sample_report(), 5);
        assert!(out.contains("====== group 'all' (home, search)"));
        assert!(out.contains("Duplicated:   2048 bytes (40.2%)"));
        assert!(out.contains("______ https://www.example.com/app.js?v=2 4096"));
        assert!(out.contains("2 more 75"));
        assert!(out.contains("/app.js?v=2"));
        assert!(out.contains("[coverage] mismatch"));
    }

    #[test]
    fn test_format_markdown() {
        let md = MarkdownFormatter.format(&sample_report(), 5);
        assert!(md.contains("| all | 2 | 4096 | 1000 | 5096 | 2048 | 0 |"));
        assert!(md.contains("| `node_modules/react/index.js` | 2048 |"));
        assert!(md.contains("| _2 more_ | 75 |"));
        assert!(md.contains("| `/app.js?v=2` | 4 | home, search |"));
        assert!(md.contains("### Skipped scripts"));
        assert!(!md.contains("Unused in all"));
    }

    #[test]
    fn test_format_markdown_unused_details() {
        let mut report = sample_report();
        report.groups[0].unused = WasteReport::from_items(vec![
            WasteItem {
                source: "https://www.example.com/app.js?v=2".to_string(),
                wasted_bytes: 1500,
                occurrences: 2,
            },
            WasteItem {
                source: "https://cdn.other.com/lib.js".to_string(),
                wasted_bytes: 300,
                occurrences: 1,
            },
        ]);

        let md = MarkdownFormatter.format(&report, 5);
        assert!(md.contains("| all | 2 | 4096 | 1000 | 5096 | 2048 | 1800 |"));
        assert!(md.contains("<summary>Unused in all</summary>"));
        assert!(md.contains("| Script | Unused bytes |"));
        assert!(md.contains("| `https://www.example.com/app.js?v=2` | 1500 |"));
        assert!(md.contains("| `https://cdn.other.com/lib.js` | 300 |"));

        let duplicated = md.find("<summary>Duplicated in all</summary>").unwrap();
        let unused = md.find("<summary>Unused in all</summary>").unwrap();
        assert!(duplicated < unused);
    }
}
