//! Command handler functions for the bundlecov CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::aggregate;
use crate::audit::SourceDuplicationAudit;
use crate::config::AnalysisConfig;
use crate::ingest;
use crate::model::RunReport;
use crate::report::{self, MarkdownFormatter, ReportFormatter, TextFormatter};

/// Output style for every command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Style {
    #[default]
    Text,
    Markdown,
    Json,
}

impl Style {
    fn formatter(self) -> Option<Box<dyn ReportFormatter>> {
        match self {
            Style::Text => Some(Box::new(TextFormatter)),
            Style::Markdown => Some(Box::new(MarkdownFormatter)),
            Style::Json => None,
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    out.push('\n');
    Ok(out)
}

/// Load the captured artifacts and run the full analysis.
pub fn run_analysis(config: &AnalysisConfig) -> Result<RunReport> {
    config.validate()?;
    let collection = ingest::load_scripts(config)?;
    let records = collection.into_records();
    let audit = SourceDuplicationAudit::new(config.duplication_threshold);
    let report = aggregate::analyze(&records, config, &audit)?;
    Ok(report)
}

/// Every group report, bundle listing and size table.
pub fn cmd_analyze(config: &AnalysisConfig, style: Style) -> Result<String> {
    let report = run_analysis(config)?;
    match style.formatter() {
        Some(formatter) => Ok(formatter.format(&report, config.top_n)),
        None => to_json(&report),
    }
}

/// Largest original source files of each bundle.
pub fn cmd_bundles(config: &AnalysisConfig, style: Style) -> Result<String> {
    let report = run_analysis(config)?;
    let bundles = report::bundle_summaries(&report, config.top_n);
    match style.formatter() {
        Some(formatter) => Ok(formatter.bundles(&bundles)),
        None => to_json(&bundles),
    }
}

/// First-party scripts with their size and the pages loading them.
pub fn cmd_sizes(config: &AnalysisConfig, style: Style) -> Result<String> {
    let report = run_analysis(config)?;
    let rows = report::size_rows(&report);
    match style.formatter() {
        Some(formatter) => Ok(formatter.sizes(&rows)),
        None => to_json(&rows),
    }
}
