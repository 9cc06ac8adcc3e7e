//! Load captured page artifacts and merge them into `ScriptRecord`s.
//!
//! Layout on disk, one directory per page:
//!
//! ```text
//! <data_dir>/<sanitize(page url)>/artifacts/artifacts.json
//! <data_dir>/<sanitize(page url)>/artifacts-2/artifacts.json   (another load)
//! ```
//!
//! Each `artifacts.json` is one page load:
//!   - `ScriptElements`: `[{ "src": "...", "content": "..." }]`
//!   - `SourceMaps`:     `[{ "scriptUrl": "...", "sourceMapUrl": "...", "map": {...} }]`
//!   - `JsUsage`, keyed by script URL or script id. Each value is either a
//!     bare function list `[{ "functionName", "ranges", "isBlockCoverage" }]`,
//!     a script coverage object `{ "scriptId", "url", "functions" }`, or a
//!     list of those. A script coverage `url` wins over the key.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::model::{CoverageSample, FunctionCoverage, ScriptRecord};

const ARTIFACTS_FILE: &str = "artifacts.json";

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new("[^a-zA-Z0-9]").unwrap());

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PageArtifacts {
    #[serde(default)]
    pub script_elements: Vec<ScriptElement>,
    #[serde(default)]
    pub source_maps: Vec<SourceMapArtifact>,
    #[serde(default)]
    pub js_usage: BTreeMap<String, ScriptUsage>,
}

/// Coverage of one script as captured in `JsUsage`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptUsage {
    Functions(Vec<FunctionCoverage>),
    Script(ScriptCoverage),
    Scripts(Vec<ScriptCoverage>),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCoverage {
    #[serde(default)]
    pub script_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub functions: Vec<FunctionCoverage>,
}

impl ScriptUsage {
    /// One `(script url, sample)` pair per script coverage entry.
    #[must_use]
    pub fn into_samples(self, key: &str) -> Vec<(String, CoverageSample)> {
        let entry = |script: ScriptCoverage| {
            let url = script
                .url
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| key.to_string());
            (url, CoverageSample::new(script.functions))
        };
        match self {
            ScriptUsage::Functions(functions) => {
                vec![(key.to_string(), CoverageSample::new(functions))]
            }
            ScriptUsage::Script(script) => vec![entry(script)],
            ScriptUsage::Scripts(scripts) => scripts.into_iter().map(entry).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptElement {
    /// Absent for inline scripts.
    pub src: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapArtifact {
    pub script_url: Option<String>,
    pub source_map_url: Option<String>,
    pub map: Option<serde_json::Value>,
}

/// Scripts merged across page loads, keyed by URL.
#[derive(Debug, Clone, Default)]
pub struct ScriptCollection {
    pub scripts: BTreeMap<String, ScriptRecord>,
    /// Source maps whose script was never captured.
    pub orphan_maps: Vec<String>,
}

impl ScriptCollection {
    #[must_use]
    pub fn into_records(self) -> Vec<ScriptRecord> {
        self.scripts.into_values().collect()
    }
}

/// Make a URL safe to use as a directory name.
#[must_use]
pub fn sanitize(s: &str) -> String {
    NON_ALNUM.replace_all(s, "-").chars().take(100).collect()
}

/// Directory holding every capture of the page at `url`.
#[must_use]
pub fn page_dir(data_dir: &Path, url: &str) -> PathBuf {
    data_dir.join(sanitize(url))
}

/// `artifacts.json` files of every load of one page, sorted by directory.
pub fn artifact_files(page_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(page_dir)
        .with_context(|| format!("Failed to read {}", page_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let is_capture = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with("artifacts"));
        let path = entry.path().join(ARTIFACTS_FILE);
        if is_capture && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn parse_artifacts(input: &[u8]) -> crate::error::Result<PageArtifacts> {
    Ok(serde_json::from_slice(input)?)
}

/// Fold one page load into the collection.
#[must_use]
pub fn merge_page(
    mut collection: ScriptCollection,
    page_name: &str,
    artifacts: PageArtifacts,
) -> ScriptCollection {
    for element in artifacts.script_elements {
        let Some(src) = element.src else {
            continue;
        };
        let record = collection.scripts.entry(src.clone()).or_insert_with(|| {
            ScriptRecord::new(src, element.content.unwrap_or_default())
        });
        record.seen.insert(page_name.to_string());
    }

    for source_map in artifacts.source_maps {
        let Some(script_url) = source_map.script_url else {
            continue;
        };
        match collection.scripts.get_mut(&script_url) {
            Some(record) => {
                record.source_map_url = source_map.source_map_url;
                record.map = source_map.map;
            }
            None => {
                warn!(script = %script_url, page = page_name, "source map without a captured script");
                collection.orphan_maps.push(script_url);
            }
        }
    }

    let samples = artifacts
        .js_usage
        .into_iter()
        .flat_map(|(key, usage)| usage.into_samples(&key));
    for (script_url, sample) in samples {
        match collection.scripts.get_mut(&script_url) {
            Some(record) => record.coverage.push(sample),
            None => debug!(script = %script_url, "coverage for an uncaptured script"),
        }
    }

    collection
}

/// Load every configured page's captures from `config.data_dir`.
pub fn load_scripts(config: &AnalysisConfig) -> Result<ScriptCollection> {
    let mut collection = ScriptCollection::default();

    for page in &config.pages {
        let dir = page_dir(&config.data_dir, &page.url);
        let files = artifact_files(&dir)
            .with_context(|| format!("No captures for page '{}'", page.name))?;
        if files.is_empty() {
            anyhow::bail!(
                "No {} found for page '{}' under {}",
                ARTIFACTS_FILE,
                page.name,
                dir.display()
            );
        }

        for file in files {
            debug!(page = %page.name, file = %file.display(), "loading artifacts");
            let bytes =
                std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let artifacts = parse_artifacts(&bytes)
                .with_context(|| format!("Invalid artifacts in {}", file.display()))?;
            collection = merge_page(collection, &page.name, artifacts);
        }
    }

    Ok(collection)
}
