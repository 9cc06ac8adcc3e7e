//! Analysis configuration, read from a TOML file.
//!
//! ```toml
//! data_dir = "data/example"
//! base_url = "https://www.example.com"
//! top_n = 5
//!
//! [[pages]]
//! name = "home"
//! url = "https://www.example.com/"
//!
//! [[journeys]]
//! name = "browse"
//! pages = ["home", "search"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::audit::DEFAULT_DUPLICATION_THRESHOLD;
use crate::error::{BundlecovError, Result};
use crate::mapping::MappingPolicy;

/// A page whose artifacts were captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageConfig {
    pub name: String,
    pub url: String,
}

impl PageConfig {
    /// Parse the collector's `name=url` form.
    pub fn parse_pair(pair: &str) -> Result<Self> {
        match pair.split_once('=') {
            Some((name, url)) if !name.is_empty() && !url.is_empty() => Ok(Self {
                name: name.to_string(),
                url: url.to_string(),
            }),
            _ => Err(BundlecovError::Config(format!(
                "Expected a page as 'name=url', got '{pair}'"
            ))),
        }
    }
}

/// A named set of pages visited together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyConfig {
    pub name: String,
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Root of the captured artifacts.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Origin that counts as first-party. Defaults to the first page's.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub pages: Vec<PageConfig>,
    #[serde(default)]
    pub journeys: Vec<JourneyConfig>,
    /// Rows shown before the remainder is folded into a "more" row.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_duplication_threshold")]
    pub duplication_threshold: u64,
    /// Scripts wasting fewer bytes are left out of the unused report.
    #[serde(default)]
    pub unused_threshold: u64,
    #[serde(default)]
    pub strict_mappings: bool,
    /// Group audits run on this many threads.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_top_n() -> usize {
    5
}

fn default_duplication_threshold() -> u64 {
    DEFAULT_DUPLICATION_THRESHOLD
}

fn default_workers() -> usize {
    1
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            base_url: None,
            pages: Vec::new(),
            journeys: Vec::new(),
            top_n: default_top_n(),
            duplication_threshold: default_duplication_threshold(),
            unused_threshold: 0,
            strict_mappings: false,
            workers: default_workers(),
        }
    }
}

impl AnalysisConfig {
    /// Read and parse a TOML config file. Not validated.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BundlecovError::Config(e.to_string()))
    }

    #[must_use]
    pub fn mapping_policy(&self) -> MappingPolicy {
        MappingPolicy::from_strict(self.strict_mappings)
    }

    /// The origin first-party scripts share.
    pub fn base_origin(&self) -> Result<url::Origin> {
        let base = match (&self.base_url, self.pages.first()) {
            (Some(base), _) => base.as_str(),
            (None, Some(page)) => page.url.as_str(),
            (None, None) => {
                return Err(BundlecovError::Config(
                    "No base_url and no pages configured".to_string(),
                ))
            }
        };
        let url = Url::parse(base)
            .map_err(|e| BundlecovError::Config(format!("Invalid base URL '{base}': {e}")))?;
        Ok(url.origin())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pages.is_empty() {
            return Err(BundlecovError::Config("At least one page is required".to_string()));
        }
        if self.workers == 0 {
            return Err(BundlecovError::Config("workers must be at least 1".to_string()));
        }

        let mut names = HashSet::new();
        for page in &self.pages {
            if !names.insert(page.name.as_str()) {
                return Err(BundlecovError::Config(format!(
                    "Duplicate page name '{}'",
                    page.name
                )));
            }
            Url::parse(&page.url).map_err(|e| {
                BundlecovError::Config(format!("Invalid URL for page '{}': {e}", page.name))
            })?;
        }

        for journey in &self.journeys {
            if journey.pages.is_empty() {
                return Err(BundlecovError::Config(format!(
                    "Journey '{}' has no pages",
                    journey.name
                )));
            }
            if let Some(unknown) = journey.pages.iter().find(|p| !names.contains(p.as_str())) {
                return Err(BundlecovError::Config(format!(
                    "Journey '{}' references unknown page '{unknown}'",
                    journey.name
                )));
            }
        }

        self.base_origin().map(|_| ())
    }
}
