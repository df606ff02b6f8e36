use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::aggregate::LabelPolicy;
use crate::anomaly::AnomalyConfig;
use crate::loader::dates::DateParser;
use crate::loader::schema::{Field, Schema};
use crate::loader::LoaderOptions;
use crate::session::AnalysisSettings;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkbookConfig {
    pub main_sheet: Option<String>,
    pub label_sheet: Option<String>,
    pub quota_skip_rows: usize,
    pub join_labels: bool,
}

impl Default for WorkbookConfig {
    fn default() -> Self {
        Self {
            main_sheet: None,
            label_sheet: None,
            quota_skip_rows: 16,
            join_labels: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sample_file: PathBuf,
    pub top_n: usize,
    pub currency_symbol: String,
    pub date_formats: Option<Vec<String>>,
    pub label_policy: LabelPolicy,
    /// Extra header variants per canonical column.
    pub columns: BTreeMap<Field, Vec<String>>,
    pub workbook: WorkbookConfig,
    pub anomaly: AnomalyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_file: PathBuf::from("sample_data.xlsx"),
            top_n: 10,
            currency_symbol: "$".to_string(),
            date_formats: None,
            label_policy: LabelPolicy::default(),
            columns: BTreeMap::new(),
            workbook: WorkbookConfig::default(),
            anomaly: AnomalyConfig::default(),
        }
    }
}

impl Config {
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            schema: Schema::with_extra_aliases(&self.columns),
            dates: match &self.date_formats {
                Some(formats) => DateParser::new(formats.clone()),
                None => DateParser::default(),
            },
            main_sheet: self.workbook.main_sheet.clone(),
            label_sheet: self.workbook.label_sheet.clone(),
            join_labels: self.workbook.join_labels,
            quota_skip_rows: self.workbook.quota_skip_rows,
        }
    }

    pub fn analysis_settings(&self, top_override: Option<usize>) -> AnalysisSettings {
        AnalysisSettings {
            top_n: top_override.unwrap_or(self.top_n),
            label_policy: self.label_policy,
            anomaly: self.anomaly.clone(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "btpcost").map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn parse_config(data: &str) -> Result<Config> {
    Ok(toml::from_str(data)?)
}

/// Load the configuration. An explicit path must exist and parse; the
/// default location is optional and a broken file there only warns.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        return parse_config(&data).with_context(|| format!("Invalid config {}", path.display()));
    }

    let Some(path) = default_config_path() else {
        return Ok(Config::default());
    };
    let Ok(data) = fs::read_to_string(&path) else {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    };

    match parse_config(&data) {
        Ok(config) => Ok(config),
        Err(e) => {
            warn!(path = %path.display(), "invalid config, using defaults: {e:#}");
            Ok(Config::default())
        }
    }
}
