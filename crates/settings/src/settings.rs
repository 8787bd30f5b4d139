use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Level count assumed when a column leaves `num_levels` unset.
pub const DEFAULT_NUM_LEVELS: u8 = 2;

/// Prefix for comparison-outcome (gamma) columns on a pair dataset.
pub const GAMMA_PREFIX: &str = "gamma_";

// ---------------------------------------------------------------------------
// Link type
// ---------------------------------------------------------------------------

/// Whether the task deduplicates one dataset, links two, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum LinkType {
    DedupeOnly,
    LinkOnly,
    LinkAndDedupe,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DedupeOnly => "dedupe_only",
            Self::LinkOnly => "link_only",
            Self::LinkAndDedupe => "link_and_dedupe",
        }
    }

    /// True when the task takes a left/right pair of datasets.
    pub fn is_link(&self) -> bool {
        !matches!(self, Self::DedupeOnly)
    }
}

impl FromStr for LinkType {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dedupe_only" => Ok(Self::DedupeOnly),
            "link_only" => Ok(Self::LinkOnly),
            "link_and_dedupe" => Ok(Self::LinkAndDedupe),
            other => Err(SettingsError::InvalidLinkType(other.to_string())),
        }
    }
}

impl TryFrom<String> for LinkType {
    type Error = SettingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Comparison column
// ---------------------------------------------------------------------------

/// Comparison logic for one field. Probability tables are indexed by
/// comparison level (0 = least similar).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComparisonColumn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_columns_used: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_levels: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m_probabilities: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u_probabilities: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_frequency_adjustments: Option<bool>,
}

impl ComparisonColumn {
    /// Column comparing a single input field by name.
    pub fn new(col_name: impl Into<String>) -> Self {
        Self {
            col_name: Some(col_name.into()),
            ..Self::default()
        }
    }

    /// Comparison name: `col_name`, else `custom_name`.
    pub fn name(&self) -> Option<&str> {
        self.col_name.as_deref().or(self.custom_name.as_deref())
    }

    pub fn gamma_column_name(&self) -> Option<String> {
        self.name().map(|n| format!("{GAMMA_PREFIX}{n}"))
    }

    pub fn levels(&self) -> u8 {
        self.num_levels.unwrap_or(DEFAULT_NUM_LEVELS)
    }

    fn validate(&self, index: usize) -> Result<(), SettingsError> {
        let name = self.name().ok_or_else(|| {
            SettingsError::Validation(format!(
                "comparison column {index}: one of col_name or custom_name is required"
            ))
        })?;

        if self.col_name.is_none() && self.case_expression.is_none() {
            return Err(SettingsError::Validation(format!(
                "column '{name}': custom_name requires a case_expression"
            )));
        }

        let levels = self.levels();
        if levels < 2 {
            return Err(SettingsError::Validation(format!(
                "column '{name}': num_levels must be at least 2, got {levels}"
            )));
        }

        for (label, table) in [("m_probabilities", &self.m_probabilities), ("u_probabilities", &self.u_probabilities)] {
            let Some(table) = table else { continue };
            if table.len() != levels as usize {
                return Err(SettingsError::Validation(format!(
                    "column '{name}': {label} has {} entries, expected {levels}",
                    table.len()
                )));
            }
            if let Some(bad) = table.iter().find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0) {
                return Err(SettingsError::Validation(format!(
                    "column '{name}': {label} value {bad} is outside [0, 1]"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub link_type: LinkType,
    pub comparison_columns: Vec<ComparisonColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proportion_of_matches: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id_column_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dataset_column_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocking_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub em_convergence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retain_matching_columns: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_columns_to_retain: Option<Vec<String>>,
}

/// One row of the flattened parameter table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRecord {
    pub comparison_name: String,
    pub level: u8,
    pub m_probability: Option<f64>,
    pub u_probability: Option<f64>,
}

/// Read just `link_type` so a bad value gets a specific error instead of a
/// generic deserialization message.
#[derive(Deserialize)]
struct LinkTypeHint {
    #[serde(default)]
    link_type: Option<String>,
}

fn link_type_hint_error(hint: Option<LinkTypeHint>, fallback: String) -> SettingsError {
    match hint.and_then(|h| h.link_type) {
        Some(value) => match value.parse::<LinkType>() {
            Ok(_) => SettingsError::Parse(fallback),
            Err(e) => e,
        },
        None => SettingsError::Parse(fallback),
    }
}

impl Settings {
    pub fn new(link_type: LinkType, comparison_columns: Vec<ComparisonColumn>) -> Self {
        Self {
            link_type,
            comparison_columns,
            proportion_of_matches: None,
            unique_id_column_name: None,
            source_dataset_column_name: None,
            blocking_rules: Vec::new(),
            max_iterations: None,
            em_convergence: None,
            retain_matching_columns: None,
            additional_columns_to_retain: None,
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(input).map_err(|e| {
            link_type_hint_error(toml::from_str::<LinkTypeHint>(input).ok(), e.to_string())
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json(input: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(input).map_err(|e| {
            link_type_hint_error(serde_json::from_str::<LinkTypeHint>(input).ok(), e.to_string())
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::Io(format!("cannot read {}: {e}", path.display())))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&contents),
            Some("json") => Self::from_json(&contents),
            _ => Err(SettingsError::Io(format!(
                "{}: expected a .toml or .json settings file",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.comparison_columns.is_empty() {
            return Err(SettingsError::Validation(
                "at least one comparison column is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for (i, col) in self.comparison_columns.iter().enumerate() {
            col.validate(i)?;
            // validate() guarantees a name
            let name = col.name().unwrap_or_default();
            if !seen.insert(name) {
                return Err(SettingsError::Validation(format!(
                    "duplicate comparison column '{name}'"
                )));
            }
        }

        if let Some(p) = self.proportion_of_matches {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(SettingsError::Validation(format!(
                    "proportion_of_matches must be within [0, 1], got {p}"
                )));
            }
        }

        Ok(())
    }

    /// Flattened (comparison, level) parameter table, in column order.
    pub fn parameter_records(&self) -> Vec<ParameterRecord> {
        let mut records = Vec::new();
        for col in &self.comparison_columns {
            let name = col.name().unwrap_or_default().to_string();
            for level in 0..col.levels() {
                let at = |table: &Option<Vec<f64>>| {
                    table.as_ref().and_then(|t| t.get(level as usize).copied())
                };
                records.push(ParameterRecord {
                    comparison_name: name.clone(),
                    level,
                    m_probability: at(&col.m_probabilities),
                    u_probability: at(&col.u_probabilities),
                });
            }
        }
        records
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
