use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::request::Priority;

/// Tunable rule set frozen into each request at creation. Defaults match
/// the operational policy; deployments override via a TOML file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkflowRules {
    /// Claims above this declared value add a police evidence review step.
    pub police_review_value_threshold: Decimal,
    /// Claims strictly above this declared value are created Urgent.
    pub urgent_value_threshold: Decimal,
    /// Minimum length for the narrative fields of a claim.
    pub min_narrative_length: usize,
    pub sla: SlaHours,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SlaHours {
    pub urgent: i64,
    pub high: i64,
    pub normal: i64,
    pub low: i64,
    /// Requests within this many hours of their target count as
    /// approaching breach.
    pub approaching_window: i64,
}

impl Default for WorkflowRules {
    fn default() -> Self {
        Self {
            police_review_value_threshold: Decimal::new(500, 0),
            urgent_value_threshold: Decimal::new(1_000, 0),
            min_narrative_length: 10,
            sla: SlaHours::default(),
        }
    }
}

impl Default for SlaHours {
    fn default() -> Self {
        Self { urgent: 4, high: 8, normal: 24, low: 72, approaching_window: 2 }
    }
}

impl SlaHours {
    pub fn for_priority(&self, priority: Priority) -> i64 {
        match priority {
            Priority::Urgent => self.urgent,
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read rules file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse rules file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("workflow rules validation failed: {0}")]
    Validation(String),
}

impl WorkflowRules {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        let rules: Self = toml::from_str(&raw)
            .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.police_review_value_threshold <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "police review value threshold must be positive".to_owned(),
            ));
        }
        if self.urgent_value_threshold < self.police_review_value_threshold {
            return Err(ConfigError::Validation(
                "urgent value threshold must not be below the police review threshold".to_owned(),
            ));
        }
        if self.min_narrative_length == 0 {
            return Err(ConfigError::Validation(
                "minimum narrative length must be at least 1".to_owned(),
            ));
        }
        let hours = [self.sla.urgent, self.sla.high, self.sla.normal, self.sla.low];
        if hours.iter().any(|hours| *hours <= 0) {
            return Err(ConfigError::Validation("SLA hours must all be positive".to_owned()));
        }
        if self.sla.approaching_window < 0 {
            return Err(ConfigError::Validation(
                "approaching-breach window must not be negative".to_owned(),
            ));
        }
        Ok(())
    }
}
