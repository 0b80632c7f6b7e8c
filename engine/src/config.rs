use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dice::MAX_DICE_COUNT;
use crate::error::EngineError;

/// Tunables shared by every encounter a registry hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Natural d20 at or above this is a critical hit unless a participant overrides it.
    pub crit_threshold: u32,
    pub max_path_iterations: usize,
    pub feet_per_square: u32,
    pub max_dice_count: u32,
    pub max_dice_sides: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crit_threshold: 20,
            max_path_iterations: 10_000,
            feet_per_square: 5,
            max_dice_count: 100,
            max_dice_sides: 1000,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(text).context("failed to parse engine config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)
                .with_context(|| format!("failed to parse config JSON: {}", path.display()))?,
            _ => serde_yaml::from_str(&text)
                .with_context(|| format!("failed to parse config YAML: {}", path.display()))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !(2..=20).contains(&self.crit_threshold) {
            return Err(EngineError::validation(
                "crit_threshold",
                format!("must be within 2..=20, got {}", self.crit_threshold),
            ));
        }
        if self.max_path_iterations == 0 {
            return Err(EngineError::validation("max_path_iterations", "must be > 0"));
        }
        if self.feet_per_square == 0 {
            return Err(EngineError::validation("feet_per_square", "must be > 0"));
        }
        if self.max_dice_count == 0 || self.max_dice_sides == 0 {
            return Err(EngineError::validation("max_dice_count", "dice caps must be > 0"));
        }
        // a critical hit doubles the count, which must still fit under the hard cap
        if self.max_dice_count > MAX_DICE_COUNT / 2 {
            return Err(EngineError::validation(
                "max_dice_count",
                format!("must be <= {}, got {}", MAX_DICE_COUNT / 2, self.max_dice_count),
            ));
        }
        Ok(())
    }
}
