//! Script runner: load an encounter script and drive it through a registry.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::calc::CalculationResult;
use crate::combat::{Encounter, Terrain};
use crate::config::EngineConfig;
use crate::content::builtin_encounters;
use crate::life::ParticipantSpec;
use crate::registry::{EncounterKey, EncounterRegistry};

fn default_session() -> String {
    "script".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EncounterScript {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_session")]
    pub session_id: String,
    pub encounter_id: String,
    pub seed: String,
    pub participants: Vec<ParticipantSpec>,
    #[serde(default)]
    pub terrain: Option<Terrain>,
    /// Raw action payloads; each one goes through the payload guard.
    #[serde(default)]
    pub actions: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ActionReport {
    pub index: usize,
    pub kind: String,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CalculationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ScriptReport {
    pub key: String,
    pub seed: String,
    pub opening: CalculationResult,
    pub actions: Vec<ActionReport>,
    pub accepted: usize,
    pub rejected: usize,
    /// Faces drawn over the whole run, for replay audits.
    pub draws: u64,
    #[serde(rename = "final")]
    pub final_state: Encounter,
}

/// Parse a script from text; JSON if it looks like JSON, YAML otherwise.
pub fn parse_script(text: &str) -> Result<EncounterScript> {
    if text.trim_start().starts_with('{') {
        serde_json::from_str(text).context("failed to parse encounter script JSON")
    } else {
        serde_yaml::from_str(text).context("failed to parse encounter script YAML")
    }
}

pub fn load_script(path: impl AsRef<Path>) -> Result<EncounterScript> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read encounter script: {}", path.display()))?;
    parse_script(&text).with_context(|| format!("in {}", path.display()))
}

pub fn builtin_script(id: &str) -> Result<EncounterScript> {
    let text = builtin_encounters()
        .get(id)
        .copied()
        .ok_or_else(|| anyhow!("unknown builtin encounter '{}'", id))?;
    parse_script(text).with_context(|| format!("builtin encounter '{}'", id))
}

/// Run every action in order. Rejected actions are recorded and the run goes on.
pub fn run_script(script: &EncounterScript, config: EngineConfig) -> Result<ScriptReport> {
    config.validate()?;
    let registry = EncounterRegistry::new(config);
    let key = EncounterKey::new(script.session_id.clone(), script.encounter_id.clone());
    let opening = registry
        .create(
            key.clone(),
            &script.seed,
            script.participants.clone(),
            script.terrain.clone(),
        )
        .with_context(|| format!("failed to start encounter {}", key))?;
    info!(key = %key, actions = script.actions.len(), "running script");

    let mut reports = Vec::with_capacity(script.actions.len());
    for (index, payload) in script.actions.iter().enumerate() {
        let kind = payload
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let report = match registry.execute(&key, payload) {
            Ok(outcome) => ActionReport {
                index,
                kind,
                accepted: true,
                result: Some(outcome.result),
                error: None,
            },
            Err(e) => {
                debug!(index, error = %e, "script action rejected");
                ActionReport {
                    index,
                    kind,
                    accepted: false,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        };
        reports.push(report);
    }

    let (final_state, draws) =
        registry.with_encounter(&key, |engine| Ok((engine.snapshot()?, engine.dice().draws())))?;
    let accepted = reports.iter().filter(|r| r.accepted).count();
    Ok(ScriptReport {
        key: key.to_string(),
        seed: script.seed.clone(),
        opening: opening.result,
        rejected: reports.len() - accepted,
        accepted,
        actions: reports,
        draws,
        final_state,
    })
}
