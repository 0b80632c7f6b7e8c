//! Action payloads and the guard that screens them before they reach the state machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conditions::{AttackStyle, Condition};
use crate::error::{EngineError, Result};
use crate::spatial::Tile;
use crate::Ability;

/// Keys that would let a caller hand the engine a finished number.
/// Outcomes are only ever produced by the engine's own rolls.
pub const OUTCOME_FIELDS: &[&str] = &[
    "damage",
    "damage_total",
    "total",
    "result",
    "roll",
    "rolls",
    "natural",
    "hit",
    "outcome",
    "crit",
    "is_crit",
    "critical",
    "success",
    "margin",
    "hp",
    "new_hp",
    "initiative",
    "movement_remaining",
];

/// Unknown keys are refused rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum CombatAction {
    Attack {
        actor_id: String,
        target_id: String,
        #[serde(default)]
        attack_bonus: Option<i32>,
        #[serde(default)]
        advantage: bool,
        #[serde(default)]
        disadvantage: bool,
        #[serde(default)]
        style: AttackStyle,
    },
    Damage {
        actor_id: String,
        target_id: String,
        dice: String,
    },
    SavingThrow {
        target_id: String,
        dc: i32,
        #[serde(default)]
        ability: Option<Ability>,
        #[serde(default)]
        modifier: Option<i32>,
        #[serde(default)]
        advantage: bool,
        #[serde(default)]
        disadvantage: bool,
    },
    Move {
        actor_id: String,
        to: Tile,
        /// Optional explicit waypoints; each step must be to an adjacent tile.
        #[serde(default)]
        path: Option<Vec<Tile>>,
    },
    EndTurn {
        actor_id: String,
    },
    FallDamage {
        target_id: String,
        feet: u32,
    },
    Heal {
        actor_id: String,
        target_id: String,
        dice: String,
    },
    ApplyCondition {
        target_id: String,
        condition: Condition,
    },
    RemoveCondition {
        target_id: String,
        condition_id: String,
    },
    Pause,
    Resume,
    EndEncounter {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl CombatAction {
    pub fn kind(&self) -> &'static str {
        match self {
            CombatAction::Attack { .. } => "attack",
            CombatAction::Damage { .. } => "damage",
            CombatAction::SavingThrow { .. } => "saving_throw",
            CombatAction::Move { .. } => "move",
            CombatAction::EndTurn { .. } => "end_turn",
            CombatAction::FallDamage { .. } => "fall_damage",
            CombatAction::Heal { .. } => "heal",
            CombatAction::ApplyCondition { .. } => "apply_condition",
            CombatAction::RemoveCondition { .. } => "remove_condition",
            CombatAction::Pause => "pause",
            CombatAction::Resume => "resume",
            CombatAction::EndEncounter { .. } => "end_encounter",
        }
    }

    /// Screen an untrusted payload, then decode it.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        guard_payload(payload)?;
        let action: Self = serde_json::from_value(payload.clone())
            .map_err(|e| EngineError::validation("payload", e.to_string()))?;
        // unit variants skip the unknown-field check during decoding
        if matches!(action, CombatAction::Pause | CombatAction::Resume) {
            if let Some(extra) = payload
                .as_object()
                .and_then(|m| m.keys().find(|k| k.as_str() != "kind"))
            {
                return Err(EngineError::validation(
                    extra.clone(),
                    format!("unknown field '{}' for {}", extra, action.kind()),
                ));
            }
        }
        Ok(action)
    }
}

/// Reject payloads that carry an outcome field anywhere in their structure.
pub fn guard_payload(payload: &Value) -> Result<()> {
    if !payload.is_object() {
        return Err(EngineError::validation("payload", "action payload must be an object"));
    }
    find_outcome_field(payload, "").map_or(Ok(()), |field| {
        Err(EngineError::rule(
            field.clone(),
            format!("'{}' is computed by the engine and cannot be supplied", field),
        ))
    })
}

/// Matches `isCrit`, `is_crit` and `IS-CRIT` alike.
fn is_outcome_key(key: &str) -> bool {
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect::<String>()
    };
    let key = normalize(key);
    OUTCOME_FIELDS.iter().any(|f| normalize(f) == key)
}

fn find_outcome_field(value: &Value, prefix: &str) -> Option<String> {
    match value {
        Value::Object(map) => map.iter().find_map(|(key, inner)| {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            if is_outcome_key(key) {
                Some(path)
            } else {
                find_outcome_field(inner, &path)
            }
        }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, inner)| find_outcome_field(inner, &format!("{}[{}]", prefix, i))),
        _ => None,
    }
}
