use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calc::{CalculationResult, Extensions};
use crate::checks::succeeded;
use crate::error::{EngineError, Result};
use crate::{check_modifier, AdMode, Ability};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
    Exhaustion,
}

impl ConditionKind {
    /// Bearer can take no actions or movement.
    pub fn incapacitates(self) -> bool {
        use ConditionKind::*;
        matches!(
            self,
            Incapacitated | Paralyzed | Petrified | Stunned | Unconscious
        )
    }

    /// Bearer's speed drops to 0.
    pub fn zero_speed(self) -> bool {
        matches!(self, ConditionKind::Grappled | ConditionKind::Restrained) || self.incapacitates()
    }

    pub fn as_str(self) -> &'static str {
        use ConditionKind::*;
        match self {
            Blinded => "blinded",
            Charmed => "charmed",
            Deafened => "deafened",
            Frightened => "frightened",
            Grappled => "grappled",
            Incapacitated => "incapacitated",
            Invisible => "invisible",
            Paralyzed => "paralyzed",
            Petrified => "petrified",
            Poisoned => "poisoned",
            Prone => "prone",
            Restrained => "restrained",
            Stunned => "stunned",
            Unconscious => "unconscious",
            Exhaustion => "exhaustion",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationType {
    /// Counts down at the end of each of the bearer's turns.
    Rounds,
    /// Ends when the bearer's next turn starts.
    StartOfTurn,
    /// Ends when the bearer's turn ends.
    EndOfTurn,
    /// Bearer saves at the end of each of its turns.
    SaveEnds,
    #[default]
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub duration_type: DurationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_dc: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_ability: Option<Ability>,
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl Condition {
    pub fn new(kind: ConditionKind, duration_type: DurationType) -> Self {
        Self {
            id: String::new(),
            kind,
            duration_type,
            duration: None,
            source_id: None,
            save_dc: None,
            save_ability: None,
            extensions: Extensions::default(),
        }
    }

    pub fn for_rounds(kind: ConditionKind, rounds: u32) -> Self {
        Self {
            duration: Some(rounds),
            ..Self::new(kind, DurationType::Rounds)
        }
    }

    pub fn save_ends(kind: ConditionKind, ability: Ability, dc: i32) -> Self {
        Self {
            save_dc: Some(dc),
            save_ability: Some(ability),
            ..Self::new(kind, DurationType::SaveEnds)
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.duration_type {
            DurationType::Rounds if self.duration.unwrap_or(0) == 0 => Err(
                EngineError::validation("duration", "rounds duration must be at least 1"),
            ),
            DurationType::SaveEnds if self.save_dc.is_none() => Err(EngineError::validation(
                "save_dc",
                "save_ends condition needs a save DC",
            )),
            DurationType::SaveEnds if self.save_ability.is_none() => Err(
                EngineError::validation("save_ability", "save_ends condition needs an ability"),
            ),
            _ => self.save_dc.map_or(Ok(()), |dc| check_modifier("save_dc", dc)),
        }
    }
}

pub fn has_kind(conds: &[Condition], kind: ConditionKind) -> bool {
    conds.iter().any(|c| c.kind == kind)
}

/// Whether the attack is melee or ranged (used for prone interactions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackStyle {
    #[default]
    Melee,
    Ranged,
}

/// Net advantage for an attack from conditions on attacker and target.
///
/// Any source of advantage plus any source of disadvantage cancel to normal.
pub fn vantage_from_conditions(
    attacker_conds: &[Condition],
    target_conds: &[Condition],
    style: AttackStyle,
    adjacent: bool,
) -> AdMode {
    use ConditionKind::*;

    let mut advantage = false;
    let mut disadvantage = false;

    for c in attacker_conds {
        match c.kind {
            Blinded | Poisoned | Prone | Restrained | Frightened => disadvantage = true,
            Invisible => advantage = true,
            _ => {}
        }
    }

    for c in target_conds {
        match c.kind {
            Blinded | Restrained | Stunned | Paralyzed | Unconscious | Petrified => {
                advantage = true
            }
            Prone => {
                if style == AttackStyle::Melee && adjacent {
                    advantage = true
                } else {
                    disadvantage = true
                }
            }
            Invisible => disadvantage = true,
            _ => {}
        }
    }

    AdMode::from_flags(advantage, disadvantage)
}

/// Lifecycle hooks to expire or allow saves at turn boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnBoundary {
    StartOfTurn,
    EndOfTurn,
}

/// Expire, count down or save against the bearer's conditions at a turn boundary.
///
/// `save(ability, dc)` rolls the bearer's saving throw; its trace goes to `log`.
/// On error the conditions are left as they were.
pub fn process_turn_boundary(
    boundary: TurnBoundary,
    bearer_name: &str,
    conds: &mut Vec<Condition>,
    mut save: impl FnMut(Ability, i32) -> Result<CalculationResult>,
    mut log: impl FnMut(String),
) -> Result<()> {
    let mut kept = Vec::with_capacity(conds.len());
    for c in conds.iter() {
        let mut c = c.clone();
        let ends = match (boundary, c.duration_type) {
            (TurnBoundary::StartOfTurn, DurationType::StartOfTurn) => {
                log(format!("[COND][{}] {} ends at start of turn", bearer_name, c.kind));
                true
            }
            (TurnBoundary::EndOfTurn, DurationType::EndOfTurn) => {
                log(format!("[COND][{}] {} ends at end of turn", bearer_name, c.kind));
                true
            }
            (TurnBoundary::EndOfTurn, DurationType::Rounds) => {
                let left = c.duration.unwrap_or(0).saturating_sub(1);
                c.duration = Some(left);
                if left == 0 {
                    log(format!("[COND][{}] {} expires", bearer_name, c.kind));
                    true
                } else {
                    log(format!(
                        "[COND][{}] {} has {} round(s) left",
                        bearer_name, c.kind, left
                    ));
                    false
                }
            }
            (TurnBoundary::EndOfTurn, DurationType::SaveEnds) => {
                match (c.save_ability, c.save_dc) {
                    (Some(ability), Some(dc)) => {
                        log(format!(
                            "[COND][{}] {:?} save DC {} against {}",
                            bearer_name, ability, dc, c.kind
                        ));
                        let result = save(ability, dc)?;
                        result.steps.iter().for_each(|step| log(step.clone()));
                        let success = succeeded(&result);
                        if success {
                            log(format!("[COND][{}] is no longer {}", bearer_name, c.kind));
                        }
                        success
                    }
                    _ => false,
                }
            }
            _ => false,
        };
        if !ends {
            kept.push(c);
        }
    }
    *conds = kept;
    Ok(())
}

/// Attach a condition. A condition of the same kind is replaced rather than stacked.
pub fn apply_condition(
    bearer_name: &str,
    conds: &mut Vec<Condition>,
    condition: Condition,
    mut log: impl FnMut(String),
) {
    if let Some(existing) = conds.iter_mut().find(|c| c.kind == condition.kind) {
        log(format!(
            "[COND][{}] {} refreshed ({})",
            bearer_name, condition.kind, condition.id
        ));
        *existing = condition;
        return;
    }
    log(format!(
        "[COND][{}] gains {} ({})",
        bearer_name, condition.kind, condition.id
    ));
    conds.push(condition);
}
