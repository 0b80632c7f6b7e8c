use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::conditions::{has_kind, Condition, ConditionKind};
use crate::error::{EngineError, Result};
use crate::spatial::Tile;
use crate::{check_modifier, Ability};

const DEFAULT_SPEED_FT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Tiny,
    Small,
    #[default]
    Medium,
    Large,
    Huge,
    Gargantuan,
}

impl SizeCategory {
    /// Squares per side the creature occupies.
    pub fn footprint(self) -> i32 {
        match self {
            SizeCategory::Tiny | SizeCategory::Small | SizeCategory::Medium => 1,
            SizeCategory::Large => 2,
            SizeCategory::Huge => 3,
            SizeCategory::Gargantuan => 4,
        }
    }
}

/// A combatant as it lives inside an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ac: Option<i32>,
    pub initiative_bonus: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiative: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Tile>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub movement_speed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_remaining: Option<u32>,
    pub size: SizeCategory,
    pub is_enemy: bool,
    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crit_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub save_modifiers: BTreeMap<Ability, i32>,
}

/// Caller-supplied participant description. Initiative and remaining
/// movement are engine-owned, so they are not accepted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParticipantSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hp: Option<i32>,
    pub max_hp: i32,
    #[serde(default)]
    pub ac: Option<i32>,
    #[serde(default)]
    pub initiative_bonus: i32,
    #[serde(default)]
    pub position: Option<Tile>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub movement_speed: Option<u32>,
    #[serde(default)]
    pub size: SizeCategory,
    #[serde(default)]
    pub is_enemy: bool,
    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default)]
    pub crit_threshold: Option<u32>,
    #[serde(default)]
    pub save_modifiers: BTreeMap<Ability, i32>,
}

impl ParticipantSpec {
    pub fn new(id: &str, max_hp: i32) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            hp: None,
            max_hp,
            ac: None,
            initiative_bonus: 0,
            position: None,
            conditions: Vec::new(),
            movement_speed: None,
            size: SizeCategory::Medium,
            is_enemy: false,
            attack_bonus: 0,
            crit_threshold: None,
            save_modifiers: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::validation("id", "participant id must not be empty"));
        }
        if self.max_hp <= 0 {
            return Err(EngineError::validation(
                "max_hp",
                format!("{}: max_hp must be > 0, got {}", self.id, self.max_hp),
            ));
        }
        if let Some(hp) = self.hp {
            if !(0..=self.max_hp).contains(&hp) {
                return Err(EngineError::validation(
                    "hp",
                    format!("{}: hp {} outside 0..={}", self.id, hp, self.max_hp),
                ));
            }
        }
        if let Some(t) = self.crit_threshold {
            if !(2..=20).contains(&t) {
                return Err(EngineError::validation(
                    "crit_threshold",
                    format!("{}: must be within 2..=20, got {}", self.id, t),
                ));
            }
        }
        check_modifier("initiative_bonus", self.initiative_bonus)?;
        check_modifier("attack_bonus", self.attack_bonus)?;
        if let Some(ac) = self.ac {
            check_modifier("ac", ac)?;
        }
        for &m in self.save_modifiers.values() {
            check_modifier("save_modifiers", m)?;
        }
        if let Some(pos) = self.position {
            pos.validate("position")?;
        }
        for c in &self.conditions {
            c.validate()?;
        }
        Ok(())
    }

    pub fn into_participant(self) -> Participant {
        let speed = self.movement_speed.unwrap_or(DEFAULT_SPEED_FT);
        Participant {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            hp: self.hp.unwrap_or(self.max_hp),
            max_hp: self.max_hp,
            ac: self.ac,
            initiative_bonus: self.initiative_bonus,
            initiative: None,
            position: self.position,
            conditions: self.conditions,
            movement_speed: speed,
            movement_remaining: None,
            size: self.size,
            is_enemy: self.is_enemy,
            attack_bonus: self.attack_bonus,
            crit_threshold: self.crit_threshold,
            save_modifiers: self.save_modifiers,
        }
    }
}

impl Participant {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn has(&self, kind: ConditionKind) -> bool {
        has_kind(&self.conditions, kind)
    }

    pub fn is_incapacitated(&self) -> bool {
        self.conditions.iter().any(|c| c.kind.incapacitates())
    }

    /// Speed for a fresh turn, zero while a speed-reducing condition applies.
    pub fn turn_speed(&self) -> u32 {
        if self.conditions.iter().any(|c| c.kind.zero_speed()) {
            0
        } else {
            self.movement_speed
        }
    }

    pub fn save_mod(&self, ability: Ability) -> i32 {
        self.save_modifiers.get(&ability).copied().unwrap_or(0)
    }

    /// Squares covered when anchored (top-left) at `anchor`.
    pub fn footprint_at(&self, anchor: Tile) -> Vec<Tile> {
        let n = self.size.footprint();
        let mut tiles = Vec::with_capacity((n * n) as usize);
        for dy in 0..n {
            for dx in 0..n {
                tiles.push(anchor.offset(dx, dy));
            }
        }
        tiles
    }

    pub fn footprint(&self) -> Vec<Tile> {
        self.position
            .map(|p| self.footprint_at(p))
            .unwrap_or_default()
    }
}

/// Apply damage, clamped at 0. Returns true if the participant dropped to 0 this call.
pub fn apply_damage(p: &mut Participant, dmg: i64, mut log: impl FnMut(String)) -> bool {
    if !p.is_alive() {
        return false;
    }
    let before = p.hp;
    let dmg = dmg.clamp(0, i64::from(i32::MAX)) as i32;
    p.hp = (p.hp - dmg).clamp(0, p.max_hp);
    log(format!("[HP][{}] {} → {} (−{})", p.name, before, p.hp, dmg));
    if before > 0 && p.hp == 0 {
        log(format!("[STATE][{}] drops to 0 HP → defeated", p.name));
        return true;
    }
    false
}

/// Healing, clamped at max HP. Returns the HP actually restored.
pub fn heal(p: &mut Participant, amount: i64, mut log: impl FnMut(String)) -> i32 {
    if amount <= 0 {
        return 0;
    }
    let before = p.hp;
    let amount = amount.min(i64::from(i32::MAX)) as i32;
    p.hp = p.hp.saturating_add(amount).min(p.max_hp);
    if before == 0 && p.hp > 0 {
        log(format!(
            "[HEAL][{}] +{} HP ({} → {}) and is back in the fight",
            p.name,
            p.hp - before,
            before,
            p.hp
        ));
    } else {
        log(format!(
            "[HEAL][{}] +{} HP ({} → {})",
            p.name,
            p.hp - before,
            before,
            p.hp
        ));
    }
    p.hp - before
}
