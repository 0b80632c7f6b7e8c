use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::actions::CombatAction;
use super::encounter::{order_by_initiative, Encounter, EncounterStatus, Terrain};
use super::resolve::{self, AttackInput};
use crate::calc::{CalculationResult, ExtValue, Outcome};
use crate::checks::{saving_throw, SaveInput};
use crate::conditions::{
    apply_condition, process_turn_boundary, vantage_from_conditions, AttackStyle,
    Condition, ConditionKind, TurnBoundary,
};
use crate::config::EngineConfig;
use crate::dice::parse;
use crate::error::{EngineError, Result};
use crate::life::{apply_damage, heal, Participant, ParticipantSpec};
use crate::spatial::{find_path, has_line_of_sight, step_cost, PathOptions, PathOutcome, Tile};
use crate::{AdMode, Ability, Dice};

/// Armor class assumed for a participant that declares none.
const UNARMORED_AC: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatPhase {
    NotStarted,
    Active,
    Paused,
    Completed,
}

/// The last attack roll, waiting for its damage.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingAttack {
    attacker: String,
    target: String,
    outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub result: CalculationResult,
    pub snapshot: Encounter,
}

/// One encounter's state machine. Owns the encounter and its dice stream.
#[derive(Debug)]
pub struct CombatEngine {
    id: String,
    config: EngineConfig,
    dice: Dice,
    encounter: Option<Encounter>,
    pending_attack: Option<PendingAttack>,
    condition_seq: u64,
}

impl CombatEngine {
    pub fn new(id: impl Into<String>, seed: &str, config: EngineConfig) -> Self {
        Self::with_dice(id, Dice::from_seed_str(seed), config)
    }

    pub fn with_dice(id: impl Into<String>, dice: Dice, config: EngineConfig) -> Self {
        Self {
            id: id.into(),
            config,
            dice,
            encounter: None,
            pending_attack: None,
            condition_seq: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dice(&self) -> &Dice {
        &self.dice
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> CombatPhase {
        match self.encounter.as_ref().map(|e| e.status) {
            None => CombatPhase::NotStarted,
            Some(EncounterStatus::Active) => CombatPhase::Active,
            Some(EncounterStatus::Paused) => CombatPhase::Paused,
            Some(EncounterStatus::Completed) => CombatPhase::Completed,
        }
    }

    pub fn encounter(&self) -> Option<&Encounter> {
        self.encounter.as_ref()
    }

    pub fn snapshot(&self) -> Result<Encounter> {
        self.encounter
            .clone()
            .ok_or_else(|| EngineError::not_found("encounter", self.id.clone()))
    }

    /// Roll initiative for everyone (in input order) and open round 1.
    pub fn start_encounter(
        &mut self,
        participants: Vec<ParticipantSpec>,
        terrain: Option<Terrain>,
    ) -> Result<ActionOutcome> {
        if self.encounter.is_some() {
            return Err(EngineError::rule("encounter", "encounter already started"));
        }
        if participants.is_empty() {
            return Err(EngineError::validation("participants", "at least one participant required"));
        }
        let terrain = terrain.unwrap_or_default();
        let mut seen = HashSet::new();
        for spec in &participants {
            spec.validate()?;
            if !seen.insert(spec.id.clone()) {
                return Err(EngineError::validation(
                    "participants",
                    format!("duplicate participant id '{}'", spec.id),
                ));
            }
            if let Some(pos) = spec.position {
                if terrain.obstacles.contains(&pos) {
                    return Err(EngineError::validation(
                        "position",
                        format!("{} starts on an obstacle at {}", spec.id, pos),
                    ));
                }
            }
        }
        if participants
            .iter()
            .all(|p| p.hp.unwrap_or(p.max_hp) == 0)
        {
            return Err(EngineError::rule("participants", "nobody is able to fight"));
        }

        let mut calc = CalculationResult::new("initiative");
        let mut roster: Vec<Participant> = Vec::with_capacity(participants.len());
        for spec in participants {
            let mut p = spec.into_participant();
            self.assign_condition_ids(&mut p.conditions);
            let natural = self.dice.d20(AdMode::Normal) as i32;
            let total = natural.saturating_add(p.initiative_bonus);
            calc.step(format!(
                "[INIT][{}] d20={} {} = {}",
                p.name,
                natural,
                crate::format_modifier(p.initiative_bonus),
                total
            ));
            calc.metadata.rolls.push(natural as u32);
            p.initiative = Some(total);
            roster.push(p);
        }
        order_by_initiative(&mut roster);
        calc.step(format!(
            "[ORDER] {}",
            roster
                .iter()
                .map(|p| format!("{} ({})", p.name, p.initiative.unwrap_or_default()))
                .collect::<Vec<_>>()
                .join(" → ")
        ));

        let first = roster
            .iter()
            .find(|p| p.is_alive())
            .map(|p| p.id.clone())
            .unwrap_or_default();
        self.encounter = Some(Encounter {
            id: self.id.clone(),
            participants: roster,
            round: 1,
            active_participant_id: first.clone(),
            status: EncounterStatus::Active,
            terrain,
            props: Vec::new(),
        });
        calc.step(format!("[ROUND] 1 → {}", first));
        // start-of-turn upkeep only runs once a turn has been passed
        self.reset_movement()?;
        info!(encounter = %self.id, first = %first, "encounter started");
        self.outcome(calc.with_result(first))
    }

    /// Screen an untrusted payload, decode it and run it.
    pub fn execute_payload(&mut self, payload: &Value) -> Result<ActionOutcome> {
        let action = CombatAction::from_payload(payload).inspect_err(|e| {
            warn!(encounter = %self.id, error = %e, "action payload rejected");
        })?;
        self.execute_action(action)
    }

    pub fn execute_action(&mut self, action: CombatAction) -> Result<ActionOutcome> {
        let kind = action.kind();
        let result = match action {
            CombatAction::Attack {
                actor_id,
                target_id,
                attack_bonus,
                advantage,
                disadvantage,
                style,
            } => self.attack(&actor_id, &target_id, attack_bonus, advantage, disadvantage, style),
            CombatAction::Damage {
                actor_id,
                target_id,
                dice,
            } => self.damage(&actor_id, &target_id, &dice),
            CombatAction::SavingThrow {
                target_id,
                dc,
                ability,
                modifier,
                advantage,
                disadvantage,
            } => self.saving_throw(&target_id, dc, ability, modifier, advantage, disadvantage),
            CombatAction::Move { actor_id, to, path } => self.move_to(&actor_id, to, path),
            CombatAction::EndTurn { actor_id } => self.end_turn(&actor_id),
            CombatAction::FallDamage { target_id, feet } => self.fall(&target_id, feet),
            CombatAction::Heal {
                actor_id,
                target_id,
                dice,
            } => self.heal(&actor_id, &target_id, &dice),
            CombatAction::ApplyCondition {
                target_id,
                condition,
            } => self.add_condition(&target_id, condition),
            CombatAction::RemoveCondition {
                target_id,
                condition_id,
            } => self.remove_condition(&target_id, &condition_id),
            CombatAction::Pause => self.set_status(EncounterStatus::Active, EncounterStatus::Paused),
            CombatAction::Resume => {
                self.set_status(EncounterStatus::Paused, EncounterStatus::Active)
            }
            CombatAction::EndEncounter { reason } => self.end_encounter(reason),
        };
        match result {
            Ok(calc) => {
                debug!(encounter = %self.id, kind, "action resolved");
                self.outcome(calc)
            }
            Err(e) => {
                warn!(encounter = %self.id, kind, error = %e, "action rejected");
                Err(e)
            }
        }
    }

    fn outcome(&self, result: CalculationResult) -> Result<ActionOutcome> {
        Ok(ActionOutcome {
            result,
            snapshot: self.snapshot()?,
        })
    }

    fn running(&self) -> Result<&Encounter> {
        let enc = self
            .encounter
            .as_ref()
            .ok_or_else(|| EngineError::not_found("encounter", self.id.clone()))?;
        match enc.status {
            EncounterStatus::Active => Ok(enc),
            EncounterStatus::Paused => Err(EngineError::rule("status", "encounter is paused")),
            EncounterStatus::Completed => {
                Err(EngineError::rule("status", "encounter is completed"))
            }
        }
    }

    fn encounter_mut(&mut self) -> Result<&mut Encounter> {
        let id = self.id.clone();
        self.encounter
            .as_mut()
            .ok_or_else(|| EngineError::not_found("encounter", id))
    }

    /// The actor must be the living, active participant.
    fn require_turn(&self, actor_id: &str) -> Result<&Participant> {
        let enc = self.running()?;
        let actor = enc.participant(actor_id)?;
        if enc.active_participant_id != actor_id {
            return Err(EngineError::rule(
                "actor_id",
                format!(
                    "it is {}'s turn, not {}'s",
                    enc.active_participant_id, actor_id
                ),
            ));
        }
        if !actor.is_alive() {
            return Err(EngineError::rule("actor_id", format!("{} is defeated", actor_id)));
        }
        Ok(actor)
    }

    fn living_target(&self, target_id: &str) -> Result<&Participant> {
        let target = self.running()?.participant(target_id)?;
        if !target.is_alive() {
            return Err(EngineError::rule(
                "target_id",
                format!("{} is already defeated", target_id),
            ));
        }
        Ok(target)
    }

    fn attack(
        &mut self,
        actor_id: &str,
        target_id: &str,
        attack_bonus: Option<i32>,
        advantage: bool,
        disadvantage: bool,
        style: AttackStyle,
    ) -> Result<CalculationResult> {
        let actor = self.require_turn(actor_id)?;
        if actor.is_incapacitated() {
            return Err(EngineError::rule(
                "actor_id",
                format!("{} is incapacitated", actor_id),
            ));
        }
        let target = self.living_target(target_id)?;

        let adjacent = match (actor.position, target.position) {
            (Some(a), Some(t)) => {
                let blocked = self.running()?.blocked_tiles();
                if !has_line_of_sight(a, t, &blocked)? {
                    return Err(EngineError::rule(
                        "target_id",
                        format!("no line of sight from {} to {}", actor_id, target_id),
                    ));
                }
                footprints_adjacent(actor, target)
            }
            // nothing to measure without positions, treat as engaged
            _ => true,
        };

        let cond_mode =
            vantage_from_conditions(&actor.conditions, &target.conditions, style, adjacent);
        let wants_adv = advantage || cond_mode == AdMode::Advantage;
        let wants_dis = disadvantage || cond_mode == AdMode::Disadvantage;
        let attacker = actor.name.clone();
        let bonus = attack_bonus.unwrap_or(actor.attack_bonus);
        let target_ac = target.ac.unwrap_or(UNARMORED_AC);
        let crit_threshold = actor.crit_threshold.unwrap_or(self.config.crit_threshold);

        let mut calc = CalculationResult::new(format!("attack {} → {}", actor_id, target_id));
        if cond_mode != AdMode::Normal {
            calc.step(format!("Conditions impose {:?}", cond_mode));
        }
        if wants_adv && wants_dis {
            calc.step("Advantage and disadvantage cancel");
        }

        let atk = resolve::attack(
            &mut self.dice,
            AttackInput {
                attacker: &attacker,
                attack_bonus: bonus,
                target_ac,
                mode: AdMode::from_flags(wants_adv, wants_dis),
                crit_threshold,
            },
        )?;
        calc.absorb(&atk.calc);
        calc.metadata = atk.calc.metadata.clone();

        self.pending_attack = Some(PendingAttack {
            attacker: actor_id.to_string(),
            target: target_id.to_string(),
            outcome: atk.outcome,
        });
        Ok(calc.with_result(atk.total))
    }

    fn damage(&mut self, actor_id: &str, target_id: &str, dice: &str) -> Result<CalculationResult> {
        self.require_turn(actor_id)?;
        self.living_target(target_id)?;
        let expr = parse(dice)?;
        expr.check_limits(&self.config)?;

        let linked = self
            .pending_attack
            .as_ref()
            .filter(|p| p.attacker == actor_id && p.target == target_id)
            .map(|p| p.outcome);
        if linked == Some(Outcome::Miss) {
            return Err(EngineError::rule(
                "target_id",
                format!("{}'s last attack on {} missed", actor_id, target_id),
            ));
        }
        let is_crit = linked == Some(Outcome::Crit);
        self.pending_attack = None;

        let roll = resolve::damage_roll(&mut self.dice, &expr, is_crit)?;
        let amount = roll.total().unwrap_or(0);
        let mut calc = CalculationResult::new(format!("damage {} → {}", dice, target_id));
        calc.absorb(&roll);
        calc.metadata = roll.metadata.clone();
        self.hurt(target_id, amount, &mut calc)?;
        Ok(calc.with_result(amount))
    }

    fn fall(&mut self, target_id: &str, feet: u32) -> Result<CalculationResult> {
        self.living_target(target_id)?;
        let roll = resolve::fall_damage(&mut self.dice, feet)?;
        let amount = roll.total().unwrap_or(0);
        let mut calc = CalculationResult::new(format!("fall {} ft → {}", feet, target_id));
        calc.absorb(&roll);
        calc.metadata = roll.metadata.clone();
        if amount > 0 {
            self.hurt(target_id, amount, &mut calc)?;
        }
        Ok(calc.with_result(amount))
    }

    /// Apply damage, then settle defeat, completion and a fallen active participant.
    fn hurt(&mut self, target_id: &str, amount: i64, calc: &mut CalculationResult) -> Result<()> {
        let enc = self.encounter_mut()?;
        let target = enc.participant_mut(target_id)?;
        let dropped = apply_damage(target, amount, |msg| calc.step(msg));
        if !dropped {
            return Ok(());
        }
        info!(encounter = %enc.id, target = %target_id, "participant defeated");
        if let Some(enemies) = enc.defeated_side() {
            enc.status = EncounterStatus::Completed;
            calc.step(format!(
                "[END] all {} defeated",
                if enemies { "enemies" } else { "allies" }
            ));
            info!(encounter = %enc.id, "encounter completed");
            return Ok(());
        }
        if enc.active_participant_id == target_id {
            calc.step(format!("[TURN] {} falls on their own turn", target_id));
            self.pending_attack = None;
            self.advance(calc)?;
        }
        Ok(())
    }

    fn heal(&mut self, actor_id: &str, target_id: &str, dice: &str) -> Result<CalculationResult> {
        self.require_turn(actor_id)?;
        self.running()?.participant(target_id)?;
        let expr = parse(dice)?;
        expr.check_limits(&self.config)?;

        let roll = self.dice.roll(&expr)?;
        let amount = roll.total().unwrap_or(0).max(0);
        let mut calc = CalculationResult::new(format!("heal {} → {}", dice, target_id));
        calc.absorb(&roll);
        calc.metadata = roll.metadata.clone();
        let target = self.encounter_mut()?.participant_mut(target_id)?;
        let healed = heal(target, amount, |msg| calc.step(msg));
        Ok(calc.with_result(i64::from(healed)))
    }

    fn saving_throw(
        &mut self,
        target_id: &str,
        dc: i32,
        ability: Option<Ability>,
        modifier: Option<i32>,
        advantage: bool,
        disadvantage: bool,
    ) -> Result<CalculationResult> {
        let target = self.living_target(target_id)?;
        let modifier = modifier.unwrap_or_else(|| ability.map(|a| target.save_mod(a)).unwrap_or(0));
        let restrained_dex =
            ability == Some(Ability::Dex) && target.has(ConditionKind::Restrained);
        let mode = AdMode::from_flags(advantage, disadvantage || restrained_dex);
        let label = target.name.clone();

        let mut calc = saving_throw(
            &mut self.dice,
            SaveInput {
                label: &label,
                dc,
                modifier,
                mode,
            },
        )?;
        if restrained_dex {
            calc.step("Restrained: disadvantage on Dexterity saves");
        }
        Ok(calc)
    }

    fn move_to(&mut self, actor_id: &str, to: Tile, path: Option<Vec<Tile>>) -> Result<CalculationResult> {
        to.validate("to")?;
        let actor = self.require_turn(actor_id)?;
        let enc = self.running()?;
        let from = actor.position.ok_or_else(|| {
            EngineError::rule("position", format!("{} has no position on the grid", actor_id))
        })?;
        if actor.is_incapacitated() || actor.conditions.iter().any(|c| c.kind.zero_speed()) {
            return Err(EngineError::rule(
                "actor_id",
                format!("{} cannot move (speed 0)", actor_id),
            ));
        }

        let n = actor.size.footprint();
        let blocked = inflate(&enc.blocked_tiles(), n);
        let difficult = inflate(&enc.terrain.difficult_terrain, n);
        if blocked.contains(&to) {
            return Err(EngineError::rule("to", format!("{} is blocked by an obstacle", to)));
        }
        let landing = actor.footprint_at(to);
        if let Some(other) = enc.participants.iter().find(|p| {
            p.id != actor_id && p.is_alive() && p.footprint().iter().any(|t| landing.contains(t))
        }) {
            return Err(EngineError::rule(
                "to",
                format!("{} is occupied by {}", to, other.id),
            ));
        }

        let (tiles, steps) = match path {
            Some(waypoints) => walk_waypoints(from, to, waypoints, &blocked, &difficult)?,
            None => {
                let options = PathOptions {
                    max_iterations: self.config.max_path_iterations,
                    difficult: Some(&difficult),
                    diagonal: true,
                };
                match find_path(from, to, &blocked, &options) {
                    PathOutcome::Found(p) => (p.tiles, p.cost),
                    PathOutcome::Unreachable { .. } => {
                        return Err(EngineError::rule("to", format!("no path to {}", to)));
                    }
                    PathOutcome::BudgetExhausted { iterations } => {
                        return Err(EngineError::EngineLimitExceeded {
                            limit: "max_path_iterations",
                            iterations,
                        });
                    }
                }
            }
        };

        let cost = steps.saturating_mul(self.config.feet_per_square);
        let remaining = actor.movement_remaining.unwrap_or(actor.movement_speed);
        if cost > remaining {
            return Err(EngineError::rule(
                "to",
                format!("moving to {} costs {} ft, {} ft remaining", to, cost, remaining),
            ));
        }

        let mut calc = CalculationResult::new(format!("move {} → {}", actor_id, to));
        calc.step(format!(
            "[MOVE][{}] {}",
            actor.name,
            tiles
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" → ")
        ));
        calc.step(format!(
            "Cost: {} ft ({} squares), {} ft left",
            cost,
            tiles.len().saturating_sub(1),
            remaining - cost
        ));
        calc.metadata
            .extensions
            .insert("squares", ExtValue::Int(tiles.len().saturating_sub(1) as i64))?;
        calc.metadata
            .extensions
            .insert("remaining_ft", ExtValue::Int(i64::from(remaining - cost)))?;

        let actor = self.encounter_mut()?.participant_mut(actor_id)?;
        actor.position = Some(to);
        actor.movement_remaining = Some(remaining - cost);
        Ok(calc.with_result(i64::from(cost)))
    }

    fn end_turn(&mut self, actor_id: &str) -> Result<CalculationResult> {
        self.require_turn(actor_id)?;
        let mut calc = CalculationResult::new(format!("end_turn {}", actor_id));
        self.pending_attack = None;

        let dice = &mut self.dice;
        let Some(enc) = self.encounter.as_mut() else {
            return Err(EngineError::not_found("encounter", self.id.clone()));
        };
        let actor = enc.participant_mut(actor_id)?;
        let name = actor.name.clone();
        let saves = actor.save_modifiers.clone();
        let restrained = actor.has(ConditionKind::Restrained);
        process_turn_boundary(
            TurnBoundary::EndOfTurn,
            &name,
            &mut actor.conditions,
            |ability, dc| boundary_save(dice, &name, &saves, restrained, ability, dc),
            |msg| calc.step(msg),
        )?;
        calc.step(format!("[TURN][{}] ends turn", name));

        self.advance(&mut calc)?;
        let enc = self.running_or_done()?;
        Ok(calc.with_result(enc.active_participant_id.clone()))
    }

    fn running_or_done(&self) -> Result<&Encounter> {
        self.encounter
            .as_ref()
            .ok_or_else(|| EngineError::not_found("encounter", self.id.clone()))
    }

    /// Pass the turn and run the new active participant's start-of-turn upkeep.
    fn advance(&mut self, calc: &mut CalculationResult) -> Result<()> {
        let enc = self.encounter_mut()?;
        let adv = enc.advance_turn();
        if adv.new_round {
            calc.step(format!("[ROUND] {} begins", enc.round));
        }
        match adv.next_id {
            Some(next) => {
                calc.step(format!("[TURN] {} is up", next));
                debug!(encounter = %enc.id, round = enc.round, next = %next, "turn advanced");
                self.begin_turn(calc)
            }
            None => {
                calc.step("[END] nobody left standing");
                Ok(())
            }
        }
    }

    fn begin_turn(&mut self, calc: &mut CalculationResult) -> Result<()> {
        let dice = &mut self.dice;
        let Some(enc) = self.encounter.as_mut() else {
            return Ok(());
        };
        let active_id = enc.active_participant_id.clone();
        let actor = enc.participant_mut(&active_id)?;
        let name = actor.name.clone();
        let saves = actor.save_modifiers.clone();
        let restrained = actor.has(ConditionKind::Restrained);
        process_turn_boundary(
            TurnBoundary::StartOfTurn,
            &name,
            &mut actor.conditions,
            |ability, dc| boundary_save(dice, &name, &saves, restrained, ability, dc),
            |msg| calc.step(msg),
        )?;
        self.reset_movement()
    }

    fn reset_movement(&mut self) -> Result<()> {
        let enc = self.encounter_mut()?;
        let active_id = enc.active_participant_id.clone();
        let actor = enc.participant_mut(&active_id)?;
        actor.movement_remaining = Some(actor.turn_speed());
        Ok(())
    }

    fn add_condition(&mut self, target_id: &str, mut condition: Condition) -> Result<CalculationResult> {
        self.running()?.participant(target_id)?;
        condition.validate()?;
        if condition.id.is_empty() {
            self.condition_seq += 1;
            condition.id = format!("{}-{}", condition.kind, self.condition_seq);
        } else if self
            .running()?
            .participants
            .iter()
            .any(|p| p.conditions.iter().any(|c| c.id == condition.id))
        {
            return Err(EngineError::rule(
                "condition.id",
                format!("condition id '{}' already in use", condition.id),
            ));
        }
        if let Some(source) = &condition.source_id {
            self.running()?.participant(source)?;
        }

        let id = condition.id.clone();
        let kind = condition.kind;
        let mut calc = CalculationResult::new(format!("apply {} → {}", kind, target_id));
        let enc = self.encounter_mut()?;
        let is_active = enc.active_participant_id == target_id;
        let target = enc.participant_mut(target_id)?;
        let name = target.name.clone();
        apply_condition(&name, &mut target.conditions, condition, |msg| calc.step(msg));
        if is_active && kind.zero_speed() {
            target.movement_remaining = Some(0);
        }
        Ok(calc.with_result(id))
    }

    fn remove_condition(&mut self, target_id: &str, condition_id: &str) -> Result<CalculationResult> {
        self.running()?.participant(target_id)?;
        let target = self.encounter_mut()?.participant_mut(target_id)?;
        let idx = target
            .conditions
            .iter()
            .position(|c| c.id == condition_id)
            .ok_or_else(|| EngineError::not_found("condition", condition_id))?;
        let removed = target.conditions.remove(idx);
        let mut calc = CalculationResult::new(format!("remove {} ← {}", condition_id, target_id));
        calc.step(format!("[COND][{}] is no longer {}", target.name, removed.kind));
        Ok(calc.with_result(condition_id))
    }

    fn set_status(&mut self, from: EncounterStatus, to: EncounterStatus) -> Result<CalculationResult> {
        let enc = self.encounter_mut()?;
        if enc.status != from {
            return Err(EngineError::rule(
                "status",
                format!("encounter is {:?}, expected {:?}", enc.status, from),
            ));
        }
        enc.status = to;
        info!(encounter = %enc.id, status = ?to, "encounter status changed");
        let mut calc = CalculationResult::new(format!("{:?}", to).to_lowercase());
        calc.step(format!("[STATUS] {:?} → {:?}", from, to));
        Ok(calc.with_result(format!("{:?}", to).to_lowercase()))
    }

    fn end_encounter(&mut self, reason: Option<String>) -> Result<CalculationResult> {
        let enc = self.encounter_mut()?;
        if enc.status == EncounterStatus::Completed {
            return Err(EngineError::rule("status", "encounter is already completed"));
        }
        enc.status = EncounterStatus::Completed;
        info!(encounter = %enc.id, "encounter ended");
        let mut calc = CalculationResult::new("end_encounter");
        calc.step(format!(
            "[END] encounter ended{}",
            reason.map(|r| format!(": {}", r)).unwrap_or_default()
        ));
        self.pending_attack = None;
        Ok(calc.with_result("completed"))
    }

    /// Give engine-assigned ids to conditions that arrive without one.
    fn assign_condition_ids(&mut self, conds: &mut [Condition]) {
        for c in conds.iter_mut().filter(|c| c.id.is_empty()) {
            self.condition_seq += 1;
            c.id = format!("{}-{}", c.kind, self.condition_seq);
        }
    }
}

/// A saving throw rolled at a turn boundary, with disadvantage on Dex while restrained.
fn boundary_save(
    dice: &mut Dice,
    name: &str,
    saves: &BTreeMap<Ability, i32>,
    restrained: bool,
    ability: Ability,
    dc: i32,
) -> Result<CalculationResult> {
    let restrained_dex = restrained && ability == Ability::Dex;
    let mut save = saving_throw(
        dice,
        SaveInput {
            label: name,
            dc,
            modifier: saves.get(&ability).copied().unwrap_or(0),
            mode: if restrained_dex {
                AdMode::Disadvantage
            } else {
                AdMode::Normal
            },
        },
    )?;
    if restrained_dex {
        save.step("Restrained: disadvantage on Dexterity saves");
    }
    Ok(save)
}

/// Grow obstacles so an `n`×`n` creature anchored at its top-left never overlaps one.
fn inflate(tiles: &BTreeSet<Tile>, n: i32) -> BTreeSet<Tile> {
    if n <= 1 {
        return tiles.clone();
    }
    let mut out = BTreeSet::new();
    for t in tiles {
        for dy in 0..n {
            for dx in 0..n {
                out.insert(t.offset(-dx, -dy));
            }
        }
    }
    out
}

fn footprints_adjacent(a: &Participant, b: &Participant) -> bool {
    let fb = b.footprint();
    a.footprint()
        .iter()
        .any(|ta| fb.iter().any(|tb| ta.chebyshev(tb) <= 1))
}

/// Check a caller-drawn route step by step and price it.
fn walk_waypoints(
    from: Tile,
    to: Tile,
    mut waypoints: Vec<Tile>,
    blocked: &BTreeSet<Tile>,
    difficult: &BTreeSet<Tile>,
) -> Result<(Vec<Tile>, u32)> {
    if waypoints.first() != Some(&from) {
        waypoints.insert(0, from);
    }
    if waypoints.last() != Some(&to) {
        return Err(EngineError::rule("path", format!("path does not end at {}", to)));
    }
    for (i, w) in waypoints.iter().enumerate() {
        w.validate(&format!("path[{}]", i))?;
    }
    let mut steps = 0u32;
    for pair in waypoints.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if !a.is_adjacent(&b) {
            return Err(EngineError::rule(
                "path",
                format!("{} → {} is not a single step", a, b),
            ));
        }
        if blocked.contains(&b) {
            return Err(EngineError::rule(
                "path",
                format!("path crosses an obstacle at {}", b),
            ));
        }
        steps = steps.saturating_add(step_cost(&b, Some(difficult)));
    }
    Ok((waypoints, steps))
}
