//! Numeric rule resolution: attack rolls, damage rolls, fall damage.

use crate::calc::{CalculationResult, ExtValue, Outcome};
use crate::dice::DiceExpression;
use crate::error::Result;
use crate::{check_modifier, format_modifier, AdMode, Dice};

pub const DEFAULT_CRIT_THRESHOLD: u32 = 20;
const MAX_FALL_DICE: u32 = 20;

#[derive(Debug, Clone, Copy)]
pub struct AttackInput<'a> {
    pub attacker: &'a str,
    pub attack_bonus: i32,
    pub target_ac: i32,
    pub mode: AdMode,
    pub crit_threshold: u32,
}

#[derive(Debug, Clone)]
pub struct AttackResult {
    pub outcome: Outcome,
    pub natural: u32,
    pub total: i64,
    pub calc: CalculationResult,
}

impl AttackResult {
    pub fn is_crit(&self) -> bool {
        self.outcome == Outcome::Crit
    }

    pub fn hit(&self) -> bool {
        matches!(self.outcome, Outcome::Crit | Outcome::Hit)
    }
}

/// Natural 1 always misses; a natural roll at or above the crit threshold always crits.
pub fn classify_attack(natural: u32, total: i64, target_ac: i32, crit_threshold: u32) -> Outcome {
    if natural == 1 {
        Outcome::Miss
    } else if natural >= crit_threshold {
        Outcome::Crit
    } else if total >= i64::from(target_ac) {
        Outcome::Hit
    } else {
        Outcome::Miss
    }
}

pub fn attack(dice: &mut Dice, input: AttackInput<'_>) -> Result<AttackResult> {
    check_modifier("attack_bonus", input.attack_bonus)?;
    check_modifier("ac", input.target_ac)?;
    let roll = dice.roll(&DiceExpression::d20(input.attack_bonus, input.mode))?;
    let natural = roll.metadata.rolls.first().copied().unwrap_or(1);
    let total = roll.total().unwrap_or(0);
    let outcome = classify_attack(natural, total, input.target_ac, input.crit_threshold);

    let mut calc = CalculationResult::new(format!(
        "attack 1d20{} vs AC {}",
        format_modifier(input.attack_bonus),
        input.target_ac
    ));
    calc.absorb(&roll);
    let label = match outcome {
        Outcome::Crit => "CRIT!",
        Outcome::Hit => "HIT",
        _ if natural == 1 => "MISS (NAT1)",
        _ => "MISS",
    };
    calc.step(format!(
        "[ATTACK][{}] d20={} → {} to-hit={} vs AC={}",
        input.attacker, natural, label, total, input.target_ac
    ));
    calc.metadata = roll.metadata;
    calc.metadata.outcome = Some(outcome);
    calc.metadata
        .extensions
        .insert("crit_threshold", ExtValue::Int(i64::from(input.crit_threshold)))?;

    Ok(AttackResult {
        outcome,
        natural,
        total,
        calc: calc.with_result(total),
    })
}

/// Roll damage. A critical hit doubles the dice count, never the flat modifier.
pub fn damage_roll(dice: &mut Dice, expr: &DiceExpression, is_crit: bool) -> Result<CalculationResult> {
    let effective = if is_crit { expr.doubled_dice() } else { *expr };
    let roll = dice.roll(&effective)?;

    let mut calc = CalculationResult::new(format!("damage {}", expr));
    if is_crit {
        calc.step(format!("Critical hit: dice doubled, rolling {}", effective));
    }
    calc.absorb(&roll);
    // negative modifiers never heal
    let total = roll.total().unwrap_or(0).max(0);
    calc.metadata = roll.metadata;
    if is_crit {
        calc.metadata.outcome = Some(Outcome::Crit);
    }
    Ok(calc.with_result(total))
}

/// 1d6 per full 10 ft fallen, at most 20d6. Under 10 ft deals nothing and rolls nothing.
pub fn fall_damage(dice: &mut Dice, feet: u32) -> Result<CalculationResult> {
    let count = (feet / 10).min(MAX_FALL_DICE);
    let mut calc = CalculationResult::new(format!("fall {} ft", feet));
    if count == 0 {
        calc.step(format!("Fell {} ft: under 10 ft, no damage", feet));
        return Ok(calc.with_result(0));
    }
    let expr = DiceExpression::new(count, 6, 0);
    calc.step(format!("Fell {} ft: {}d6 bludgeoning", feet, count));
    let roll = dice.roll(&expr)?;
    calc.absorb(&roll);
    let total = roll.total().unwrap_or(0);
    calc.metadata = roll.metadata;
    Ok(calc.with_result(total))
}
