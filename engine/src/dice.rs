//! Dice notation ("2d6+3", "d20", "4d6-2") and rolling against a [`Dice`] stream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calc::CalculationResult;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::{format_modifier, AdMode, Dice};

/// Hard ceiling on dice per roll, whatever the engine config allows.
pub const MAX_DICE_COUNT: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub count: u32,
    pub sides: u32,
    #[serde(default)]
    pub modifier: i32,
    #[serde(default)]
    pub advantage: bool,
    #[serde(default)]
    pub disadvantage: bool,
}

impl DiceExpression {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
            advantage: false,
            disadvantage: false,
        }
    }

    /// A single d20 plus modifier, rolled in the given mode.
    pub fn d20(modifier: i32, mode: AdMode) -> Self {
        Self::new(1, 20, modifier).with_mode(mode)
    }

    pub fn with_mode(mut self, mode: AdMode) -> Self {
        self.advantage = mode == AdMode::Advantage;
        self.disadvantage = mode == AdMode::Disadvantage;
        self
    }

    /// Both flags together cancel out.
    pub fn mode(&self) -> AdMode {
        AdMode::from_flags(self.advantage, self.disadvantage)
    }

    /// Same expression with the dice count doubled, modifier untouched.
    pub fn doubled_dice(&self) -> Self {
        Self {
            count: self.count.saturating_mul(2),
            ..*self
        }
    }

    pub fn min(&self) -> i64 {
        i64::from(self.count) + i64::from(self.modifier)
    }

    pub fn max(&self) -> i64 {
        i64::from(self.count) * i64::from(self.sides) + i64::from(self.modifier)
    }

    pub fn average(&self) -> i32 {
        let avg_per_die = (1.0 + f64::from(self.sides)) / 2.0;
        (f64::from(self.count) * avg_per_die + f64::from(self.modifier)) as i32
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(EngineError::validation("count", "dice count must be at least 1"));
        }
        if self.count > MAX_DICE_COUNT {
            return Err(EngineError::validation(
                "count",
                format!("{} dice exceeds the limit of {}", self.count, MAX_DICE_COUNT),
            ));
        }
        if self.sides == 0 {
            return Err(EngineError::validation("sides", "die sides must be at least 1"));
        }
        if (self.advantage || self.disadvantage) && (self.count != 1 || self.sides != 20) {
            return Err(EngineError::validation(
                if self.advantage { "advantage" } else { "disadvantage" },
                format!("only applies to a single d20, not {}d{}", self.count, self.sides),
            ));
        }
        Ok(())
    }

    pub fn check_limits(&self, cfg: &EngineConfig) -> Result<()> {
        self.validate()?;
        if self.count > cfg.max_dice_count {
            return Err(EngineError::validation(
                "count",
                format!("{} dice exceeds the limit of {}", self.count, cfg.max_dice_count),
            ));
        }
        if self.sides > cfg.max_dice_sides {
            return Err(EngineError::validation(
                "sides",
                format!("d{} exceeds the limit of d{}", self.sides, cfg.max_dice_sides),
            ));
        }
        Ok(())
    }
}

impl FromStr for DiceExpression {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        if self.modifier != 0 {
            write!(f, "{}", format_modifier(self.modifier))?;
        }
        match self.mode() {
            AdMode::Advantage => write!(f, " (advantage)"),
            AdMode::Disadvantage => write!(f, " (disadvantage)"),
            AdMode::Normal => Ok(()),
        }
    }
}

fn parse_error(input: &str, fragment: &str, message: impl Into<String>) -> EngineError {
    EngineError::Parse {
        input: input.to_string(),
        fragment: fragment.to_string(),
        message: message.into(),
    }
}

/// Parse "NdM", "NdM+K", "NdM-K" or "dM". Case and whitespace are ignored.
pub fn parse(text: &str) -> Result<DiceExpression> {
    let notation: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if notation.is_empty() {
        return Err(parse_error(text, text, "empty dice expression"));
    }

    let d_pos = notation
        .find('d')
        .ok_or_else(|| parse_error(text, &notation, "missing 'd' in dice notation"))?;

    let count_str = &notation[..d_pos];
    let count: u32 = if count_str.is_empty() {
        1
    } else {
        count_str
            .parse()
            .map_err(|_| parse_error(text, count_str, "invalid dice count"))?
    };
    if count == 0 {
        return Err(parse_error(text, count_str, "dice count must be at least 1"));
    }

    let rest = &notation[d_pos + 1..];
    let split = rest.find(['+', '-']);
    let (sides_str, modifier_str) = match split {
        Some(pos) => (&rest[..pos], Some(&rest[pos..])),
        None => (rest, None),
    };

    if sides_str.is_empty() {
        return Err(parse_error(text, &notation, "missing die sides"));
    }
    let sides: u32 = sides_str
        .parse()
        .map_err(|_| parse_error(text, sides_str, "invalid die sides"))?;
    if sides == 0 {
        return Err(parse_error(text, sides_str, "die sides must be at least 1"));
    }

    let modifier = match modifier_str {
        None => 0,
        Some(m) => {
            let digits = &m[1..];
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(parse_error(text, m, "invalid modifier"));
            }
            // the sign is part of the slice, so i32 parsing handles both directions
            m.parse::<i32>()
                .map_err(|_| parse_error(text, m, "modifier out of range"))?
        }
    };

    Ok(DiceExpression::new(count, sides, modifier))
}

impl Dice {
    /// Roll an expression, consuming `count` faces (two for advantage/disadvantage).
    pub fn roll(&mut self, expr: &DiceExpression) -> Result<CalculationResult> {
        expr.validate()?;
        let mut calc = CalculationResult::new(expr.to_string());
        let mode = expr.mode();

        if expr.advantage && expr.disadvantage {
            calc.step("Advantage and disadvantage cancel; rolling normally");
        }

        let faces = if mode == AdMode::Normal {
            let faces: Vec<u32> = (0..expr.count).map(|_| self.roll_die(expr.sides)).collect();
            calc.step(format!(
                "Rolled {}d{}: [{}]",
                expr.count,
                expr.sides,
                join(&faces)
            ));
            faces
        } else {
            let d20 = self.d20_detailed(mode);
            let label = if mode == AdMode::Advantage {
                "advantage"
            } else {
                "disadvantage"
            };
            calc.step(format!(
                "Rolled 1d20 with {}: {} and {}, keeping {}",
                label, d20.rolls[0], d20.rolls[1], d20.kept
            ));
            calc.metadata.mode = Some(mode);
            d20.rolls
        };

        // with two candidate d20s only the first (kept) counts
        let counted: i64 = if mode == AdMode::Normal {
            faces.iter().map(|&f| i64::from(f)).sum()
        } else {
            i64::from(faces[0])
        };
        if expr.modifier != 0 {
            calc.step(format!("Modifier {}", format_modifier(expr.modifier)));
        }
        let total = counted + i64::from(expr.modifier);
        calc.step(format!("Total: {}", total));

        if expr.count == 1 && expr.sides == 20 {
            calc.metadata.natural = Some(faces[0]);
        }
        calc.metadata.modifier = Some(expr.modifier);
        calc.metadata.rolls = faces;
        debug!(expr = %expr, total, draws = self.draws(), "dice rolled");
        Ok(calc.with_result(total))
    }

    /// Parse then roll.
    pub fn roll_str(&mut self, text: &str) -> Result<CalculationResult> {
        let expr = parse(text)?;
        self.roll(&expr)
    }
}

pub(crate) fn join(faces: &[u32]) -> String {
    faces
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
