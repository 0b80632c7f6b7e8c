use crate::calc::{CalculationResult, Outcome};
use crate::dice::DiceExpression;
use crate::error::Result;
use crate::{check_modifier, format_modifier, AdMode, Dice};

#[derive(Debug, Clone, Copy)]
pub struct SaveInput<'a> {
    pub label: &'a str,
    pub dc: i32,
    pub modifier: i32,
    pub mode: AdMode,
}

/// Roll 1d20 + modifier against a DC. Success iff total >= DC; the margin is signed.
pub fn saving_throw(dice: &mut Dice, input: SaveInput<'_>) -> Result<CalculationResult> {
    check_modifier("modifier", input.modifier)?;
    check_modifier("dc", input.dc)?;
    let roll = dice.roll(&DiceExpression::d20(input.modifier, input.mode))?;
    let total = roll.total().unwrap_or(0);
    let margin = total - i64::from(input.dc);
    let success = margin >= 0;

    let mut calc = CalculationResult::new(format!(
        "save 1d20{} vs DC {}",
        format_modifier(input.modifier),
        input.dc
    ));
    calc.absorb(&roll);
    calc.step(format!(
        "[SAVE][{}] total={} vs DC {} → {} (margin {:+})",
        input.label,
        total,
        input.dc,
        if success { "SUCCESS" } else { "FAIL" },
        margin
    ));
    calc.metadata = roll.metadata;
    calc.metadata.dc = Some(input.dc);
    calc.metadata.margin = Some(margin);
    calc.metadata.outcome = Some(if success {
        Outcome::Success
    } else {
        Outcome::Failure
    });
    Ok(calc.with_result(total))
}

pub fn succeeded(save: &CalculationResult) -> bool {
    save.metadata.outcome == Some(Outcome::Success)
}
