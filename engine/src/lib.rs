use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod api;
pub mod balance;
pub mod calc;
pub mod checks;
pub mod combat;
pub mod conditions;
pub mod config;
pub mod content;
pub mod dice;
pub mod error;
pub mod life;
pub mod registry;
pub mod spatial;

pub use calc::{CalcMetadata, CalcValue, CalculationResult, ExtValue, Extensions, Outcome};
pub use config::EngineConfig;
pub use dice::{parse, DiceExpression};
pub use error::{EngineError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl AdMode {
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Self {
        match (advantage, disadvantage) {
            (true, false) => AdMode::Advantage,
            (false, true) => AdMode::Disadvantage,
            _ => AdMode::Normal,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

#[derive(Debug, Clone)]
enum Source {
    Seeded(ChaCha8Rng),
    Scripted { faces: Vec<u32>, cursor: usize },
}

/// The one randomness stream an engine instance owns.
///
/// Every face comes out of here in order, so the same seed and the same
/// sequence of calls always yield the same faces.
#[derive(Debug, Clone)]
pub struct Dice {
    source: Source,
    draws: u64,
}

/// A single d20 roll, possibly drawn twice for advantage/disadvantage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D20Roll {
    pub kept: u32,
    /// Kept die first, then the discarded one when two were drawn.
    pub rolls: Vec<u32>,
}

impl Dice {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            source: Source::Seeded(ChaCha8Rng::seed_from_u64(seed)),
            draws: 0,
        }
    }

    /// Seed from arbitrary text (session ids, replay tokens).
    pub fn from_seed_str(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self {
            source: Source::Seeded(ChaCha8Rng::from_seed(bytes)),
            draws: 0,
        }
    }

    /// Replays fixed faces in order, cycling when exhausted. Faces are clamped to the die.
    pub fn from_scripted(faces: Vec<u32>) -> Self {
        Self {
            source: Source::Scripted { faces, cursor: 0 },
            draws: 0,
        }
    }

    /// Number of faces consumed so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn roll_die(&mut self, sides: u32) -> u32 {
        let sides = sides.max(1);
        self.draws += 1;
        match &mut self.source {
            Source::Seeded(rng) => rng.gen_range(1..=sides),
            Source::Scripted { faces, cursor } => {
                if faces.is_empty() {
                    return 1;
                }
                let face = faces[*cursor % faces.len()];
                *cursor += 1;
                face.clamp(1, sides)
            }
        }
    }

    pub fn d20(&mut self, mode: AdMode) -> u32 {
        self.d20_detailed(mode).kept
    }

    pub fn d20_detailed(&mut self, mode: AdMode) -> D20Roll {
        match mode {
            AdMode::Normal => {
                let a = self.roll_die(20);
                D20Roll {
                    kept: a,
                    rolls: vec![a],
                }
            }
            AdMode::Advantage => {
                let a = self.roll_die(20);
                let b = self.roll_die(20);
                let (kept, other) = if b > a { (b, a) } else { (a, b) };
                D20Roll {
                    kept,
                    rolls: vec![kept, other],
                }
            }
            AdMode::Disadvantage => {
                let a = self.roll_die(20);
                let b = self.roll_die(20);
                let (kept, other) = if b < a { (b, a) } else { (a, b) };
                D20Roll {
                    kept,
                    rolls: vec![kept, other],
                }
            }
        }
    }
}

pub(crate) fn format_modifier(modifier: i32) -> String {
    if modifier >= 0 {
        format!("+{}", modifier)
    } else {
        format!("-{}", modifier.unsigned_abs())
    }
}

/// Largest magnitude a bonus, modifier, AC or DC may have.
pub const MAX_MODIFIER: i32 = 1_000;

pub(crate) fn check_modifier(field: &str, value: i32) -> Result<()> {
    if !(-MAX_MODIFIER..=MAX_MODIFIER).contains(&value) {
        return Err(EngineError::validation(
            field,
            format!("{} is outside ±{}", value, MAX_MODIFIER),
        ));
    }
    Ok(())
}
