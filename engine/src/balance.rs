//! Encounter difficulty from party levels and enemy challenge ratings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Challenge rating → XP award.
const CR_XP: [(f64, u32); 34] = [
    (0.0, 10),
    (0.125, 25),
    (0.25, 50),
    (0.5, 100),
    (1.0, 200),
    (2.0, 450),
    (3.0, 700),
    (4.0, 1_100),
    (5.0, 1_800),
    (6.0, 2_300),
    (7.0, 2_900),
    (8.0, 3_900),
    (9.0, 5_000),
    (10.0, 5_900),
    (11.0, 7_200),
    (12.0, 8_400),
    (13.0, 10_000),
    (14.0, 11_500),
    (15.0, 13_000),
    (16.0, 15_000),
    (17.0, 18_000),
    (18.0, 20_000),
    (19.0, 22_000),
    (20.0, 25_000),
    (21.0, 33_000),
    (22.0, 41_000),
    (23.0, 50_000),
    (24.0, 62_000),
    (25.0, 75_000),
    (26.0, 90_000),
    (27.0, 105_000),
    (28.0, 120_000),
    (29.0, 135_000),
    (30.0, 155_000),
];

/// Per-character XP thresholds (easy, medium, hard, deadly) for levels 1..=20.
const LEVEL_THRESHOLDS: [[u32; 4]; 20] = [
    [25, 50, 75, 100],
    [50, 100, 150, 200],
    [75, 150, 225, 400],
    [125, 250, 375, 500],
    [250, 500, 750, 1_100],
    [300, 600, 900, 1_400],
    [350, 750, 1_100, 1_700],
    [450, 900, 1_400, 2_100],
    [550, 1_100, 1_600, 2_400],
    [600, 1_200, 1_900, 2_800],
    [800, 1_600, 2_400, 3_600],
    [1_000, 2_000, 3_000, 4_500],
    [1_100, 2_200, 3_400, 5_100],
    [1_250, 2_500, 3_800, 5_700],
    [1_400, 2_800, 4_300, 6_400],
    [1_600, 3_200, 4_800, 7_200],
    [2_000, 3_900, 5_900, 8_800],
    [2_100, 4_200, 6_300, 9_500],
    [2_400, 4_900, 7_300, 10_900],
    [2_800, 5_700, 8_500, 12_700],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    Trivial,
    Easy,
    Medium,
    Hard,
    Deadly,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub easy: u64,
    pub medium: u64,
    pub hard: u64,
    pub deadly: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub difficulty: Difficulty,
    pub base_xp: u64,
    pub adjusted_xp: u64,
    pub multiplier: f64,
    pub thresholds: Thresholds,
    pub party_size: usize,
    pub enemy_count: usize,
}

pub fn cr_to_xp(cr: f64) -> Result<u32> {
    if !cr.is_finite() {
        return Err(EngineError::validation(
            "challenge_ratings",
            format!("challenge rating must be finite, got {}", cr),
        ));
    }
    CR_XP
        .iter()
        .find(|(rating, _)| (rating - cr).abs() < 1e-6)
        .map(|(_, xp)| *xp)
        .ok_or_else(|| {
            EngineError::validation(
                "challenge_ratings",
                format!("unknown challenge rating {}", cr),
            )
        })
}

pub fn level_thresholds(level: u32) -> Result<Thresholds> {
    if !(1..=20).contains(&level) {
        return Err(EngineError::validation(
            "party_levels",
            format!("character level must be within 1..=20, got {}", level),
        ));
    }
    let [easy, medium, hard, deadly] = LEVEL_THRESHOLDS[(level - 1) as usize];
    Ok(Thresholds {
        easy: u64::from(easy),
        medium: u64::from(medium),
        hard: u64::from(hard),
        deadly: u64::from(deadly),
    })
}

/// Multiplier in halves, so 1.5× stays exact.
fn multiplier_halves(enemies: usize) -> u64 {
    match enemies {
        0 | 1 => 2,
        2 => 3,
        3..=6 => 4,
        7..=10 => 5,
        _ => 6,
    }
}

/// Classify an encounter by the highest party threshold its adjusted XP meets.
pub fn encounter_balance(party_levels: &[u32], challenge_ratings: &[f64]) -> Result<BalanceReport> {
    if party_levels.is_empty() {
        return Err(EngineError::validation("party_levels", "party must not be empty"));
    }
    if challenge_ratings.is_empty() {
        return Err(EngineError::validation(
            "challenge_ratings",
            "at least one enemy is required",
        ));
    }

    let mut thresholds = Thresholds::default();
    for &level in party_levels {
        let t = level_thresholds(level)?;
        thresholds.easy = thresholds.easy.saturating_add(t.easy);
        thresholds.medium = thresholds.medium.saturating_add(t.medium);
        thresholds.hard = thresholds.hard.saturating_add(t.hard);
        thresholds.deadly = thresholds.deadly.saturating_add(t.deadly);
    }

    let too_much = || EngineError::validation("challenge_ratings", "total XP out of range");
    let base_xp = challenge_ratings.iter().try_fold(0u64, |sum, &cr| {
        sum.checked_add(u64::from(cr_to_xp(cr)?)).ok_or_else(too_much)
    })?;
    let halves = multiplier_halves(challenge_ratings.len());
    let adjusted_xp = base_xp.checked_mul(halves).ok_or_else(too_much)? / 2;

    let difficulty = if adjusted_xp >= thresholds.deadly {
        Difficulty::Deadly
    } else if adjusted_xp >= thresholds.hard {
        Difficulty::Hard
    } else if adjusted_xp >= thresholds.medium {
        Difficulty::Medium
    } else if adjusted_xp >= thresholds.easy {
        Difficulty::Easy
    } else {
        Difficulty::Trivial
    };

    Ok(BalanceReport {
        difficulty,
        base_xp,
        adjusted_xp,
        multiplier: halves as f64 / 2.0,
        thresholds,
        party_size: party_levels.len(),
        enemy_count: challenge_ratings.len(),
    })
}
