//! Encounter lifecycle, turn order and action resolution.

pub mod actions;
pub mod encounter;
pub mod machine;
pub mod resolve;

pub use actions::{guard_payload, CombatAction};
pub use encounter::{Encounter, EncounterStatus, Prop, Terrain};
pub use machine::{ActionOutcome, CombatEngine, CombatPhase};
pub use resolve::{attack, classify_attack, damage_roll, fall_damage, AttackInput, AttackResult};
