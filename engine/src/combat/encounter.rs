use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::life::Participant;
use crate::spatial::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terrain {
    /// Block movement and line of sight.
    #[serde(default)]
    pub obstacles: BTreeSet<Tile>,
    /// Doubles movement cost only.
    #[serde(default)]
    pub difficult_terrain: BTreeSet<Tile>,
}

/// A placed object on the map; blocking props act as obstacles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prop {
    pub id: String,
    pub name: String,
    pub position: Tile,
    #[serde(default)]
    pub blocking: bool,
}

/// Serializable encounter snapshot. `participants` is in initiative order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: String,
    pub participants: Vec<Participant>,
    pub round: u32,
    pub active_participant_id: String,
    pub status: EncounterStatus,
    #[serde(default)]
    pub terrain: Terrain,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub props: Vec<Prop>,
}

/// What a turn advance did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnAdvance {
    pub next_id: Option<String>,
    pub new_round: bool,
}

impl Encounter {
    pub fn participant(&self, id: &str) -> Result<&Participant> {
        self.participants
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| EngineError::not_found("participant", id))
    }

    pub fn participant_mut(&mut self, id: &str) -> Result<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| EngineError::not_found("participant", id))
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.id == id)
    }

    pub fn active(&self) -> Result<&Participant> {
        self.participant(&self.active_participant_id)
    }

    /// Obstacles plus blocking props.
    pub fn blocked_tiles(&self) -> BTreeSet<Tile> {
        let mut blocked = self.terrain.obstacles.clone();
        blocked.extend(self.props.iter().filter(|p| p.blocking).map(|p| p.position));
        blocked
    }

    /// A side with at least one member that is fully down.
    pub fn defeated_side(&self) -> Option<bool> {
        [true, false].into_iter().find(|&enemy| {
            let mut side = self.participants.iter().filter(|p| p.is_enemy == enemy).peekable();
            side.peek().is_some() && side.all(|p| !p.is_alive())
        })
    }

    /// Move to the next living participant in initiative order.
    ///
    /// Passing the end of the order bumps the round. With nobody alive the
    /// encounter completes.
    pub fn advance_turn(&mut self) -> TurnAdvance {
        let len = self.participants.len();
        let start = self.index_of(&self.active_participant_id).unwrap_or(0);
        let mut new_round = false;
        for step in 1..=len {
            let idx = start + step;
            if idx >= len && !new_round {
                new_round = true;
                self.round += 1;
            }
            let candidate = &self.participants[idx % len];
            if candidate.is_alive() {
                self.active_participant_id = candidate.id.clone();
                return TurnAdvance {
                    next_id: Some(candidate.id.clone()),
                    new_round,
                };
            }
        }
        self.status = EncounterStatus::Completed;
        TurnAdvance {
            next_id: None,
            new_round,
        }
    }
}

/// Sort participants by initiative total (descending), then initiative bonus
/// (descending), then original input order.
pub fn order_by_initiative(participants: &mut [Participant]) {
    // sort_by is stable, which keeps input order for full ties
    participants.sort_by(|a, b| {
        b.initiative
            .unwrap_or(i32::MIN)
            .cmp(&a.initiative.unwrap_or(i32::MIN))
            .then(b.initiative_bonus.cmp(&a.initiative_bonus))
    });
}
