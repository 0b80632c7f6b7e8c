//! Live encounters keyed by (session, encounter), one lock per encounter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::combat::{ActionOutcome, CombatEngine, Encounter, Terrain};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::life::ParticipantSpec;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EncounterKey {
    pub session_id: String,
    pub encounter_id: String,
}

impl EncounterKey {
    pub fn new(session_id: impl Into<String>, encounter_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            encounter_id: encounter_id.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(EngineError::validation("session_id", "must not be empty"));
        }
        if self.encounter_id.trim().is_empty() {
            return Err(EngineError::validation("encounter_id", "must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Display for EncounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.encounter_id)
    }
}

pub type EncounterHandle = Arc<Mutex<CombatEngine>>;

/// In-memory encounter registry.
///
/// The map lock is held only long enough to look up or swap a handle; each
/// encounter then serializes its own mutations behind its mutex.
#[derive(Debug, Default)]
pub struct EncounterRegistry {
    config: EngineConfig,
    encounters: RwLock<HashMap<EncounterKey, EncounterHandle>>,
}

impl EncounterRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            encounters: RwLock::new(HashMap::new()),
        }
    }

    pub fn shared(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn get(&self, key: &EncounterKey) -> Option<EncounterHandle> {
        self.encounters.read().get(key).cloned()
    }

    fn handle(&self, key: &EncounterKey) -> Result<EncounterHandle> {
        self.get(key)
            .ok_or_else(|| EngineError::not_found("encounter", key.to_string()))
    }

    /// Start a new encounter under `key` and return its opening outcome.
    pub fn create(
        &self,
        key: EncounterKey,
        seed: &str,
        participants: Vec<ParticipantSpec>,
        terrain: Option<Terrain>,
    ) -> Result<ActionOutcome> {
        key.validate()?;
        self.config.validate()?;
        if self.encounters.read().contains_key(&key) {
            return Err(EngineError::rule(
                "encounter_id",
                format!("encounter {} already exists", key),
            ));
        }

        let mut engine = CombatEngine::new(key.to_string(), seed, self.config);
        let opening = engine.start_encounter(participants, terrain)?;

        let mut map = self.encounters.write();
        // another caller may have won the race since the read check
        if map.contains_key(&key) {
            return Err(EngineError::rule(
                "encounter_id",
                format!("encounter {} already exists", key),
            ));
        }
        info!(key = %key, "encounter registered");
        map.insert(key, Arc::new(Mutex::new(engine)));
        Ok(opening)
    }

    /// Run `f` with exclusive access to one encounter.
    pub fn with_encounter<T>(
        &self,
        key: &EncounterKey,
        f: impl FnOnce(&mut CombatEngine) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(key)?;
        let mut engine = handle.lock();
        f(&mut engine)
    }

    pub fn execute(&self, key: &EncounterKey, payload: &Value) -> Result<ActionOutcome> {
        self.with_encounter(key, |engine| engine.execute_payload(payload))
    }

    pub fn snapshot(&self, key: &EncounterKey) -> Result<Encounter> {
        self.with_encounter(key, |engine| engine.snapshot())
    }

    pub fn remove(&self, key: &EncounterKey) -> Option<EncounterHandle> {
        let removed = self.encounters.write().remove(key);
        if removed.is_some() {
            info!(key = %key, "encounter removed");
        }
        removed
    }

    pub fn clear(&self) {
        let mut map = self.encounters.write();
        info!(count = map.len(), "registry cleared");
        map.clear();
    }

    pub fn len(&self) -> usize {
        self.encounters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.encounters.read().is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<EncounterKey> {
        let mut keys: Vec<_> = self.encounters.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
