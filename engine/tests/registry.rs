use std::sync::Arc;
use std::thread;

use arbiter::combat::CombatAction;
use arbiter::life::ParticipantSpec;
use arbiter::registry::{EncounterKey, EncounterRegistry};
use arbiter::EngineConfig;
use serde_json::json;

fn roster() -> Vec<ParticipantSpec> {
    let goblin = ParticipantSpec {
        is_enemy: true,
        ..ParticipantSpec::new("goblin", 7)
    };
    vec![ParticipantSpec::new("hero", 10), goblin]
}

#[test]
fn create_get_clear() {
    let registry = EncounterRegistry::new(EngineConfig::default());
    let key = EncounterKey::new("s1", "e1");
    registry.create(key.clone(), "seed", roster(), None).unwrap();
    assert!(registry.get(&key).is_some());
    assert_eq!(registry.len(), 1);

    let err = registry
        .create(key.clone(), "seed", roster(), None)
        .unwrap_err();
    assert!(err.is_rule_violation());

    registry.clear();
    assert!(registry.get(&key).is_none());
    assert!(registry.is_empty());
    assert!(registry.snapshot(&key).unwrap_err().is_not_found());
}

#[test]
fn keys_are_scoped_by_session() {
    let registry = EncounterRegistry::new(EngineConfig::default());
    registry
        .create(EncounterKey::new("alice", "cave"), "a", roster(), None)
        .unwrap();
    registry
        .create(EncounterKey::new("bob", "cave"), "b", roster(), None)
        .unwrap();
    assert_eq!(
        registry.keys(),
        vec![EncounterKey::new("alice", "cave"), EncounterKey::new("bob", "cave")]
    );
    assert!(registry.remove(&EncounterKey::new("alice", "cave")).is_some());
    assert!(registry.remove(&EncounterKey::new("alice", "cave")).is_none());
    assert_eq!(registry.len(), 1);

    let err = registry
        .create(EncounterKey::new("", "cave"), "x", roster(), None)
        .unwrap_err();
    assert_eq!(err.field(), Some("session_id"));
}

#[test]
fn unknown_key_is_not_found() {
    let registry = EncounterRegistry::new(EngineConfig::default());
    let err = registry
        .execute(
            &EncounterKey::new("nobody", "nothing"),
            &json!({"kind": "pause"}),
        )
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn failed_start_registers_nothing() {
    let registry = EncounterRegistry::new(EngineConfig::default());
    let key = EncounterKey::new("s", "e");
    assert!(registry.create(key.clone(), "seed", vec![], None).is_err());
    assert!(registry.get(&key).is_none());
}

#[test]
fn concurrent_turns_on_one_key_never_interleave() {
    let registry = EncounterRegistry::shared(EngineConfig::default());
    let key = EncounterKey::new("race", "arena");
    registry.create(key.clone(), "race-seed", roster(), None).unwrap();

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    registry
                        .with_encounter(&key, |engine| {
                            let active = engine.encounter().unwrap().active_participant_id.clone();
                            engine.execute_action(CombatAction::EndTurn { actor_id: active })
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    // 200 end_turns over two participants: exactly 100 wraps
    let snap = registry.snapshot(&key).unwrap();
    assert_eq!(snap.round, 101);
    assert_eq!(snap.active_participant_id, snap.participants[0].id);
}

#[test]
fn independent_keys_run_in_parallel() {
    let registry = EncounterRegistry::shared(EngineConfig::default());
    let keys: Vec<_> = (0..4).map(|i| EncounterKey::new("par", format!("e{i}"))).collect();
    for k in &keys {
        registry.create(k.clone(), &k.to_string(), roster(), None).unwrap();
    }
    let threads: Vec<_> = keys
        .iter()
        .cloned()
        .map(|key| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..10 {
                    registry
                        .with_encounter(&key, |engine| {
                            let active = engine.encounter().unwrap().active_participant_id.clone();
                            engine.execute_action(CombatAction::EndTurn { actor_id: active })
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    for k in &keys {
        assert_eq!(registry.snapshot(k).unwrap().round, 6);
    }
}

#[test]
fn seeded_runs_replay_identically() {
    let run = || {
        let registry = EncounterRegistry::new(EngineConfig::default());
        let key = EncounterKey::new("replay", "x");
        let opening = registry.create(key.clone(), "fixed", roster(), None).unwrap();
        let active = opening.snapshot.active_participant_id.clone();
        let target = if active == "hero" { "goblin" } else { "hero" };
        let attack = registry
            .execute(
                &key,
                &json!({"kind": "attack", "actor_id": active, "target_id": target}),
            )
            .unwrap();
        (opening.result.metadata.rolls, attack.result.metadata.rolls)
    };
    assert_eq!(run(), run());
}
