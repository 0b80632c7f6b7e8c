use arbiter::balance::{encounter_balance, Difficulty};

#[test]
fn four_quarter_cr_goblins_are_deadly_for_level_one() {
    let report = encounter_balance(&[1, 1, 1, 1], &[0.25, 0.25, 0.25, 0.25]).unwrap();
    assert_eq!(report.difficulty, Difficulty::Deadly);
    assert_eq!(report.base_xp, 200);
    assert_eq!(report.adjusted_xp, 400);
    assert_eq!(report.multiplier, 2.0);
    assert_eq!(report.thresholds.deadly, 400);
}

#[test]
fn classification_uses_highest_threshold_met() {
    // 2 × CR 2 = 900 XP × 1.5 = 1350 vs level-3 party of four (hard 900, deadly 1600)
    let report = encounter_balance(&[3, 3, 3, 3], &[2.0, 2.0]).unwrap();
    assert_eq!(report.adjusted_xp, 1350);
    assert_eq!(report.difficulty, Difficulty::Hard);

    let report = encounter_balance(&[5, 5, 5, 5], &[1.0]).unwrap();
    assert_eq!(report.difficulty, Difficulty::Trivial);
}

#[test]
fn difficulty_serializes_capitalized() {
    let report = encounter_balance(&[1], &[0.125]).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["difficulty"], "Easy");
    assert_eq!(report.difficulty.to_string(), "Easy");
}

#[test]
fn bad_inputs_are_validation_errors() {
    assert!(encounter_balance(&[], &[1.0]).unwrap_err().is_validation());
    assert!(encounter_balance(&[1], &[]).unwrap_err().is_validation());
    assert_eq!(
        encounter_balance(&[0], &[1.0]).unwrap_err().field(),
        Some("party_levels")
    );
    assert_eq!(
        encounter_balance(&[1], &[0.3]).unwrap_err().field(),
        Some("challenge_ratings")
    );
}

#[test]
fn huge_hordes_do_not_overflow() {
    let report = encounter_balance(&[1], &[30.0; 5000]).unwrap();
    assert_eq!(report.base_xp, 775_000_000);
    assert_eq!(report.adjusted_xp, 2_325_000_000);
    assert_eq!(report.difficulty, Difficulty::Deadly);
}
