use std::collections::HashMap;

/// Bundled encounter scripts, keyed by id.
pub fn builtin_encounters() -> HashMap<&'static str, &'static str> {
    HashMap::from([(
        "goblin_ambush",
        include_str!("../content/encounters/goblin_ambush.yaml"),
    )])
}
