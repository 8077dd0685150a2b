//! Bundled profiles and hash sets
//!
//! Added to the store whenever they are missing. Coordinates are in the
//! 2560x1440 reference resolution.

use chrono::{DateTime, Utc};

use super::profiles::{ImageHashSet, Region, RegionProfile};

/// Id of the bundled scoreboard profile
pub const DEFAULT_PROFILE_ID: &str = "default-scoreboard";
/// Id of the bundled hero portrait hash set
pub const DEFAULT_HERO_SET_ID: &str = "default-heroes";

const DIGITS: &str = "0-9";
const DIGITS_WITH_SEPARATOR: &str = "0-9,";

fn bundled_timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default()
}

/// Profiles shipped with the application
pub fn default_profiles() -> Vec<RegionProfile> {
    vec![RegionProfile {
        id: DEFAULT_PROFILE_ID.to_string(),
        description: "Post-match scoreboard (personal stats panel)".to_string(),
        regions: vec![
            Region::new("hero", 160, 210, 150, 150).with_hash_set(DEFAULT_HERO_SET_ID),
            Region::new("playerName", 340, 230, 520, 60).italic(),
            Region::new("eliminations", 1780, 400, 140, 56).with_char_set(DIGITS),
            Region::new("assists", 1960, 400, 140, 56).with_char_set(DIGITS),
            Region::new("deaths", 2140, 400, 140, 56).with_char_set(DIGITS),
            Region::new("damage", 1780, 520, 240, 56).with_char_set(DIGITS_WITH_SEPARATOR),
            Region::new("healing", 2060, 520, 240, 56).with_char_set(DIGITS_WITH_SEPARATOR),
            Region::new("mitigation", 2340, 520, 200, 56).with_char_set(DIGITS_WITH_SEPARATOR),
            Region::new("matchTime", 1180, 60, 200, 48).with_char_set("0-9:"),
            Region::new("mapName", 980, 120, 600, 60).with_char_set("A-Z' "),
        ],
        image_hash_sets: vec![],
        created_at: bundled_timestamp(),
        updated_at: bundled_timestamp(),
    }]
}

/// Hash sets available to every profile.
///
/// The bundled sets start empty; fill them with `hashes import`.
pub fn default_hash_sets() -> Vec<ImageHashSet> {
    vec![ImageHashSet {
        id: DEFAULT_HERO_SET_ID.to_string(),
        description: "Hero portraits".to_string(),
        hashes: vec![],
        created_at: bundled_timestamp(),
        updated_at: bundled_timestamp(),
    }]
}
