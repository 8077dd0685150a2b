//! Region profile definitions
//!
//! A profile describes where each stat lives on a scoreboard layout. Region
//! coordinates are always stored in the reference resolution
//! (see [`crate::vision::coords`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A rectangular area of the scoreboard holding one stat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    /// Result key, unique within a profile
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Characters the OCR job may emit (`None` = unrestricted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_set: Option<String>,
    /// Text is slanted and must be deskewed before OCR
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_italic: bool,
    /// Match this region against a hash set instead of running OCR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hash_set_id: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Region {
    /// Create an unrestricted text region
    pub fn new(name: impl Into<String>, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            height,
            char_set: None,
            is_italic: false,
            image_hash_set_id: None,
        }
    }

    /// Restrict OCR output to the given characters
    pub fn with_char_set(mut self, char_set: impl Into<String>) -> Self {
        self.char_set = Some(char_set.into());
        self
    }

    /// Mark the region as slanted text
    pub fn italic(mut self) -> Self {
        self.is_italic = true;
        self
    }

    /// Route the region to image matching against a hash set
    pub fn with_hash_set(mut self, hash_set_id: impl Into<String>) -> Self {
        self.image_hash_set_id = Some(hash_set_id.into());
        self
    }

    /// Whether this region is recognized by hash matching
    pub fn is_image_region(&self) -> bool {
        self.image_hash_set_id.is_some()
    }
}

/// Return the first region name that appears more than once
pub fn find_duplicate_name(regions: &[Region]) -> Option<&str> {
    let mut seen = HashSet::new();
    regions
        .iter()
        .map(|r| r.name.as_str())
        .find(|name| !seen.insert(*name))
}

/// A named, persisted set of regions plus the hash sets they reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionProfile {
    pub id: String,
    pub description: String,
    pub regions: Vec<Region>,
    /// Hash sets declared by this profile (override bundled sets with the same id)
    #[serde(default)]
    pub image_hash_sets: Vec<ImageHashSet>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegionProfile {
    /// Look up one of the profile's own hash sets
    pub fn hash_set(&self, id: &str) -> Option<&ImageHashSet> {
        self.image_hash_sets.iter().find(|s| s.id == id)
    }
}

/// One reference image fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHash {
    /// Identifier reported when this hash is the best match
    pub name: String,
    /// Hex-encoded difference hash
    pub hash: String,
}

impl ImageHash {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
        }
    }
}

/// A named collection of fingerprints (e.g. every hero portrait)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHashSet {
    pub id: String,
    pub description: String,
    pub hashes: Vec<ImageHash>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageHashSet {
    /// Check that every hash is hex and all share one length.
    ///
    /// Returns the common bit length (0 for an empty set).
    pub fn validate(&self) -> Result<usize, String> {
        let mut expected_len: Option<usize> = None;

        for entry in &self.hashes {
            if entry.hash.is_empty() {
                return Err(format!("hash for {:?} is empty", entry.name));
            }
            if let Some(bad) = entry.hash.chars().find(|c| !c.is_ascii_hexdigit()) {
                return Err(format!("hash for {:?} contains non-hex digit {:?}", entry.name, bad));
            }
            match expected_len {
                None => expected_len = Some(entry.hash.len()),
                Some(len) if len != entry.hash.len() => {
                    return Err(format!(
                        "hash for {:?} has {} hex digits, expected {}",
                        entry.name,
                        entry.hash.len(),
                        len
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(expected_len.unwrap_or(0) * 4)
    }
}

/// Summary row returned by [`super::ProfileStore::list`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDetails {
    pub id: String,
    pub description: String,
    pub region_count: usize,
    pub hash_set_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

impl ProfileDetails {
    pub fn from_profile(profile: &RegionProfile, active_id: Option<&str>) -> Self {
        Self {
            id: profile.id.clone(),
            description: profile.description.clone(),
            region_count: profile.regions.len(),
            hash_set_count: profile.image_hash_sets.len(),
            created_at: profile.created_at,
            updated_at: profile.updated_at,
            is_active: active_id == Some(profile.id.as_str()),
        }
    }
}
