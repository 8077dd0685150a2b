//! Export / import envelopes
//!
//! Profiles and hash sets leave the store wrapped in
//! `{type, schemaVersion, payload, exportedAt}`. Imports are validated
//! completely before the store is touched.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::profile_store::SCHEMA_VERSION;
use super::profiles::{find_duplicate_name, ImageHashSet, RegionProfile};
use crate::error::ImportError;

/// Type tag of an exported region profile
pub const PROFILE_EXPORT_TYPE: &str = "region-profile";
/// Type tag of an exported hash set
pub const HASHES_EXPORT_TYPE: &str = "image-hashes";

/// Wrapper written by every export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub schema_version: u32,
    pub payload: T,
    pub exported_at: DateTime<Utc>,
}

impl<T> ExportEnvelope<T> {
    fn new(kind: &str, payload: T) -> Self {
        Self {
            kind: kind.to_string(),
            schema_version: SCHEMA_VERSION,
            payload,
            exported_at: Utc::now(),
        }
    }
}

/// Serialize a profile as a `region-profile` envelope
pub fn export_profile(profile: &RegionProfile) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ExportEnvelope::new(PROFILE_EXPORT_TYPE, profile))
}

/// Serialize a hash set as an `image-hashes` envelope
pub fn export_hash_set(set: &ImageHashSet) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ExportEnvelope::new(HASHES_EXPORT_TYPE, set))
}

/// Parse and validate an exported profile
pub fn parse_profile(json: &str) -> Result<RegionProfile, ImportError> {
    let profile: RegionProfile = unwrap_envelope(json, PROFILE_EXPORT_TYPE)?;

    if profile.id.trim().is_empty() {
        return Err(ImportError::Invalid("profile id is empty".to_string()));
    }
    if let Some(name) = find_duplicate_name(&profile.regions) {
        return Err(ImportError::Invalid(format!("region name {:?} is used more than once", name)));
    }
    if let Some(region) = profile.regions.iter().find(|r| r.width == 0 || r.height == 0) {
        return Err(ImportError::Invalid(format!("region {:?} has zero area", region.name)));
    }
    for set in &profile.image_hash_sets {
        set.validate()
            .map_err(|e| ImportError::Invalid(format!("hash set {:?}: {}", set.id, e)))?;
    }

    Ok(profile)
}

/// Parse and validate an exported hash set
pub fn parse_hash_set(json: &str) -> Result<ImageHashSet, ImportError> {
    let set: ImageHashSet = unwrap_envelope(json, HASHES_EXPORT_TYPE)?;

    if set.id.trim().is_empty() {
        return Err(ImportError::Invalid("hash set id is empty".to_string()));
    }
    set.validate()
        .map_err(|e| ImportError::Invalid(format!("hash set {:?}: {}", set.id, e)))?;

    Ok(set)
}

fn unwrap_envelope<T: DeserializeOwned>(json: &str, expected_type: &str) -> Result<T, ImportError> {
    let value: Value = serde_json::from_str(json).map_err(|e| ImportError::NotJson(e.to_string()))?;
    let Value::Object(mut envelope) = value else {
        return Err(ImportError::NotAnObject);
    };

    let kind = envelope
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ImportError::MissingField("type"))?;
    if kind != expected_type {
        return Err(ImportError::WrongType {
            expected: expected_type.to_string(),
            found: kind.to_string(),
        });
    }

    match envelope.get("schemaVersion").and_then(Value::as_u64) {
        Some(version) if version == u64::from(SCHEMA_VERSION) => {}
        Some(version) => warn!(
            "Importing {} exported with schema version {} (current is {})",
            expected_type, version, SCHEMA_VERSION
        ),
        None => warn!("Importing {} without a schema version", expected_type),
    }

    let payload = envelope.remove("payload").ok_or(ImportError::MissingField("payload"))?;
    serde_json::from_value(payload).map_err(|e| ImportError::Malformed(e.to_string()))
}
