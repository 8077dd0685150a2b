//! Versioned profile store
//!
//! All profiles, their hash sets and the active profile id live in one JSON
//! record under [`STORE_KEY`]. The record is loaded lazily, kept in memory,
//! and written back after every mutation.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::defaults;
use super::profiles::{find_duplicate_name, ImageHashSet, ProfileDetails, Region, RegionProfile};
use super::transfer;
use super::KeyValueStore;
use crate::error::StoreError;
use crate::vision::coords;

/// Key of the persisted record
pub const STORE_KEY: &str = "region-profiles";
/// Current layout of [`StoredProfiles`]
pub const SCHEMA_VERSION: u32 = 2;

/// The persisted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProfiles {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub profiles: Vec<RegionProfile>,
    #[serde(default)]
    pub active_profile_id: Option<String>,
}

fn legacy_schema_version() -> u32 {
    1
}

impl Default for StoredProfiles {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            profiles: Vec::new(),
            active_profile_id: None,
        }
    }
}

impl StoredProfiles {
    fn profile(&self, id: &str) -> Option<&RegionProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    fn profile_mut(&mut self, id: &str) -> Option<&mut RegionProfile> {
        self.profiles.iter_mut().find(|p| p.id == id)
    }

    fn active_profile(&self) -> Option<&RegionProfile> {
        self.active_profile_id.as_deref().and_then(|id| self.profile(id))
    }

    /// Point the active id at an existing profile (or nothing when empty).
    /// Returns true when the id changed.
    fn repair_active(&mut self) -> bool {
        let valid = self
            .active_profile_id
            .as_deref()
            .is_some_and(|id| self.profile(id).is_some());
        if valid {
            return false;
        }

        let replacement = self.profiles.first().map(|p| p.id.clone());
        let changed = replacement != self.active_profile_id;
        self.active_profile_id = replacement;
        changed
    }
}

/// Optional identity fields for [`ProfileStore::save`]
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Update this profile (or create it with this id)
    pub id: Option<String>,
    pub description: Option<String>,
}

/// Service object over the persisted record
pub struct ProfileStore {
    backend: Arc<dyn KeyValueStore>,
    defaults: Vec<RegionProfile>,
    state: RwLock<Option<StoredProfiles>>,
}

impl ProfileStore {
    /// Create a store seeded with the bundled default profiles
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_defaults(backend, defaults::default_profiles())
    }

    /// Create a store with a custom set of default profiles
    pub fn with_defaults(backend: Arc<dyn KeyValueStore>, defaults: Vec<RegionProfile>) -> Self {
        Self {
            backend,
            defaults,
            state: RwLock::new(None),
        }
    }

    /// (Re)read the record from the backend, migrating it if needed
    pub fn load(&self) -> Result<(), StoreError> {
        let mut state = self.state.write();
        *state = Some(self.read_backend()?);
        Ok(())
    }

    /// Write the in-memory record to the backend
    pub fn flush(&self) -> Result<(), StoreError> {
        let state = self.state.read();
        if let Some(stored) = state.as_ref() {
            self.persist(stored)?;
        }
        Ok(())
    }

    /// Create or update a profile.
    ///
    /// When both image dimensions are given the regions are converted from
    /// that resolution into reference coordinates first.
    pub fn save(
        &self,
        regions: &[Region],
        options: SaveOptions,
        image_width: Option<u32>,
        image_height: Option<u32>,
    ) -> Result<String, StoreError> {
        if let Some(name) = find_duplicate_name(regions) {
            return Err(StoreError::DuplicateRegionName(name.to_string()));
        }

        let regions = coords::normalise_all(regions, image_width, image_height);
        let id = options.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        self.mutate(|stored| {
            let now = Utc::now();
            match stored.profile_mut(&id) {
                Some(profile) => {
                    profile.regions = regions;
                    if let Some(description) = options.description {
                        profile.description = description;
                    }
                    profile.updated_at = now;
                    info!("Updated profile {} ({} regions)", id, profile.regions.len());
                }
                None => {
                    stored.profiles.push(RegionProfile {
                        id: id.clone(),
                        description: options.description.unwrap_or_default(),
                        regions,
                        image_hash_sets: Vec::new(),
                        created_at: now,
                        updated_at: now,
                    });
                    info!("Created profile {}", id);
                }
            }

            if stored.active_profile_id.is_none() {
                stored.active_profile_id = Some(id.clone());
            }
            Ok(id.clone())
        })
    }

    /// Regions of a profile, scaled to the given resolution when both
    /// dimensions are known
    pub fn get(
        &self,
        id: &str,
        target_width: Option<u32>,
        target_height: Option<u32>,
    ) -> Result<Option<Vec<Region>>, StoreError> {
        self.inspect(|stored| {
            stored
                .profile(id)
                .map(|p| coords::denormalise_all(&p.regions, target_width, target_height))
        })
    }

    /// Full profile record
    pub fn get_profile(&self, id: &str) -> Result<Option<RegionProfile>, StoreError> {
        self.inspect(|stored| stored.profile(id).cloned())
    }

    /// Summaries of every profile, most recently updated first
    pub fn list(&self) -> Result<Vec<ProfileDetails>, StoreError> {
        self.inspect(|stored| {
            let active = stored.active_profile_id.as_deref();
            let mut details: Vec<ProfileDetails> = stored
                .profiles
                .iter()
                .map(|p| ProfileDetails::from_profile(p, active))
                .collect();
            details.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            details
        })
    }

    /// Remove a profile. Returns false when it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.mutate(|stored| {
            if stored.profile(id).is_none() {
                debug!("Profile {} not found, nothing to delete", id);
                return Ok(false);
            }
            stored.profiles.retain(|p| p.id != id);
            if stored.repair_active() {
                info!("Active profile is now {:?}", stored.active_profile_id);
            }
            info!("Deleted profile {}", id);
            Ok(true)
        })
    }

    /// Make a profile active. Unknown ids are ignored with a warning.
    pub fn set_active(&self, id: &str) -> Result<bool, StoreError> {
        self.mutate(|stored| {
            if stored.profile(id).is_none() {
                warn!("Cannot activate unknown profile {}", id);
                return Ok(false);
            }
            stored.active_profile_id = Some(id.to_string());
            info!("Active profile set to {}", id);
            Ok(true)
        })
    }

    /// Regions of the active profile
    pub fn get_active(
        &self,
        target_width: Option<u32>,
        target_height: Option<u32>,
    ) -> Result<Option<Vec<Region>>, StoreError> {
        self.inspect(|stored| {
            stored
                .active_profile()
                .map(|p| coords::denormalise_all(&p.regions, target_width, target_height))
        })
    }

    /// The active profile record
    pub fn active_profile(&self) -> Result<Option<RegionProfile>, StoreError> {
        self.inspect(|stored| stored.active_profile().cloned())
    }

    pub fn active_id(&self) -> Result<Option<String>, StoreError> {
        self.inspect(|stored| stored.active_profile_id.clone())
    }

    /// Export a profile as an envelope JSON string
    pub fn export(&self, id: &str) -> Result<Option<String>, StoreError> {
        match self.get_profile(id)? {
            Some(profile) => Ok(Some(transfer::export_profile(&profile)?)),
            None => Ok(None),
        }
    }

    /// Import an exported profile.
    ///
    /// Returns the new profile count, or `None` when the input was rejected
    /// (the store is left untouched).
    pub fn import(&self, json: &str) -> Result<Option<usize>, StoreError> {
        let mut profile = match transfer::parse_profile(json) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Rejected profile import: {}", e);
                return Ok(None);
            }
        };

        self.mutate(|stored| {
            if stored.profile(&profile.id).is_some() {
                let fresh = Uuid::new_v4().to_string();
                info!("Profile id {} already exists, importing as {}", profile.id, fresh);
                profile.id = fresh;
            }
            info!("Imported profile {} ({} regions)", profile.id, profile.regions.len());

            if stored.active_profile_id.is_none() {
                stored.active_profile_id = Some(profile.id.clone());
            }
            stored.profiles.push(profile);
            Ok(Some(stored.profiles.len()))
        })
    }

    /// Add or replace one of a profile's hash sets
    pub fn save_hash_set(&self, profile_id: &str, set: ImageHashSet) -> Result<(), StoreError> {
        set.validate()
            .map_err(|e| StoreError::InvalidHashSet(format!("{}: {}", set.id, e)))?;

        self.mutate(|stored| {
            let profile = stored
                .profile_mut(profile_id)
                .ok_or_else(|| StoreError::UnknownProfile(profile_id.to_string()))?;
            upsert_hash_set(profile, set);
            Ok(())
        })
    }

    /// Export one of a profile's hash sets as an envelope JSON string
    pub fn export_hash_set(&self, profile_id: &str, set_id: &str) -> Result<Option<String>, StoreError> {
        let set = self.inspect(|stored| {
            stored
                .profile(profile_id)
                .and_then(|p| p.hash_set(set_id))
                .cloned()
        })?;

        match set {
            Some(set) => Ok(Some(transfer::export_hash_set(&set)?)),
            None => Ok(None),
        }
    }

    /// Import an exported hash set into a profile.
    ///
    /// Returns the profile's hash set count, or `None` when the input was
    /// rejected or the profile does not exist.
    pub fn import_hash_set(&self, profile_id: &str, json: &str) -> Result<Option<usize>, StoreError> {
        let set = match transfer::parse_hash_set(json) {
            Ok(set) => set,
            Err(e) => {
                warn!("Rejected hash set import: {}", e);
                return Ok(None);
            }
        };

        self.mutate(|stored| match stored.profile_mut(profile_id) {
            Some(profile) => {
                upsert_hash_set(profile, set);
                Ok(Some(profile.image_hash_sets.len()))
            }
            None => {
                warn!("Cannot import hash set into unknown profile {}", profile_id);
                Ok(None)
            }
        })
    }

    fn inspect<R>(&self, f: impl FnOnce(&StoredProfiles) -> R) -> Result<R, StoreError> {
        {
            let state = self.state.read();
            if let Some(stored) = state.as_ref() {
                return Ok(f(stored));
            }
        }

        let mut state = self.state.write();
        if state.is_none() {
            *state = Some(self.read_backend()?);
        }
        match state.as_ref() {
            Some(stored) => Ok(f(stored)),
            None => Err(StoreError::Backend(anyhow::anyhow!("profile store failed to load"))),
        }
    }

    /// Apply a change to a copy of the record, persist it, then commit it.
    /// The whole change runs under the write lock. A failing change or write
    /// leaves the store as it was, and a change that alters nothing is not
    /// written.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut StoredProfiles) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut state = self.state.write();
        if state.is_none() {
            *state = Some(self.read_backend()?);
        }
        let current = match state.as_mut() {
            Some(stored) => stored,
            None => return Err(StoreError::Backend(anyhow::anyhow!("profile store failed to load"))),
        };

        let mut next = current.clone();
        let result = f(&mut next)?;
        if next != *current {
            self.persist(&next)?;
            *current = next;
        }
        Ok(result)
    }

    fn persist(&self, stored: &StoredProfiles) -> Result<(), StoreError> {
        let json = serde_json::to_string(stored)?;
        self.backend.set(STORE_KEY, &json)?;
        debug!("Persisted {} profiles", stored.profiles.len());
        Ok(())
    }

    /// Read, migrate and complete the record; writes it back when anything
    /// had to be amended
    fn read_backend(&self) -> Result<StoredProfiles, StoreError> {
        let raw = self.backend.get(STORE_KEY)?;

        let (mut stored, version) = match raw {
            None => {
                debug!("No stored profiles, starting fresh");
                (StoredProfiles::default(), 0)
            }
            Some(raw) => match migrate(&raw) {
                Ok(migrated) => migrated,
                Err(reason) => {
                    let backup = format!("{}.corrupt-{}", STORE_KEY, Utc::now().format("%Y%m%dT%H%M%S%3f"));
                    self.backend.set(&backup, &raw)?;
                    error!("Stored profiles are unreadable ({}), kept a copy as {}", reason, backup);
                    (StoredProfiles::default(), 0)
                }
            },
        };
        // Records from a newer release are only rewritten by an actual change
        let newer = version > SCHEMA_VERSION;
        let mut amended = version < SCHEMA_VERSION;

        for default in &self.defaults {
            if stored.profile(&default.id).is_none() {
                debug!("Adding bundled profile {}", default.id);
                stored.profiles.push(default.clone());
                amended = true;
            }
        }

        if stored.repair_active() && !newer {
            amended = true;
        }

        if amended {
            self.persist(&stored)?;
        }
        info!("Loaded {} profiles", stored.profiles.len());
        Ok(stored)
    }
}

fn upsert_hash_set(profile: &mut RegionProfile, mut set: ImageHashSet) {
    let now = Utc::now();
    set.updated_at = now;

    match profile.image_hash_sets.iter_mut().find(|s| s.id == set.id) {
        Some(existing) => {
            set.created_at = existing.created_at;
            *existing = set;
        }
        None => profile.image_hash_sets.push(set),
    }
    profile.updated_at = now;
}

/// Parse a stored record of any known layout.
///
/// Version 1 stored a bare array of profiles; version 2 wraps them with the
/// schema version and active profile id. Returns the record together with
/// the version it was stored under.
fn migrate(raw: &str) -> Result<(StoredProfiles, u32), String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;

    match value {
        Value::Array(_) => {
            let profiles: Vec<RegionProfile> = serde_json::from_value(value).map_err(|e| e.to_string())?;
            info!("Migrating {} profiles from schema version 1", profiles.len());
            Ok((
                StoredProfiles {
                    schema_version: SCHEMA_VERSION,
                    profiles,
                    active_profile_id: None,
                },
                1,
            ))
        }
        Value::Object(_) => {
            let mut stored: StoredProfiles = serde_json::from_value(value).map_err(|e| e.to_string())?;
            let version = stored.schema_version;
            if version > SCHEMA_VERSION {
                warn!(
                    "Stored profiles use newer schema version {}, reading as {}",
                    version, SCHEMA_VERSION
                );
            } else if version < SCHEMA_VERSION {
                info!("Migrating profiles from schema version {}", version);
            }
            stored.schema_version = SCHEMA_VERSION;
            Ok((stored, version))
        }
        _ => Err("expected an object or an array".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::profiles::ImageHash;
    use crate::storage::{FileKeyValueStore, MemoryKeyValueStore};
    use tempfile::tempdir;

    fn empty_store() -> (ProfileStore, Arc<MemoryKeyValueStore>) {
        let backend = Arc::new(MemoryKeyValueStore::new());
        (ProfileStore::with_defaults(backend.clone(), vec![]), backend)
    }

    fn stored_record(backend: &MemoryKeyValueStore) -> StoredProfiles {
        serde_json::from_str(&backend.get(STORE_KEY).unwrap().unwrap()).unwrap()
    }

    fn regions() -> Vec<Region> {
        vec![
            Region::new("kills", 2560, 1440, 100, 50).with_char_set("0-9"),
            Region::new("hero", 0, 0, 128, 128).with_hash_set("heroes"),
        ]
    }

    fn named(id: &str) -> SaveOptions {
        SaveOptions {
            id: Some(id.to_string()),
            description: Some(format!("{} profile", id)),
        }
    }

    fn hash_set(id: &str, hashes: &[(&str, &str)]) -> ImageHashSet {
        ImageHashSet {
            id: id.to_string(),
            description: String::new(),
            hashes: hashes.iter().map(|(n, h)| ImageHash::new(*n, *h)).collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_saved_profile_becomes_active() {
        let (store, _) = empty_store();
        assert_eq!(store.active_id().unwrap(), None);

        let id = store.save(&regions(), SaveOptions::default(), None, None).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(store.active_id().unwrap(), Some(id.clone()));

        store.save(&regions(), named("second"), None, None).unwrap();
        assert_eq!(store.active_id().unwrap(), Some(id));
    }

    #[test]
    fn test_save_normalises_when_dimensions_given() {
        let (store, _) = empty_store();
        let scaled = vec![Region::new("kills", 1920, 1080, 75, 38)];

        store.save(&scaled, named("p"), Some(1920), Some(1080)).unwrap();
        let stored = store.get_profile("p").unwrap().unwrap();
        assert_eq!(stored.regions[0].x, 2560);
        assert_eq!(stored.regions[0].y, 1440);

        // Only one dimension: stored as given
        store.save(&scaled, named("q"), Some(1920), None).unwrap();
        assert_eq!(store.get_profile("q").unwrap().unwrap().regions, scaled);
    }

    #[test]
    fn test_get_denormalises() {
        let (store, _) = empty_store();
        store.save(&regions(), named("p"), None, None).unwrap();

        let scaled = store.get("p", Some(1920), Some(1080)).unwrap().unwrap();
        assert_eq!(
            (scaled[0].x, scaled[0].y, scaled[0].width, scaled[0].height),
            (1920, 1080, 75, 38)
        );

        let raw = store.get("p", None, None).unwrap().unwrap();
        assert_eq!(raw, regions());

        assert_eq!(store.get("missing", None, None).unwrap(), None);
    }

    #[test]
    fn test_duplicate_region_names_are_rejected() {
        let (store, backend) = empty_store();
        let mut dup = regions();
        dup.push(Region::new("kills", 0, 0, 1, 1));

        let result = store.save(&dup, named("p"), None, None);
        assert!(matches!(result, Err(StoreError::DuplicateRegionName(name)) if name == "kills"));
        assert!(backend.get(STORE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_update_keeps_created_at() {
        let (store, _) = empty_store();
        store.save(&regions(), named("p"), None, None).unwrap();
        let before = store.get_profile("p").unwrap().unwrap();

        store
            .save(
                &regions()[..1],
                SaveOptions {
                    id: Some("p".to_string()),
                    description: None,
                },
                None,
                None,
            )
            .unwrap();
        let after = store.get_profile("p").unwrap().unwrap();

        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.description, "p profile");
        assert_eq!(after.regions.len(), 1);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_list_sorted_by_updated_desc() {
        let (store, _) = empty_store();
        store.save(&regions(), named("old"), None, None).unwrap();
        store.save(&regions(), named("new"), None, None).unwrap();
        store.save(&regions(), named("old"), None, None).unwrap();

        let list = store.list().unwrap();
        assert_eq!(list[0].id, "old");
        assert_eq!(list[1].id, "new");
        assert!(list[0].is_active);
        assert!(!list[1].is_active);
        assert_eq!(list[0].region_count, 2);
    }

    #[test]
    fn test_delete_active_reassigns() {
        let (store, _) = empty_store();
        store.save(&regions(), named("a"), None, None).unwrap();
        store.save(&regions(), named("b"), None, None).unwrap();
        assert_eq!(store.active_id().unwrap().as_deref(), Some("a"));

        assert!(store.delete("a").unwrap());
        assert_eq!(store.active_id().unwrap().as_deref(), Some("b"));

        assert!(store.delete("b").unwrap());
        assert_eq!(store.active_id().unwrap(), None);
        assert!(store.list().unwrap().is_empty());

        assert!(!store.delete("b").unwrap());
    }

    #[test]
    fn test_delete_inactive_keeps_active() {
        let (store, _) = empty_store();
        store.save(&regions(), named("a"), None, None).unwrap();
        store.save(&regions(), named("b"), None, None).unwrap();

        store.delete("b").unwrap();
        assert_eq!(store.active_id().unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_set_active_unknown_is_noop() {
        let (store, backend) = empty_store();
        store.save(&regions(), named("a"), None, None).unwrap();
        store.save(&regions(), named("b"), None, None).unwrap();

        let before = backend.get(STORE_KEY).unwrap();
        assert!(!store.set_active("missing").unwrap());
        assert_eq!(store.active_id().unwrap().as_deref(), Some("a"));
        assert_eq!(backend.get(STORE_KEY).unwrap(), before);

        assert!(store.set_active("b").unwrap());
        assert_eq!(store.active_id().unwrap().as_deref(), Some("b"));
        let active = store.get_active(Some(1280), Some(720)).unwrap().unwrap();
        assert_eq!(active[0].x, 1280);
    }

    #[test]
    fn test_export_import_roundtrip_with_fresh_id() {
        let (store, _) = empty_store();
        store.save(&regions(), named("a"), None, None).unwrap();

        let json = store.export("a").unwrap().unwrap();
        assert_eq!(store.import(&json).unwrap(), Some(2));

        let list = store.list().unwrap();
        let imported = list.iter().find(|p| p.id != "a").unwrap();
        assert_eq!(imported.description, "a profile");
        assert_eq!(
            store.get(&imported.id, None, None).unwrap(),
            store.get("a", None, None).unwrap()
        );

        assert_eq!(store.export("missing").unwrap(), None);
    }

    #[test]
    fn test_import_into_empty_store_keeps_id_and_activates() {
        let (source, _) = empty_store();
        source.save(&regions(), named("shared"), None, None).unwrap();
        let json = source.export("shared").unwrap().unwrap();

        let (target, _) = empty_store();
        assert_eq!(target.import(&json).unwrap(), Some(1));
        assert_eq!(target.active_id().unwrap().as_deref(), Some("shared"));
    }

    #[test]
    fn test_wrong_type_import_leaves_store_unchanged() {
        let (store, backend) = empty_store();
        store.save(&regions(), named("a"), None, None).unwrap();
        store.save_hash_set("a", hash_set("heroes", &[("x", "0f0f")])).unwrap();
        let before = backend.get(STORE_KEY).unwrap();

        let hashes_json = store.export_hash_set("a", "heroes").unwrap().unwrap();
        assert_eq!(store.import(&hashes_json).unwrap(), None);
        assert_eq!(store.import("garbage").unwrap(), None);

        assert_eq!(backend.get(STORE_KEY).unwrap(), before);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_hash_set_save_export_import() {
        let (store, _) = empty_store();
        store.save(&regions(), named("a"), None, None).unwrap();
        store.save(&regions(), named("b"), None, None).unwrap();

        store.save_hash_set("a", hash_set("heroes", &[("ana", "00ff")])).unwrap();
        let created = store.get_profile("a").unwrap().unwrap().hash_set("heroes").unwrap().created_at;

        store
            .save_hash_set("a", hash_set("heroes", &[("ana", "00ff"), ("mei", "ff00")]))
            .unwrap();
        let profile = store.get_profile("a").unwrap().unwrap();
        assert_eq!(profile.image_hash_sets.len(), 1);
        assert_eq!(profile.hash_set("heroes").unwrap().hashes.len(), 2);
        assert_eq!(profile.hash_set("heroes").unwrap().created_at, created);

        let json = store.export_hash_set("a", "heroes").unwrap().unwrap();
        assert_eq!(store.import_hash_set("b", &json).unwrap(), Some(1));
        assert_eq!(store.import_hash_set("missing", &json).unwrap(), None);
        assert_eq!(store.export_hash_set("a", "missing").unwrap(), None);

        let profile_json = store.export("a").unwrap().unwrap();
        assert_eq!(store.import_hash_set("b", &profile_json).unwrap(), None);
    }

    #[test]
    fn test_invalid_hash_set_is_rejected() {
        let (store, _) = empty_store();
        store.save(&regions(), named("a"), None, None).unwrap();

        let bad = hash_set("heroes", &[("a", "00ff"), ("b", "0")]);
        assert!(matches!(store.save_hash_set("a", bad), Err(StoreError::InvalidHashSet(_))));

        let good = hash_set("heroes", &[("a", "00ff")]);
        assert!(matches!(
            store.save_hash_set("missing", good),
            Err(StoreError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_defaults_added_on_load_and_persisted() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        let store = ProfileStore::new(backend.clone());

        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, defaults::DEFAULT_PROFILE_ID);
        assert_eq!(store.active_id().unwrap().as_deref(), Some(defaults::DEFAULT_PROFILE_ID));

        let record = stored_record(&backend);
        assert_eq!(record.schema_version, SCHEMA_VERSION);
        assert_eq!(record.profiles.len(), 1);

        // Deleted defaults return on the next load
        store.delete(defaults::DEFAULT_PROFILE_ID).unwrap();
        assert!(store.list().unwrap().is_empty());
        store.load().unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_migrates_version_one_array() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        backend
            .set(
                STORE_KEY,
                r#"[{"id":"legacy","description":"old","regions":[{"name":"kills","x":1,"y":2,"width":3,"height":4}],
                    "createdAt":"2023-05-01T10:00:00Z","updatedAt":"2023-05-02T10:00:00Z"}]"#,
            )
            .unwrap();

        let store = ProfileStore::with_defaults(backend.clone(), vec![]);
        let profile = store.get_profile("legacy").unwrap().unwrap();
        assert!(profile.image_hash_sets.is_empty());
        assert_eq!(store.active_id().unwrap().as_deref(), Some("legacy"));

        let record = stored_record(&backend);
        assert_eq!(record.schema_version, SCHEMA_VERSION);
        assert_eq!(record.active_profile_id.as_deref(), Some("legacy"));
    }

    #[test]
    fn test_migrates_record_without_version_and_repairs_active() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        backend
            .set(
                STORE_KEY,
                r#"{"profiles":[{"id":"p","description":"","regions":[],
                    "createdAt":"2023-05-01T10:00:00Z","updatedAt":"2023-05-01T10:00:00Z"}],
                    "activeProfileId":"gone"}"#,
            )
            .unwrap();

        let store = ProfileStore::with_defaults(backend.clone(), vec![]);
        assert_eq!(store.active_id().unwrap().as_deref(), Some("p"));
        assert_eq!(stored_record(&backend).schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_concurrent_delete_never_leaves_dangling_active() {
        let (store, _) = empty_store();
        store.save(&regions(), named("a"), None, None).unwrap();
        store.save(&regions(), named("b"), None, None).unwrap();

        let active_is_valid = |store: &ProfileStore| {
            store
                .inspect(|s| match &s.active_profile_id {
                    Some(id) => s.profile(id).is_some(),
                    None => true,
                })
                .unwrap()
        };

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    store.delete("b").unwrap();
                    store.save(&regions(), named("b"), None, None).unwrap();
                }
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    store.set_active("b").unwrap();
                    assert!(active_is_valid(&store));
                }
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    store.set_active("a").unwrap();
                    assert!(active_is_valid(&store));
                }
            });
        });

        assert!(active_is_valid(&store));
        assert!(store.active_id().unwrap().is_some());
    }

    #[test]
    fn test_newer_schema_record_is_not_rewritten_on_read() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        let raw = r#"{"schemaVersion":3,"futureField":{"mode":"grid"},
            "profiles":[{"id":"p","description":"","regions":[],"extra":1,
                "createdAt":"2023-05-01T10:00:00Z","updatedAt":"2023-05-01T10:00:00Z"}],
            "activeProfileId":"gone"}"#;
        backend.set(STORE_KEY, raw).unwrap();

        let store = ProfileStore::with_defaults(backend.clone(), vec![]);
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.active_id().unwrap().as_deref(), Some("p"));
        assert!(!store.set_active("missing").unwrap());
        assert_eq!(backend.get(STORE_KEY).unwrap().as_deref(), Some(raw));

        // A real change is written in the current layout
        store.save(&regions(), named("q"), None, None).unwrap();
        assert_eq!(stored_record(&backend).schema_version, SCHEMA_VERSION);
        assert_eq!(stored_record(&backend).profiles.len(), 2);
    }

    #[test]
    fn test_unreadable_record_is_kept_as_backup() {
        let dir = tempdir().unwrap();
        let raw = r#"{"schemaVersion":2,"profiles":[{"id":"p","description":"",
            "regions":[{"name":"kills","x":-1,"y":0,"width":10,"height":10}],
            "createdAt":"2023-05-01T10:00:00Z","updatedAt":"2023-05-01T10:00:00Z"}]}"#;
        std::fs::write(dir.path().join("region-profiles.json"), raw).unwrap();

        let backend = Arc::new(FileKeyValueStore::new(dir.path()).unwrap());
        let store = ProfileStore::with_defaults(backend, vec![]);
        assert!(store.list().unwrap().is_empty());

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| name.starts_with("region-profiles_corrupt-"))
            })
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), raw);
    }

    #[test]
    fn test_unreadable_record_falls_back_to_defaults() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        backend.set(STORE_KEY, "{ not json").unwrap();

        let store = ProfileStore::new(backend.clone());
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(stored_record(&backend).profiles.len(), 1);
    }

    #[test]
    fn test_file_backed_store_survives_restart() {
        let dir = tempdir().unwrap();

        {
            let backend = Arc::new(FileKeyValueStore::new(dir.path()).unwrap());
            let store = ProfileStore::with_defaults(backend, vec![]);
            store.save(&regions(), named("a"), None, None).unwrap();
            store.save(&regions(), named("b"), None, None).unwrap();
            store.set_active("b").unwrap();
        }

        let backend = Arc::new(FileKeyValueStore::new(dir.path()).unwrap());
        let store = ProfileStore::with_defaults(backend, vec![]);
        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(store.active_id().unwrap().as_deref(), Some("b"));
        assert_eq!(store.get("a", None, None).unwrap().unwrap(), regions());
    }

    #[test]
    fn test_flush_writes_loaded_state() {
        let (store, backend) = empty_store();
        store.flush().unwrap();
        assert!(backend.get(STORE_KEY).unwrap().is_none());

        store.load().unwrap();
        backend.set(STORE_KEY, "[]").unwrap();
        store.flush().unwrap();
        assert_eq!(stored_record(&backend), StoredProfiles::default());
    }
}
