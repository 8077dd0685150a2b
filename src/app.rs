//! Application Coordinator
//!
//! Owns the one profile store and the one OCR worker pool of a process and
//! runs recognition requests against stored profiles.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::storage::{self, defaults, FileKeyValueStore, ImageHashSet, ProfileStore, RegionProfile};
use crate::vision::{dhash, surface, OcrEngine, OcrWorkerPool, RecognitionOutput, Recognizer, TesseractEngine};

/// Main application coordinator
pub struct ScoreboardReader {
    store: ProfileStore,
    recognizer: Recognizer,
    default_hash_sets: Vec<ImageHashSet>,
}

impl ScoreboardReader {
    /// Build the file-backed store and the Tesseract worker pool from config
    pub fn new(config: &AppConfig) -> Result<Self> {
        let data_dir = match &config.storage.data_dir {
            Some(dir) => dir.clone(),
            None => storage::get_data_dir()?,
        };
        info!("Using data directory {:?}", data_dir);

        let backend = Arc::new(FileKeyValueStore::new(data_dir)?);
        let engine = Arc::new(TesseractEngine::new(&config.ocr));
        Ok(Self::with_parts(ProfileStore::new(backend), engine, config))
    }

    /// Assemble a coordinator from an existing store and OCR backend
    pub fn with_parts(store: ProfileStore, engine: Arc<dyn OcrEngine>, config: &AppConfig) -> Self {
        let pool = OcrWorkerPool::new(engine, config.ocr.workers);
        Self {
            store,
            recognizer: Recognizer::new(config.recognition.clone(), pool),
            default_hash_sets: defaults::default_hash_sets(),
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Recognize an encoded screenshot with the given (or the active) profile
    pub async fn recognize(&self, bytes: Vec<u8>, profile_id: Option<&str>) -> Result<RecognitionOutput> {
        let profile = self.resolve_profile(profile_id)?;
        info!("Recognizing with profile {} ({} regions)", profile.id, profile.regions.len());

        let output = self
            .recognizer
            .recognize(bytes, &profile.regions, &profile.image_hash_sets, &self.default_hash_sets)
            .await?;
        Ok(output)
    }

    /// Recognize a screenshot file
    pub async fn recognize_file(&self, path: &Path, profile_id: Option<&str>) -> Result<RecognitionOutput> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {:?}", path))?;
        self.recognize(bytes, profile_id).await
    }

    fn resolve_profile(&self, profile_id: Option<&str>) -> Result<RegionProfile> {
        match profile_id {
            Some(id) => self
                .store
                .get_profile(id)?
                .ok_or_else(|| anyhow!("Profile {} does not exist", id)),
            None => self
                .store
                .active_profile()?
                .ok_or_else(|| anyhow!("No active profile; save or import one first")),
        }
    }
}

/// dHash of a whole image file, for building hash sets
pub fn fingerprint_file(path: &Path, size: u32) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
    let pixels = surface::decode(&bytes)?;
    Ok(dhash::hash(&pixels, size))
}
