//! Application Configuration
//!
//! Recognition, OCR and storage settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::dhash::DEFAULT_HASH_SIZE;
use crate::vision::partition::DEFAULT_MIN_GROUP_SIZE;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Recognition pipeline settings
    pub recognition: RecognitionSettings,
    /// OCR backend settings
    pub ocr: OcrSettings,
    /// Storage settings
    pub storage: StorageSettings,
}

/// Recognition pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Charset groups with more regions than this get a dedicated OCR batch
    pub min_group_size: usize,
    /// Maximum number of batches small charset groups are packed into
    pub shared_batches: usize,
    /// dHash size (bits = size * size)
    pub hash_size: u32,
    /// Minimum confidence (0.0 - 1.0) for an image region to report a match
    pub match_threshold: f64,
    /// Shear angle applied to italic regions before OCR
    pub italic_shear_degrees: f32,
    /// Filters applied to the working image before OCR
    pub enhancement: EnhancementSettings,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            min_group_size: DEFAULT_MIN_GROUP_SIZE,
            shared_batches: 1,
            hash_size: DEFAULT_HASH_SIZE,
            match_threshold: 0.5,
            italic_shear_degrees: -12.0,
            enhancement: EnhancementSettings::default(),
        }
    }
}

/// Image enhancement applied before OCR
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementSettings {
    /// Apply the filters at all
    pub enabled: bool,
    /// Contrast factor around the midpoint (1.0 = unchanged)
    pub contrast: f32,
    /// Convert to grayscale
    pub grayscale: bool,
    /// Invert colors (light text on dark backgrounds)
    pub invert: bool,
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            contrast: 1.5,
            grayscale: true,
            invert: true,
        }
    }
}

/// OCR backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Path to the tesseract executable (None = look it up on PATH)
    pub tesseract_path: Option<PathBuf>,
    /// Tesseract language code
    pub language: String,
    /// Tesseract page segmentation mode (7 = single text line)
    pub page_segmentation_mode: u8,
    /// Number of OCR worker threads
    pub workers: usize,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            language: "eng".to_string(),
            page_segmentation_mode: 7,
            workers: 2,
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Override for the data directory holding the profile store
    pub data_dir: Option<PathBuf>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
