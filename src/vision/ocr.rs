//! OCR (Optical Character Recognition) engine boundary
//!
//! The recognition pipeline only needs two things from an OCR backend: a way
//! to create workers, and workers that can be configured with a charset
//! whitelist and then recognize a pixel buffer.

use anyhow::Result;
use image::RgbaImage;
use serde::Serialize;

/// Text recognized in one region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrText {
    /// Recognized text, trimmed
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
}

/// A single OCR worker. Reconfiguring the whitelist is assumed to be costly.
pub trait OcrWorker: Send {
    /// Restrict output to `whitelist` (empty = unrestricted)
    fn configure(&mut self, whitelist: &str) -> Result<()>;

    /// Run OCR on a pixel buffer
    fn recognize(&mut self, image: &RgbaImage) -> Result<OcrText>;
}

/// An OCR backend able to create workers
pub trait OcrEngine: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Create a new, unconfigured worker
    fn spawn_worker(&self) -> Result<Box<dyn OcrWorker>>;
}

/// Expand character ranges like `0-9` or `A-Z` into the literal characters.
///
/// A `-` at the start or end, or between characters that do not form an
/// ascending range, is kept literally. Duplicates are removed, first
/// occurrence wins.
pub fn expand_whitelist(char_set: &str) -> String {
    let chars: Vec<char> = char_set.chars().collect();
    let mut expanded: Vec<char> = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let is_range = i + 2 < chars.len()
            && chars[i + 1] == '-'
            && chars[i].is_ascii_alphanumeric()
            && chars[i + 2].is_ascii_alphanumeric()
            && chars[i] <= chars[i + 2];

        if is_range {
            expanded.extend(chars[i]..=chars[i + 2]);
            i += 3;
        } else {
            expanded.push(chars[i]);
            i += 1;
        }
    }

    let mut seen = std::collections::HashSet::new();
    expanded.into_iter().filter(|c| seen.insert(*c)).collect()
}
