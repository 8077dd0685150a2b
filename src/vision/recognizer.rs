//! Recognition orchestrator
//!
//! Turns one screenshot plus a profile's regions into a map of recognized
//! values. Image regions are fingerprinted and matched against hash sets;
//! text regions are planned into OCR batches, run on the worker pool and
//! collected before the merged result is returned.

use image::RgbaImage;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::coords;
use super::dhash;
use super::partition::{self, OcrBatch};
use super::pool::{BatchOutcome, JobSegment, OcrJob, OcrWorkerPool};
use super::surface;
use crate::config::RecognitionSettings;
use crate::error::RecognitionError;
use crate::storage::profiles::{ImageHashSet, Region};

/// Recognized value of one region
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegionValue {
    Text { text: String, confidence: f32 },
    Image { name: String, confidence: u8 },
}

/// Stage at which a region failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Cropping or deskewing the region failed
    Extraction,
    /// The region's fingerprint could not be compared with its hash set
    Comparison,
    /// The OCR worker failed
    Recognition,
}

/// A region left out of the result, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionFailure {
    pub region: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Result of one recognition request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecognitionOutput {
    /// Decoded image size
    pub width: u32,
    pub height: u32,
    /// Recognized values by region name
    pub values: BTreeMap<String, RegionValue>,
    pub failures: Vec<RegionFailure>,
}

impl RecognitionOutput {
    fn fail(&mut self, region: &str, kind: FailureKind, reason: impl ToString) {
        let reason = reason.to_string();
        warn!("Region '{}' failed ({:?}): {}", region, kind, reason);
        self.failures.push(RegionFailure {
            region: region.to_string(),
            kind,
            reason,
        });
    }
}

/// Merge bundled and profile hash sets by id; profile sets win
pub fn merge_hash_sets<'a>(
    profile_sets: &'a [ImageHashSet],
    default_sets: &'a [ImageHashSet],
) -> HashMap<&'a str, &'a ImageHashSet> {
    default_sets
        .iter()
        .chain(profile_sets.iter())
        .map(|set| (set.id.as_str(), set))
        .collect()
}

/// Merge OCR replies by region name. A submitted region without any reply
/// (its job was dropped by a dead worker) is reported as a failure.
fn merge_outcomes(submitted: Vec<String>, collected: Vec<BatchOutcome>, output: &mut RecognitionOutput) {
    let mut pending: HashSet<String> = submitted.iter().cloned().collect();

    for outcome in collected {
        for (name, result) in outcome.results {
            pending.remove(&name);
            match result {
                Ok(read) => {
                    output.values.insert(
                        name,
                        RegionValue::Text {
                            text: read.text,
                            confidence: read.confidence,
                        },
                    );
                }
                Err(reason) => output.fail(&name, FailureKind::Recognition, reason),
            }
        }
    }

    for name in submitted.iter().filter(|name| pending.contains(*name)) {
        output.fail(name, FailureKind::Recognition, "worker terminated without a result");
    }
}

/// Runs recognition requests against a shared OCR worker pool
pub struct Recognizer {
    settings: RecognitionSettings,
    pool: OcrWorkerPool,
}

impl Recognizer {
    pub fn new(settings: RecognitionSettings, pool: OcrWorkerPool) -> Self {
        Self { settings, pool }
    }

    /// Recognize every region of a screenshot.
    ///
    /// `regions` are in reference coordinates. Only an undecodable image is
    /// fatal; every per-region problem is reported in `failures`.
    pub async fn recognize(
        &self,
        bytes: Vec<u8>,
        regions: &[Region],
        profile_sets: &[ImageHashSet],
        default_sets: &[ImageHashSet],
    ) -> Result<RecognitionOutput, RecognitionError> {
        let start = Instant::now();
        let image = surface::decode_async(bytes).await?;
        let (width, height) = image.dimensions();

        let regions = coords::denormalise_all(regions, Some(width), Some(height));
        let split = partition::partition_by_method(&regions);
        debug!(
            "Recognizing {}x{} image: {} image regions, {} text regions",
            width,
            height,
            split.image_regions.len(),
            split.text_regions.len()
        );

        let mut output = RecognitionOutput {
            width,
            height,
            ..Default::default()
        };

        let hash_sets = merge_hash_sets(profile_sets, default_sets);
        self.match_images(&image, &split.image_regions, &hash_sets, &mut output);

        if !split.text_regions.is_empty() {
            self.read_text(&image, &split.text_regions, &mut output).await?;
        }

        output.failures.sort_by(|a, b| a.region.cmp(&b.region));
        info!(
            "Recognized {} regions ({} failed) in {:?}",
            output.values.len(),
            output.failures.len(),
            start.elapsed()
        );
        Ok(output)
    }

    fn match_images(
        &self,
        image: &RgbaImage,
        regions: &[Region],
        hash_sets: &HashMap<&str, &ImageHashSet>,
        output: &mut RecognitionOutput,
    ) {
        for region in regions {
            let Some(set_id) = region.image_hash_set_id.as_deref() else {
                continue;
            };
            let Some(set) = hash_sets.get(set_id) else {
                debug!("Region '{}' references unknown hash set {:?}, skipping", region.name, set_id);
                continue;
            };

            let pixels = match surface::crop(image, region) {
                Ok(pixels) => pixels,
                Err(e) => {
                    output.fail(&region.name, FailureKind::Extraction, e);
                    continue;
                }
            };

            let fingerprint = dhash::hash(&pixels, self.settings.hash_size);
            let matched = dhash::best_match_sized(
                &fingerprint,
                &set.hashes,
                self.settings.hash_size,
                self.settings.match_threshold,
            );
            match matched {
                Ok(found) => {
                    debug!(
                        "Region '{}' matched {:?} ({}%)",
                        region.name, found.name, found.confidence
                    );
                    output.values.insert(
                        region.name.clone(),
                        RegionValue::Image {
                            name: found.name,
                            confidence: found.confidence,
                        },
                    );
                }
                Err(e) => output.fail(&region.name, FailureKind::Comparison, e),
            }
        }
    }

    async fn read_text(
        &self,
        image: &RgbaImage,
        regions: &[Region],
        output: &mut RecognitionOutput,
    ) -> Result<(), RecognitionError> {
        let working = surface::enhance(image, &self.settings.enhancement);

        let groups = partition::group_by_char_set(regions);
        let plan = partition::plan_batches(
            partition::partition_groups(groups, self.settings.min_group_size),
            self.settings.shared_batches,
        );
        debug!("Planned {} OCR batches", plan.len());

        let (reply, outcomes) = crossbeam_channel::unbounded::<BatchOutcome>();
        let mut submitted: Vec<String> = Vec::new();

        for batch in plan {
            let segments = self.extract_segments(&working, batch, output);
            if segments.iter().all(|s| s.items.is_empty()) {
                continue;
            }

            let names: Vec<String> = segments
                .iter()
                .flat_map(|s| s.items.iter().map(|(name, _)| name.clone()))
                .collect();

            let job = OcrJob {
                segments,
                reply: reply.clone(),
            };
            match self.pool.submit(job) {
                Ok(()) => submitted.extend(names),
                Err(e) => {
                    for name in names {
                        output.fail(&name, FailureKind::Recognition, format!("{:#}", e));
                    }
                }
            }
        }

        // Every queued job holds a sender; the collector ends once all replied
        drop(reply);
        let collected = tokio::task::spawn_blocking(move || outcomes.iter().collect::<Vec<_>>())
            .await
            .map_err(|e| RecognitionError::Task(e.to_string()))?;

        merge_outcomes(submitted, collected, output);
        Ok(())
    }

    /// Crop (and deskew) every region of a batch from the working image
    fn extract_segments(
        &self,
        working: &RgbaImage,
        batch: OcrBatch,
        output: &mut RecognitionOutput,
    ) -> Vec<JobSegment> {
        batch
            .segments
            .into_iter()
            .map(|group| {
                let mut items = Vec::with_capacity(group.len());
                for region in &group.regions {
                    let pixels = surface::crop(working, region).and_then(|pixels| {
                        if region.is_italic {
                            surface::deskew(&pixels, self.settings.italic_shear_degrees)
                        } else {
                            Ok(pixels)
                        }
                    });
                    match pixels {
                        Ok(pixels) => items.push((region.name.clone(), pixels)),
                        Err(e) => output.fail(&region.name, FailureKind::Extraction, e),
                    }
                }
                JobSegment {
                    char_set: group.char_set,
                    items,
                }
            })
            .collect()
    }
}
