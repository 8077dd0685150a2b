//! Region classification and OCR batch planning
//!
//! Regions are split by recognition method, then text regions are grouped by
//! charset whitelist. Configuring an OCR worker for a whitelist is the
//! expensive step, so every region sharing a whitelist is sent in one batch.
//! Large groups get a batch (and worker) of their own; small groups are packed
//! together onto shared batches instead of each occupying a worker.

use std::collections::BTreeMap;

use crate::storage::profiles::Region;

/// Default threshold above which a charset group is scheduled on its own
pub const DEFAULT_MIN_GROUP_SIZE: usize = 3;

/// Regions split by how they are recognized
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodPartition {
    /// Regions matched against a hash set
    pub image_regions: Vec<Region>,
    /// Regions sent to OCR
    pub text_regions: Vec<Region>,
}

/// Text regions sharing one charset whitelist
#[derive(Debug, Clone, PartialEq)]
pub struct CharSetGroup {
    /// Whitelist, empty for unrestricted
    pub char_set: String,
    pub regions: Vec<Region>,
}

impl CharSetGroup {
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Charset groups split by scheduling class
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupPartition {
    pub large_groups: Vec<CharSetGroup>,
    pub small_groups: Vec<CharSetGroup>,
}

/// One unit of OCR work, processed by a single worker.
///
/// A dedicated batch has one segment; a shared batch has several, and the
/// worker is reconfigured between segments instead of spinning up a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrBatch {
    pub segments: Vec<CharSetGroup>,
    pub shared: bool,
}

impl OcrBatch {
    pub fn region_count(&self) -> usize {
        self.segments.iter().map(CharSetGroup::len).sum()
    }
}

pub fn partition_by_method(regions: &[Region]) -> MethodPartition {
    let (image_regions, text_regions): (Vec<Region>, Vec<Region>) =
        regions.iter().cloned().partition(Region::is_image_region);
    MethodPartition {
        image_regions,
        text_regions,
    }
}

/// Group text regions by whitelist, using `""` for regions without one
pub fn group_by_char_set(regions: &[Region]) -> BTreeMap<String, Vec<Region>> {
    let mut groups: BTreeMap<String, Vec<Region>> = BTreeMap::new();
    for region in regions {
        let key = region.char_set.clone().unwrap_or_default();
        groups.entry(key).or_default().push(region.clone());
    }
    groups
}

/// Split groups into large (`len > min_size`) and small ones
pub fn partition_groups(groups: BTreeMap<String, Vec<Region>>, min_size: usize) -> GroupPartition {
    let mut partition = GroupPartition::default();

    for (char_set, regions) in groups {
        let group = CharSetGroup { char_set, regions };
        if group.len() > min_size {
            partition.large_groups.push(group);
        } else {
            partition.small_groups.push(group);
        }
    }

    partition
}

/// Turn a group partition into OCR batches.
///
/// Each large group becomes one dedicated batch. Small groups are dealt
/// round-robin into at most `shared_batches` shared batches (at least one).
pub fn plan_batches(partition: GroupPartition, shared_batches: usize) -> Vec<OcrBatch> {
    let mut batches: Vec<OcrBatch> = partition
        .large_groups
        .into_iter()
        .filter(|g| !g.is_empty())
        .map(|group| OcrBatch {
            segments: vec![group],
            shared: false,
        })
        .collect();

    let small: Vec<CharSetGroup> = partition.small_groups.into_iter().filter(|g| !g.is_empty()).collect();
    if small.is_empty() {
        return batches;
    }

    let shared_count = shared_batches.max(1).min(small.len());
    let mut shared: Vec<OcrBatch> = (0..shared_count)
        .map(|_| OcrBatch {
            segments: Vec::new(),
            shared: true,
        })
        .collect();

    for (i, group) in small.into_iter().enumerate() {
        shared[i % shared_count].segments.push(group);
    }

    batches.extend(shared);
    batches
}
