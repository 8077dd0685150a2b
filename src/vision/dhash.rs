//! Perceptual difference hashing (dHash)
//!
//! Portrait icons are identified by comparing a horizontal-gradient
//! fingerprint of the cropped region against known fingerprints. Hashes are
//! hex strings so they can be stored and shared in profile exports.

use image::RgbaImage;
use serde::Serialize;
use tracing::warn;

use crate::error::HashError;
use crate::storage::profiles::ImageHash;
use crate::vision::surface::{self, luminance};

/// Default fingerprint size: 8x8 comparisons, 64 bits, 16 hex digits
pub const DEFAULT_HASH_SIZE: u32 = 8;

/// Best candidate for a fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashMatch {
    /// Name of the best candidate, empty if below the threshold
    pub name: String,
    /// Rescaled similarity, 0 (chance) to 100 (identical)
    pub confidence: u8,
}

impl HashMatch {
    fn none() -> Self {
        Self {
            name: String::new(),
            confidence: 0,
        }
    }

    pub fn is_match(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Number of hex digits a hash of `size` produces
pub fn hex_len(size: u32) -> usize {
    ((size * size) as usize).div_ceil(4)
}

/// Compute the difference hash of a pixel buffer.
///
/// The buffer is resampled to `(size + 1) x size`; every bit records whether
/// a pixel is brighter than its right-hand neighbour. If the buffer cannot be
/// resampled the all-zero fingerprint is returned.
pub fn hash(pixels: &RgbaImage, size: u32) -> String {
    let resampled = match surface::resample(pixels, size + 1, size) {
        Ok(resampled) => resampled,
        Err(e) => {
            warn!("Falling back to zero fingerprint: {}", e);
            return "0".repeat(hex_len(size));
        }
    };

    let mut bits = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let left = luminance(resampled.get_pixel(x, y));
            let right = luminance(resampled.get_pixel(x + 1, y));
            bits.push(left > right);
        }
    }

    pack_hex(&bits)
}

/// Pack bits MSB-first into hex digits, zero-padding the last digit
fn pack_hex(bits: &[bool]) -> String {
    bits.chunks(4)
        .map(|nibble| {
            let value = nibble
                .iter()
                .enumerate()
                .fold(0u32, |acc, (i, &bit)| acc | ((bit as u32) << (3 - i)));
            char::from_digit(value, 16).unwrap_or('0')
        })
        .collect()
}

fn hex_value(digit: char) -> Result<u32, HashError> {
    digit.to_digit(16).ok_or(HashError::InvalidDigit { digit })
}

/// Hamming distance between two equal-length hex hashes
pub fn distance(a: &str, b: &str) -> Result<u32, HashError> {
    if a.len() != b.len() {
        return Err(HashError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    a.chars().zip(b.chars()).try_fold(0u32, |total, (da, db)| {
        Ok(total + (hex_value(da)? ^ hex_value(db)?).count_ones())
    })
}

/// Pick the candidate closest to `target`.
///
/// Similarity is `1 - distance / bits`; confidence rescales 50% similarity
/// (chance level) to 0 and identical hashes to 100. The name is only
/// reported when `confidence / 100 >= threshold`. Ties keep the earliest
/// candidate.
///
/// Every hex digit counts as four bits, which is exact for even hash sizes.
/// Use [`best_match_sized`] when the hash size is known.
pub fn best_match(target: &str, candidates: &[ImageHash], threshold: f64) -> Result<HashMatch, HashError> {
    match_with_bits(target, candidates, target.len() * 4, threshold)
}

/// [`best_match`] for hashes produced with `hash_size`, so the padding bits
/// of odd sizes do not count towards similarity.
pub fn best_match_sized(
    target: &str,
    candidates: &[ImageHash],
    hash_size: u32,
    threshold: f64,
) -> Result<HashMatch, HashError> {
    if !candidates.is_empty() && target.len() != hex_len(hash_size) {
        return Err(HashError::LengthMismatch {
            left: target.len(),
            right: hex_len(hash_size),
        });
    }
    match_with_bits(target, candidates, (hash_size * hash_size) as usize, threshold)
}

fn match_with_bits(
    target: &str,
    candidates: &[ImageHash],
    bits: usize,
    threshold: f64,
) -> Result<HashMatch, HashError> {
    if candidates.is_empty() {
        return Ok(HashMatch::none());
    }
    if target.is_empty() || bits == 0 {
        return Err(HashError::Empty);
    }

    let total_bits = bits as f64;
    let mut best: Option<(&ImageHash, f64)> = None;

    for candidate in candidates {
        let similarity = 1.0 - distance(target, &candidate.hash)? as f64 / total_bits;
        if best.map_or(true, |(_, s)| similarity > s) {
            best = Some((candidate, similarity));
        }
    }

    let Some((candidate, similarity)) = best else {
        return Ok(HashMatch::none());
    };

    let confidence = ((similarity - 0.5).max(0.0) * 200.0).round().clamp(0.0, 100.0) as u8;

    if confidence as f64 / 100.0 >= threshold {
        Ok(HashMatch {
            name: candidate.name.clone(),
            confidence,
        })
    } else {
        Ok(HashMatch {
            name: String::new(),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn candidates(hashes: &[(&str, &str)]) -> Vec<ImageHash> {
        hashes.iter().map(|(n, h)| ImageHash::new(*n, *h)).collect()
    }

    fn horizontal_ramp(descending: bool) -> RgbaImage {
        RgbaImage::from_fn(90, 80, |x, _| {
            let v = if descending { 255 - (x * 2) as u8 } else { (x * 2) as u8 };
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn test_distance_identity_and_symmetry() {
        let pairs = [
            ("0123456789abcdef", "fedcba9876543210"),
            ("ffff0000ffff0000", "0f0f0f0f0f0f0f0f"),
            ("A1B2", "a1b2"),
        ];
        for (a, b) in pairs {
            assert_eq!(distance(a, a).unwrap(), 0);
            assert_eq!(distance(a, b).unwrap(), distance(b, a).unwrap());
        }
        assert_eq!(distance("A1B2", "a1b2").unwrap(), 0);
    }

    #[test]
    fn test_distance_single_digit_flip() {
        assert_eq!(distance("0000000000000000", "000000f000000000").unwrap(), 4);
        assert_eq!(distance("5a", "a5").unwrap(), 8);
    }

    #[test]
    fn test_distance_all_bits() {
        assert_eq!(distance(&"0".repeat(16), &"f".repeat(16)).unwrap(), 64);
    }

    #[test]
    fn test_distance_length_mismatch() {
        assert_eq!(
            distance("abcd", "abcdef"),
            Err(HashError::LengthMismatch { left: 4, right: 6 })
        );
    }

    #[test]
    fn test_distance_invalid_digit() {
        assert_eq!(distance("00g0", "0000"), Err(HashError::InvalidDigit { digit: 'g' }));
    }

    #[test]
    fn test_hash_length_for_sizes() {
        let image = horizontal_ramp(true);
        for size in [2, 4, 8, 16] {
            assert_eq!(hash(&image, size).len(), (size * size / 4) as usize);
        }
        assert_eq!(hash(&image, 3).len(), 3);
    }

    #[test]
    fn test_hash_fallback_on_empty_buffer() {
        let empty = RgbaImage::new(0, 0);
        assert_eq!(hash(&empty, 8), "0".repeat(16));
        assert_eq!(hash(&empty, 16), "0".repeat(64));
    }

    #[test]
    fn test_hash_of_gradients() {
        assert_eq!(hash(&horizontal_ramp(true), 8), "f".repeat(16));
        assert_eq!(hash(&horizontal_ramp(false), 8), "0".repeat(16));

        let flat = RgbaImage::from_pixel(30, 30, Rgba([120, 40, 200, 255]));
        assert_eq!(hash(&flat, 8), "0".repeat(16));
    }

    #[test]
    fn test_pack_hex_msb_first() {
        assert_eq!(pack_hex(&[true, false, false, false]), "8");
        assert_eq!(pack_hex(&[false, false, false, true, true]), "18");
    }

    #[test]
    fn test_match_empty_candidates() {
        let result = best_match("ffffffffffffffff", &[], 0.5).unwrap();
        assert_eq!(result, HashMatch { name: String::new(), confidence: 0 });
    }

    #[test]
    fn test_match_threshold_zero_always_names() {
        let pool = candidates(&[("far", "0000000000000000")]);
        let result = best_match("ffffffffffffffff", &pool, 0.0).unwrap();
        assert_eq!(result.name, "far");
        assert_eq!(result.confidence, 0);
    }

    #[test]
    fn test_match_threshold_one_requires_perfect() {
        let pool = candidates(&[("near", "fffffffffffffffe")]);
        let near = best_match("ffffffffffffffff", &pool, 1.0).unwrap();
        assert!(!near.is_match());
        assert_eq!(near.confidence, 97);

        let exact = best_match("fffffffffffffffe", &pool, 1.0).unwrap();
        assert_eq!(exact, HashMatch { name: "near".to_string(), confidence: 100 });
    }

    #[test]
    fn test_match_picks_closest_and_first_on_tie() {
        let pool = candidates(&[
            ("a", "00000000000000ff"),
            ("b", "000000000000000f"),
            ("c", "000000000000000f"),
        ]);
        let result = best_match("0000000000000000", &pool, 0.0).unwrap();
        assert_eq!(result.name, "b");
        // 4 of 64 bits differ: similarity 0.9375 -> confidence 88
        assert_eq!(result.confidence, 88);
    }

    #[test]
    fn test_match_below_threshold_keeps_confidence() {
        let pool = candidates(&[("half", "00000000ffffffff")]);
        let result = best_match("0000000000000000", &pool, 0.5).unwrap();
        assert_eq!(result.name, "");
        assert_eq!(result.confidence, 0);
    }

    #[test]
    fn test_sized_match_ignores_padding_bits() {
        // Size 3: nine bits in three hex digits, the last digit holds one bit
        let pool = candidates(&[("one-off", "008")]);

        let sized = best_match_sized("000", &pool, 3, 0.0).unwrap();
        // 1 of 9 bits differs: similarity 0.889 -> confidence 78
        assert_eq!(sized.confidence, 78);

        let r#unsized = best_match("000", &pool, 0.0).unwrap();
        assert_eq!(r#unsized.confidence, 83);

        assert_eq!(
            best_match_sized("0000", &pool, 3, 0.0),
            Err(HashError::LengthMismatch { left: 4, right: 3 })
        );
    }

    #[test]
    fn test_sized_match_agrees_for_even_sizes() {
        let pool = candidates(&[("a", "00000000000000ff"), ("b", "000000000000000f")]);
        assert_eq!(
            best_match_sized("0000000000000000", &pool, 8, 0.5).unwrap(),
            best_match("0000000000000000", &pool, 0.5).unwrap()
        );
    }

    #[test]
    fn test_match_propagates_comparison_errors() {
        let pool = candidates(&[("short", "ff")]);
        assert!(matches!(
            best_match("ffff", &pool, 0.0),
            Err(HashError::LengthMismatch { .. })
        ));
    }
}
