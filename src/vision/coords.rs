//! Resolution-independent region coordinates
//!
//! Profiles are authored and stored at a fixed reference resolution. Regions
//! are scaled to the size of the screenshot they are applied to, and scaled
//! back when a profile is saved from a screenshot of another size.

use crate::storage::profiles::Region;

/// Reference canvas width that stored coordinates refer to
pub const REFERENCE_WIDTH: u32 = 2560;
/// Reference canvas height that stored coordinates refer to
pub const REFERENCE_HEIGHT: u32 = 1440;

/// Scale a region from the reference resolution to `target_width` x `target_height`.
///
/// Both dimensions must be given; with only one of them the region is
/// returned unscaled.
pub fn denormalise(region: &Region, target_width: Option<u32>, target_height: Option<u32>) -> Region {
    match (target_width, target_height) {
        (Some(w), Some(h)) => scale(
            region,
            w as f64 / REFERENCE_WIDTH as f64,
            h as f64 / REFERENCE_HEIGHT as f64,
        ),
        _ => region.clone(),
    }
}

/// Scale a region measured on a `source_width` x `source_height` image back to
/// the reference resolution.
pub fn normalise(region: &Region, source_width: Option<u32>, source_height: Option<u32>) -> Region {
    match (source_width, source_height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => scale(
            region,
            REFERENCE_WIDTH as f64 / w as f64,
            REFERENCE_HEIGHT as f64 / h as f64,
        ),
        _ => region.clone(),
    }
}

pub fn denormalise_all(regions: &[Region], target_width: Option<u32>, target_height: Option<u32>) -> Vec<Region> {
    regions
        .iter()
        .map(|r| denormalise(r, target_width, target_height))
        .collect()
}

pub fn normalise_all(regions: &[Region], source_width: Option<u32>, source_height: Option<u32>) -> Vec<Region> {
    regions
        .iter()
        .map(|r| normalise(r, source_width, source_height))
        .collect()
}

fn scale(region: &Region, scale_x: f64, scale_y: f64) -> Region {
    Region {
        x: scale_value(region.x, scale_x),
        y: scale_value(region.y, scale_y),
        width: scale_value(region.width, scale_x),
        height: scale_value(region.height, scale_y),
        ..region.clone()
    }
}

fn scale_value(value: u32, factor: f64) -> u32 {
    (value as f64 * factor).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within_one(a: u32, b: u32) -> bool {
        a.abs_diff(b) <= 1
    }

    #[test]
    fn test_denormalise_reference_to_1080p() {
        let region = Region::new("corner", 2560, 1440, 100, 50);
        let scaled = denormalise(&region, Some(1920), Some(1080));

        assert_eq!(scaled.x, 1920);
        assert_eq!(scaled.y, 1080);
        assert_eq!(scaled.width, 75);
        assert_eq!(scaled.height, 38);
    }

    #[test]
    fn test_non_geometric_fields_pass_through() {
        let region = Region::new("hero", 100, 100, 64, 64)
            .with_char_set("0-9")
            .italic()
            .with_hash_set("heroes");
        let scaled = denormalise(&region, Some(1280), Some(720));

        assert_eq!(scaled.name, "hero");
        assert_eq!(scaled.char_set.as_deref(), Some("0-9"));
        assert!(scaled.is_italic);
        assert_eq!(scaled.image_hash_set_id.as_deref(), Some("heroes"));
        assert_eq!((scaled.x, scaled.width), (50, 32));
    }

    #[test]
    fn test_partial_dimensions_do_not_scale() {
        let region = Region::new("score", 300, 200, 80, 40);

        assert_eq!(denormalise(&region, Some(1920), None), region);
        assert_eq!(denormalise(&region, None, Some(1080)), region);
        assert_eq!(normalise(&region, Some(1920), None), region);
        assert_eq!(normalise(&region, None, None), region);
    }

    #[test]
    fn test_round_trip_within_one_unit() {
        let regions = [
            Region::new("a", 0, 0, 1, 1),
            Region::new("b", 1234, 777, 333, 91),
            Region::new("c", 2559, 1439, 7, 3),
            Region::new("d", 17, 1001, 250, 49),
        ];

        for region in &regions {
            let back = denormalise(&normalise(region, Some(1920), Some(1080)), Some(1920), Some(1080));
            assert!(within_one(back.x, region.x), "{:?} -> {:?}", region, back);
            assert!(within_one(back.y, region.y), "{:?} -> {:?}", region, back);
            assert!(within_one(back.width, region.width), "{:?} -> {:?}", region, back);
            assert!(within_one(back.height, region.height), "{:?} -> {:?}", region, back);

            let forth = normalise(&denormalise(region, Some(1920), Some(1080)), Some(1920), Some(1080));
            assert!(within_one(forth.x, region.x));
            assert!(within_one(forth.height, region.height));
        }
    }

    #[test]
    fn test_batch_helpers_preserve_order() {
        let regions = vec![Region::new("first", 2560, 0, 10, 10), Region::new("second", 0, 1440, 10, 10)];
        let scaled = denormalise_all(&regions, Some(1280), Some(720));

        assert_eq!(scaled[0].name, "first");
        assert_eq!(scaled[0].x, 1280);
        assert_eq!(scaled[1].y, 720);
        assert_eq!(normalise_all(&scaled, Some(1280), Some(720)), regions);
    }
}
