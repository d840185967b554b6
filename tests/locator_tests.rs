use disc_alignment::config::{MatchMode, MatcherConfig};
use disc_alignment::locator::{locate_in_search_region, LocateParams};
use disc_alignment::roi::{Roi, RoiRole};
use image::{imageops, DynamicImage, GrayImage, Luma};

fn textured(width: u32, height: u32, seed: u32) -> GrayImage {
    let mut state = seed;
    GrayImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        Luma([(state >> 24) as u8])
    })
}

fn params(mode: MatchMode, threshold: i32) -> LocateParams {
    LocateParams {
        mode,
        score_threshold: threshold,
        rot_range_deg: 0,
        scale_min: 1.0,
        scale_max: 1.0,
    }
}

/// Search region (50,50)-(250,250); pattern 50x50 whose top-left sits at
/// (130,130) globally, i.e. at (80,80) inside the search crop.
fn scene() -> (DynamicImage, Roi, Roi) {
    let image = DynamicImage::ImageLuma8(textured(300, 300, 77));
    let search = Roi::rect("search", RoiRole::MasterSearch, 150.0, 150.0, 200.0, 200.0);
    let pattern = Roi::rect("pattern", RoiRole::MasterPattern, 155.0, 155.0, 50.0, 50.0);
    (image, pattern, search)
}

#[test]
fn auto_mode_locates_the_pattern_globally() {
    let (image, pattern, search) = scene();
    let config = MatcherConfig::default();

    let (center, score) = locate_in_search_region(
        &image,
        &pattern,
        &search,
        &params(MatchMode::Auto, 60),
        &config,
        None,
        None,
    )
    .unwrap();

    let (cx, cy) = center.expect("pattern lies inside the search region");
    assert!((cx - 155.0).abs() <= 6.0, "cx {cx}");
    assert!((cy - 155.0).abs() <= 6.0, "cy {cy}");
    assert!(score >= 60);
}

#[test]
fn auto_mode_falls_back_to_template_matching() {
    let (image, pattern, search) = scene();
    // Cripple keypoint detection so the feature strategy aborts and the
    // correlation fallback has to produce the hit.
    let mut config = MatcherConfig::default();
    config.feature.fast_threshold = 255;

    let (center, score) = locate_in_search_region(
        &image,
        &pattern,
        &search,
        &params(MatchMode::Auto, 60),
        &config,
        None,
        None,
    )
    .unwrap();

    let (cx, cy) = center.expect("template fallback must locate the pattern");
    assert!((cx - 155.0).abs() <= 1.0, "cx {cx}");
    assert!((cy - 155.0).abs() <= 1.0, "cy {cy}");
    assert!(score >= 95, "score {score}");
}

#[test]
fn features_mode_does_not_fall_back() {
    let (image, pattern, search) = scene();
    let mut config = MatcherConfig::default();
    config.feature.fast_threshold = 255;

    let (center, score) = locate_in_search_region(
        &image,
        &pattern,
        &search,
        &params(MatchMode::Features, 60),
        &config,
        None,
        None,
    )
    .unwrap();

    assert!(center.is_none());
    assert!(score < 60);
}

#[test]
fn edges_mode_matches_on_edge_maps() {
    let (image, pattern, search) = scene();
    let config = MatcherConfig::default();

    let (center, score) = locate_in_search_region(
        &image,
        &pattern,
        &search,
        &params(MatchMode::Edges, 40),
        &config,
        None,
        None,
    )
    .unwrap();

    let (cx, cy) = center.expect("matching edge maps must correlate");
    assert!((cx - 155.0).abs() <= 3.0, "cx {cx}");
    assert!((cy - 155.0).abs() <= 3.0, "cy {cy}");
    assert!(score >= 40);
}

#[test]
fn pattern_override_skips_region_cropping() {
    let (image, _, search) = scene();
    let config = MatcherConfig::default();

    let gray = image.to_luma8();
    let override_pattern = imageops::crop_imm(&gray, 130, 130, 50, 50).to_image();
    let placeholder = Roi::rect("unused", RoiRole::MasterPattern, 0.0, 0.0, 1.0, 1.0);

    let (center, _score) = locate_in_search_region(
        &image,
        &placeholder,
        &search,
        &params(MatchMode::Auto, 60),
        &config,
        Some(&override_pattern),
        None,
    )
    .unwrap();

    let (cx, cy) = center.expect("override pattern must be located");
    assert!((cx - 155.0).abs() <= 6.0, "cx {cx}");
    assert!((cy - 155.0).abs() <= 6.0, "cy {cy}");
}

#[test]
fn tiny_override_pattern_is_a_no_hit() {
    let (image, _, search) = scene();
    let config = MatcherConfig::default();

    let override_pattern = GrayImage::from_pixel(2, 2, Luma([50]));
    let placeholder = Roi::rect("unused", RoiRole::MasterPattern, 0.0, 0.0, 1.0, 1.0);

    let (center, score) = locate_in_search_region(
        &image,
        &placeholder,
        &search,
        &params(MatchMode::Auto, 60),
        &config,
        Some(&override_pattern),
        None,
    )
    .unwrap();

    assert!(center.is_none());
    assert_eq!(score, 0);
}

#[test]
fn undersized_search_region_is_a_no_hit() {
    let image = DynamicImage::ImageLuma8(textured(100, 100, 5));
    let config = MatcherConfig::default();

    let search = Roi::rect("search", RoiRole::MasterSearch, 50.0, 50.0, 4.0, 4.0);
    let pattern = Roi::rect("pattern", RoiRole::MasterPattern, 50.0, 50.0, 3.0, 3.0);

    let (center, score) = locate_in_search_region(
        &image,
        &pattern,
        &search,
        &params(MatchMode::Auto, 60),
        &config,
        None,
        None,
    )
    .unwrap();

    assert!(center.is_none());
    assert_eq!(score, 0);
}

#[test]
fn undersized_pattern_region_is_a_no_hit() {
    let image = DynamicImage::ImageLuma8(textured(100, 100, 6));
    let config = MatcherConfig::default();

    let search = Roi::rect("search", RoiRole::MasterSearch, 50.0, 50.0, 60.0, 60.0);
    let pattern = Roi::rect("pattern", RoiRole::MasterPattern, 50.0, 50.0, 2.0, 2.0);

    let (center, _score) = locate_in_search_region(
        &image,
        &pattern,
        &search,
        &params(MatchMode::Auto, 60),
        &config,
        None,
        None,
    )
    .unwrap();

    assert!(center.is_none());
}

#[test]
fn both_strategies_failing_reports_the_better_score() {
    // Flat search content defeats both strategies.
    let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 200, Luma([128])));
    let config = MatcherConfig::default();

    let search = Roi::rect("search", RoiRole::MasterSearch, 100.0, 100.0, 150.0, 150.0);
    let pattern = Roi::rect("pattern", RoiRole::MasterPattern, 100.0, 100.0, 40.0, 40.0);

    let (center, score) = locate_in_search_region(
        &image,
        &pattern,
        &search,
        &params(MatchMode::Auto, 60),
        &config,
        None,
        None,
    )
    .unwrap();

    assert!(center.is_none());
    assert!((0..60).contains(&score));
}

#[test]
fn empty_image_is_a_hard_error() {
    let image = DynamicImage::new_luma8(0, 0);
    let config = MatcherConfig::default();
    let search = Roi::rect("search", RoiRole::MasterSearch, 10.0, 10.0, 20.0, 20.0);
    let pattern = Roi::rect("pattern", RoiRole::MasterPattern, 10.0, 10.0, 10.0, 10.0);

    let result = locate_in_search_region(
        &image,
        &pattern,
        &search,
        &params(MatchMode::Auto, 60),
        &config,
        None,
        None,
    );

    assert!(result.is_err());
}

#[test]
fn circle_regions_resolve_to_their_bounding_square() {
    let image = DynamicImage::ImageLuma8(textured(300, 300, 99));
    let config = MatcherConfig::default();

    // Same geometry as the rectangle scene, expressed as circles.
    let search = Roi::circle("search", RoiRole::MasterSearch, 150.0, 150.0, 100.0);
    let pattern = Roi::circle("pattern", RoiRole::MasterPattern, 155.0, 155.0, 25.0);

    let (center, _score) = locate_in_search_region(
        &image,
        &pattern,
        &search,
        &params(MatchMode::Auto, 60),
        &config,
        None,
        None,
    )
    .unwrap();

    let (cx, cy) = center.expect("circle pattern crop must be located");
    assert!((cx - 155.0).abs() <= 6.0, "cx {cx}");
    assert!((cy - 155.0).abs() <= 6.0, "cy {cy}");
}
