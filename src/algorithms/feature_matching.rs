use super::homography::{project, ransac_homography};
use super::keypoints::{detect_and_describe, hamming_distance, FeatureSet};
use super::{diag, to_score, DiagSink, MatchFailure};
use crate::config::{FeatureConfig, RansacConfig};
use crate::preprocessing::boost_local_contrast;
use image::GrayImage;

/// Highest possible Hamming distance for the 256-bit descriptors; also the
/// normalization constant of the distance score term.
const MAX_DESCRIPTOR_DISTANCE: f64 = 256.0;

/// Outcome of descriptor-based localization, with the counters a caller
/// needs to judge why a match did or did not happen.
#[derive(Debug, Clone)]
pub struct FeatureReport {
    pub center: Option<(f64, f64)>,
    pub score: i32,
    pub failure: Option<MatchFailure>,
    pub image_keypoints: usize,
    pub pattern_keypoints: usize,
    pub good_matches: usize,
    pub inliers: usize,
    pub avg_distance: f64,
}

impl FeatureReport {
    fn miss(failure: MatchFailure) -> Self {
        Self {
            center: None,
            score: 0,
            failure: Some(failure),
            image_keypoints: 0,
            pattern_keypoints: 0,
            good_matches: 0,
            inliers: 0,
            avg_distance: MAX_DESCRIPTOR_DISTANCE,
        }
    }
}

struct KnnMatch {
    pattern_index: usize,
    image_index: usize,
    distance: u32,
    second_distance: u32,
}

/// Locate `pattern` inside `search` by keypoint matching and a robust
/// homography. The caller's buffers are only read; boosted re-detection
/// happens on private copies.
pub fn match_by_features(
    search: &GrayImage,
    pattern: &GrayImage,
    feature_config: &FeatureConfig,
    ransac_config: &RansacConfig,
    sink: DiagSink<'_>,
) -> FeatureReport {
    if search.width() == 0 || search.height() == 0 || pattern.width() == 0 || pattern.height() == 0 {
        diag(sink, "[feature] empty inputs");
        return FeatureReport::miss(MatchFailure::EmptyInput);
    }

    let image_set = detect_with_boost(search, feature_config, "image", sink);
    let pattern_set = detect_with_boost(pattern, feature_config, "pattern", sink);
    diag(
        sink,
        format!("[feature] kps(img,pat)=({},{})", image_set.len(), pattern_set.len()),
    );

    let min_keypoints = feature_config.min_keypoints;
    if image_set.len() < min_keypoints || pattern_set.len() < min_keypoints {
        diag(
            sink,
            format!(
                "[feature] abort: insufficient keypoints img={} pat={}",
                image_set.len(),
                pattern_set.len()
            ),
        );
        return FeatureReport {
            image_keypoints: image_set.len(),
            pattern_keypoints: pattern_set.len(),
            avg_distance: 0.0,
            ..FeatureReport::miss(MatchFailure::InsufficientKeypoints)
        };
    }

    if image_set.descriptors.is_empty()
        || pattern_set.descriptors.is_empty()
        || image_set.descriptors.len() < min_keypoints
        || pattern_set.descriptors.len() < min_keypoints
    {
        diag(sink, "[feature] abort: insufficient descriptors");
        return FeatureReport {
            image_keypoints: image_set.len(),
            pattern_keypoints: pattern_set.len(),
            ..FeatureReport::miss(MatchFailure::InsufficientDescriptors)
        };
    }

    let knn = knn2_matches(&pattern_set, &image_set);
    let (good, used_ratio) = filter_by_ratio_ladder(&knn, feature_config);
    diag(
        sink,
        format!("[feature] good-matches={} ratio={used_ratio:.2}", good.len()),
    );

    if good.len() < feature_config.min_good_matches {
        diag(sink, format!("[feature] abort: too-few-good-matches={}", good.len()));
        return FeatureReport {
            image_keypoints: image_set.len(),
            pattern_keypoints: pattern_set.len(),
            good_matches: good.len(),
            avg_distance: 0.0,
            ..FeatureReport::miss(MatchFailure::TooFewGoodMatches)
        };
    }

    let src: Vec<(f64, f64)> = good
        .iter()
        .map(|m| {
            let kp = &pattern_set.keypoints[m.pattern_index];
            (kp.x as f64, kp.y as f64)
        })
        .collect();
    let dst: Vec<(f64, f64)> = good
        .iter()
        .map(|m| {
            let kp = &image_set.keypoints[m.image_index];
            (kp.x as f64, kp.y as f64)
        })
        .collect();

    let Some(fit) = ransac_homography(&src, &dst, ransac_config) else {
        diag(sink, "[feature] abort: homography-empty");
        return FeatureReport {
            image_keypoints: image_set.len(),
            pattern_keypoints: pattern_set.len(),
            good_matches: good.len(),
            avg_distance: 0.0,
            ..FeatureReport::miss(MatchFailure::HomographyFailed)
        };
    };

    let avg_distance =
        good.iter().map(|m| m.distance as f64).sum::<f64>() / good.len() as f64;
    let score_inliers = to_score(fit.inliers as f64 / good.len().max(1) as f64);
    let score_distance = to_score(1.0 - (avg_distance / MAX_DESCRIPTOR_DISTANCE).clamp(0.0, 1.0));
    let score = (0.7 * score_inliers as f64 + 0.3 * score_distance as f64).round() as i32;

    // In-plane rotation estimate, diagnostics only.
    let rotation_deg = fit.h[(0, 1)].atan2(fit.h[(0, 0)]).to_degrees();

    let width = pattern.width() as f64;
    let height = pattern.height() as f64;
    let corners = [(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)];
    let mut cx = 0.0;
    let mut cy = 0.0;
    for &(x, y) in &corners {
        let Some((px, py)) = project(&fit.h, x, y) else {
            diag(sink, "[feature] abort: degenerate corner projection");
            return FeatureReport {
                image_keypoints: image_set.len(),
                pattern_keypoints: pattern_set.len(),
                good_matches: good.len(),
                inliers: fit.inliers,
                avg_distance,
                ..FeatureReport::miss(MatchFailure::HomographyFailed)
            };
        };
        cx += px;
        cy += py;
    }
    // Centroid of the warped quadrilateral, kept as the located center.
    cx /= corners.len() as f64;
    cy /= corners.len() as f64;

    diag(
        sink,
        format!(
            "[feature] inliers={}/{} avg_dist={avg_distance:.1} score={score} rot~{rotation_deg:.1}deg",
            fit.inliers,
            good.len()
        ),
    );

    FeatureReport {
        center: Some((cx, cy)),
        score,
        failure: None,
        image_keypoints: image_set.len(),
        pattern_keypoints: pattern_set.len(),
        good_matches: good.len(),
        inliers: fit.inliers,
        avg_distance,
    }
}

/// Detect on the original view; small or feature-poor inputs get one retry on
/// a contrast-boosted private copy. Returns a fresh set either way, so the
/// original and boosted passes never alias.
fn detect_with_boost(
    image: &GrayImage,
    config: &FeatureConfig,
    tag: &str,
    sink: DiagSink<'_>,
) -> FeatureSet {
    let set = detect_and_describe(image, config);

    let small = image.width() as u64 * image.height() as u64 <= config.small_image_area as u64;
    if set.len() >= config.boost_keypoint_floor && !small {
        return set;
    }

    let boosted = boost_local_contrast(image);
    let boosted_set = detect_and_describe(&boosted, config);
    diag(sink, format!("[feature] boost {tag} -> kps={}", boosted_set.len()));
    boosted_set
}

/// For each pattern descriptor, its nearest and second-nearest neighbors in
/// the image descriptor set by Hamming distance.
fn knn2_matches(pattern_set: &FeatureSet, image_set: &FeatureSet) -> Vec<KnnMatch> {
    let mut matches = Vec::with_capacity(pattern_set.len());

    for (pattern_index, descriptor) in pattern_set.descriptors.iter().enumerate() {
        let mut best = u32::MAX;
        let mut second = u32::MAX;
        let mut best_index = 0usize;

        for (image_index, candidate) in image_set.descriptors.iter().enumerate() {
            let distance = hamming_distance(descriptor, candidate);
            if distance < best {
                second = best;
                best = distance;
                best_index = image_index;
            } else if distance < second {
                second = distance;
            }
        }

        matches.push(KnnMatch {
            pattern_index,
            image_index: best_index,
            distance: best,
            second_distance: second,
        });
    }

    matches
}

/// Progressive ratio test: thresholds are tried in order and the first one
/// yielding enough matches wins. When none does, the last (loosest) result
/// is kept for the caller's abort check.
fn filter_by_ratio_ladder<'a>(
    matches: &'a [KnnMatch],
    config: &FeatureConfig,
) -> (Vec<&'a KnnMatch>, f64) {
    let mut good: Vec<&KnnMatch> = Vec::new();
    let mut used_ratio = config.ratio_ladder.first().copied().unwrap_or(1.0);

    for &ratio in &config.ratio_ladder {
        let candidates: Vec<&KnnMatch> = matches
            .iter()
            .filter(|m| {
                m.second_distance < u32::MAX
                    && (m.distance as f64) < ratio * (m.second_distance as f64)
            })
            .collect();
        let enough = candidates.len() >= config.min_good_matches;
        good = candidates;
        used_ratio = ratio;
        if enough {
            break;
        }
    }

    (good, used_ratio)
}
