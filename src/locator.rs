//! Match orchestrator: resolves regions to pixel rectangles, crops the
//! grayscale views, dispatches to the matching strategies and translates
//! strategy-local centers back into full-image coordinates.

use crate::algorithms::template_matching::correlation_peak;
use crate::algorithms::{diag, match_by_features, match_template_rotated, DiagSink};
use crate::config::{MatchMode, MatcherConfig};
use crate::preprocessing::{edge_map, to_grayscale};
use crate::roi::{PixelRect, Roi};
use image::{imageops, DynamicImage, GrayImage};

const MIN_SEARCH_SIDE: u32 = 5;
const MIN_PATTERN_SIDE: u32 = 3;

/// Per-invocation localization parameters, usually taken from
/// [`crate::config::AnalyzeConfig`].
#[derive(Debug, Clone, Copy)]
pub struct LocateParams {
    pub mode: MatchMode,
    pub score_threshold: i32,
    pub rot_range_deg: i32,
    pub scale_min: f64,
    pub scale_max: f64,
}

impl From<&crate::config::AnalyzeConfig> for LocateParams {
    fn from(analyze: &crate::config::AnalyzeConfig) -> Self {
        Self {
            mode: analyze.mode,
            score_threshold: analyze.score_threshold,
            rot_range_deg: analyze.rot_range_deg,
            scale_min: analyze.scale_min,
            scale_max: analyze.scale_max,
        }
    }
}

/// Locate `pattern_roi` inside `search_roi` of `image`.
///
/// Returns the located center in full-image coordinates plus the confidence
/// score; `(None, score)` is the normal no-hit outcome. A hard error is only
/// raised when the call cannot execute at all (empty source image).
///
/// `pattern_override` supplies a pre-cropped pattern image and skips the
/// pattern-region crop entirely.
pub fn locate_in_search_region(
    image: &DynamicImage,
    pattern_roi: &Roi,
    search_roi: &Roi,
    params: &LocateParams,
    config: &MatcherConfig,
    pattern_override: Option<&GrayImage>,
    sink: DiagSink<'_>,
) -> crate::Result<(Option<(f64, f64)>, i32)> {
    anyhow::ensure!(
        image.width() > 0 && image.height() > 0,
        "cannot match inside an empty image"
    );

    let search_rect = search_roi.pixel_rect(image.width(), image.height());
    let pattern_rect = match pattern_override {
        Some(override_image) => PixelRect {
            x: 0,
            y: 0,
            width: override_image.width(),
            height: override_image.height(),
        },
        None => pattern_roi.pixel_rect(image.width(), image.height()),
    };

    diag(
        sink,
        format!(
            "[input] mode={:?} thr={} search=({},{},{}x{}) pattern=({},{},{}x{})",
            params.mode,
            params.score_threshold,
            search_rect.x,
            search_rect.y,
            search_rect.width,
            search_rect.height,
            pattern_rect.x,
            pattern_rect.y,
            pattern_rect.width,
            pattern_rect.height,
        ),
    );

    if search_rect.width < MIN_SEARCH_SIDE || search_rect.height < MIN_SEARCH_SIDE {
        diag(sink, "[input] search region too small");
        return Ok((None, 0));
    }

    let full_gray = to_grayscale(image);
    let search_gray = crop(&full_gray, search_rect);

    let pattern_gray = match pattern_override {
        Some(override_image) => {
            if override_image.width() < MIN_PATTERN_SIDE || override_image.height() < MIN_PATTERN_SIDE {
                diag(sink, "[input] pattern override empty or too small");
                return Ok((None, 0));
            }
            override_image.clone()
        }
        None => {
            if pattern_rect.width < MIN_PATTERN_SIDE || pattern_rect.height < MIN_PATTERN_SIDE {
                diag(sink, "[input] pattern region too small");
                return Ok((None, 0));
            }
            crop(&full_gray, pattern_rect)
        }
    };

    if pattern_override.is_none() && search_rect.contains(&pattern_rect) {
        probe_contained_pattern(&full_gray, &search_gray, pattern_rect, search_rect, sink);
    }

    if params.mode == MatchMode::Edges {
        let search_edges = edge_map(&search_gray, config.template.canny_low, config.template.canny_high);
        let pattern_edges = edge_map(&pattern_gray, config.template.canny_low, config.template.canny_high);
        diag(
            sink,
            format!(
                "[edges] nz(search,pattern)=({},{})",
                count_nonzero(&search_edges),
                count_nonzero(&pattern_edges)
            ),
        );

        let tm = match_template_rotated(
            &search_edges,
            &pattern_edges,
            params.rot_range_deg,
            params.scale_min,
            params.scale_max,
            &config.template,
            sink,
        );

        let Some(center) = tm.center.filter(|_| tm.score >= params.score_threshold) else {
            diag(
                sink,
                format!(
                    "[edges] no-hit score={} (<{}) corr={:.3} cause={:?}",
                    tm.score, params.score_threshold, tm.best_correlation, tm.failure
                ),
            );
            return Ok((None, tm.score));
        };

        let global = to_global(center, search_rect);
        diag(
            sink,
            format!(
                "[edges] hit center=({:.1},{:.1}) score={} corr={:.3}",
                global.0, global.1, tm.score, tm.best_correlation
            ),
        );
        return Ok((Some(global), tm.score));
    }

    let feat = match_by_features(&search_gray, &pattern_gray, &config.feature, &config.ransac, sink);

    if params.mode == MatchMode::Auto && (feat.center.is_none() || feat.score < params.score_threshold) {
        diag(
            sink,
            format!(
                "[auto] fallback tm: cause={:?} kps_img={} kps_pat={} good={} inliers={} avg_dist={:.1}",
                feat.failure,
                feat.image_keypoints,
                feat.pattern_keypoints,
                feat.good_matches,
                feat.inliers,
                feat.avg_distance,
            ),
        );

        let tm = match_template_rotated(
            &search_gray,
            &pattern_gray,
            params.rot_range_deg,
            params.scale_min,
            params.scale_max,
            &config.template,
            sink,
        );

        let Some(center) = tm.center.filter(|_| tm.score >= params.score_threshold) else {
            diag(
                sink,
                format!(
                    "[result] no-hit score_feat={} score_tm={} (<{}) cause_feat={:?} cause_tm={:?}",
                    feat.score, tm.score, params.score_threshold, feat.failure, tm.failure
                ),
            );
            return Ok((None, feat.score.max(tm.score)));
        };

        let global = to_global(center, search_rect);
        diag(
            sink,
            format!(
                "[result] hit (tm) center=({:.1},{:.1}) score={} corr={:.3}",
                global.0, global.1, tm.score, tm.best_correlation
            ),
        );
        return Ok((Some(global), tm.score));
    }

    let Some(center) = feat.center.filter(|_| feat.score >= params.score_threshold) else {
        diag(
            sink,
            format!(
                "[result] no-hit score={} (<{}) cause={:?}",
                feat.score, params.score_threshold, feat.failure
            ),
        );
        return Ok((None, feat.score));
    };

    let global = to_global(center, search_rect);
    diag(
        sink,
        format!(
            "[result] hit (features) center=({:.1},{:.1}) score={} inliers={}/{}",
            global.0,
            global.1,
            feat.score,
            feat.inliers,
            feat.good_matches.max(1)
        ),
    );
    Ok((Some(global), feat.score))
}

/// Simple pre-cropped variant: a single unrotated correlation pass of
/// `template` inside `rect`, with the rect clamped to the image. Returns the
/// raw correlation rather than an integer score.
pub fn locate_template_in_rect(
    image: &GrayImage,
    rect: PixelRect,
    template: &GrayImage,
    threshold: f64,
) -> (Option<(f64, f64)>, f64) {
    if image.width() == 0 || image.height() == 0 || template.width() == 0 || template.height() == 0 {
        return (None, 0.0);
    }

    let x = rect.x.min(image.width().saturating_sub(1));
    let y = rect.y.min(image.height().saturating_sub(1));
    let width = rect.width.clamp(1, image.width() - x);
    let height = rect.height.clamp(1, image.height() - y);
    let safe = PixelRect { x, y, width, height };

    let view = crop(image, safe);
    let Some((max_value, (max_x, max_y))) = correlation_peak(&view, template) else {
        return (None, 0.0);
    };

    if max_value < threshold {
        return (None, max_value);
    }

    let center = (
        safe.x as f64 + max_x as f64 + template.width() as f64 / 2.0,
        safe.y as f64 + max_y as f64 + template.height() as f64 / 2.0,
    );
    (Some(center), max_value)
}

fn crop(gray: &GrayImage, rect: PixelRect) -> GrayImage {
    imageops::crop_imm(gray, rect.x, rect.y, rect.width, rect.height).to_image()
}

fn to_global(local: (f64, f64), search_rect: PixelRect) -> (f64, f64) {
    (search_rect.x as f64 + local.0, search_rect.y as f64 + local.1)
}

fn count_nonzero(gray: &GrayImage) -> usize {
    gray.pixels().filter(|p| p[0] != 0).count()
}

/// When the pattern rect lies inside the search rect of the same image, log
/// the ground-truth offset and the 0-degree correlation there. Diagnostics
/// only; never changes the outcome.
fn probe_contained_pattern(
    full_gray: &GrayImage,
    search_gray: &GrayImage,
    pattern_rect: PixelRect,
    search_rect: PixelRect,
    sink: DiagSink<'_>,
) {
    let expected = PixelRect {
        x: pattern_rect.x - search_rect.x,
        y: pattern_rect.y - search_rect.y,
        width: pattern_rect.width,
        height: pattern_rect.height,
    };

    let pattern = crop(full_gray, pattern_rect);
    let expected_patch = crop(search_gray, expected);
    let mad = pattern
        .pixels()
        .zip(expected_patch.pixels())
        .map(|(a, b)| (a[0] as i32 - b[0] as i32).unsigned_abs() as u64)
        .sum::<u64>() as f64
        / (pattern_rect.width * pattern_rect.height) as f64;
    diag(
        sink,
        format!("[dbg] gt offset=({},{}) mad={mad:.4}", expected.x, expected.y),
    );

    if let Some((max_value, (max_x, max_y))) = correlation_peak(search_gray, &pattern) {
        diag(
            sink,
            format!(
                "[dbg] tm@0deg scale=1: max={max_value:.4} loc=({max_x},{max_y}) vs expected=({},{})",
                expected.x, expected.y
            ),
        );
    }
}
