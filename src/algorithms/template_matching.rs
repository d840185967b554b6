use super::{diag, to_score, DiagSink, MatchFailure};
use crate::config::TemplateConfig;
use image::{GrayImage, Luma};
use ndarray::Array2;
use rayon::prelude::*;

/// Outcome of a rotation/scale-swept template search.
///
/// The center, when present, is in search-image coordinates; the raw best
/// correlation is always carried for diagnostics, even below threshold.
#[derive(Debug, Clone)]
pub struct TemplateReport {
    pub center: Option<(f64, f64)>,
    pub score: i32,
    pub failure: Option<MatchFailure>,
    pub best_correlation: f64,
}

impl TemplateReport {
    fn miss(failure: MatchFailure) -> Self {
        Self { center: None, score: 0, failure: Some(failure), best_correlation: 0.0 }
    }
}

/// Exhaustive zero-mean NCC search over a discretized rotation/scale grid.
///
/// The ladder spans [min(scale_min, scale_max), max(..)] inclusive in
/// `config.scale_steps + 1` values (deduplicated); angles run from
/// `-rot_range_deg` to `+rot_range_deg` in `config.angle_step_deg` steps.
/// Candidates larger than the search image are skipped, not errors.
pub fn match_template_rotated(
    search: &GrayImage,
    pattern: &GrayImage,
    rot_range_deg: i32,
    scale_min: f64,
    scale_max: f64,
    config: &TemplateConfig,
    sink: DiagSink<'_>,
) -> TemplateReport {
    if search.width() == 0 || search.height() == 0 || pattern.width() == 0 || pattern.height() == 0 {
        return TemplateReport::miss(MatchFailure::EmptyInput);
    }

    let mut best = -1.0f64;
    let mut best_point: Option<(f64, f64)> = None;

    let angle_step = config.angle_step_deg.max(1);
    for scale in scale_ladder(scale_min, scale_max, config.scale_steps) {
        let mut angle = -rot_range_deg;
        while angle <= rot_range_deg {
            let rotated = rotate_and_scale(pattern, angle as f64, scale);
            if rotated.width() > search.width() || rotated.height() > search.height() {
                diag(
                    sink,
                    format!(
                        "[tm] skip: pattern({}x{}) > search({}x{}) @angle={angle} scale={scale:.3}",
                        rotated.width(),
                        rotated.height(),
                        search.width(),
                        search.height()
                    ),
                );
                angle += angle_step;
                continue;
            }

            let response = ncc_response(search, &rotated);
            let (max_value, (max_x, max_y)) = response_peak(&response);
            diag(
                sink,
                format!("[tm] angle={angle:>3} scale={scale:.3} max={max_value:.4} loc=({max_x},{max_y})"),
            );

            if max_value as f64 > best {
                best = max_value as f64;
                best_point = Some((
                    max_x as f64 + rotated.width() as f64 / 2.0,
                    max_y as f64 + rotated.height() as f64 / 2.0,
                ));
            }

            angle += angle_step;
        }
    }

    match best_point {
        Some(center) => TemplateReport {
            center: Some(center),
            score: to_score(best),
            failure: None,
            best_correlation: best.max(0.0),
        },
        None => TemplateReport::miss(MatchFailure::NoCorrelation),
    }
}

/// Single-pass zero-mean NCC at scale 1 / angle 0. Used by the simple
/// pre-cropped lookup path.
pub fn correlation_peak(search: &GrayImage, pattern: &GrayImage) -> Option<(f64, (u32, u32))> {
    if pattern.width() > search.width() || pattern.height() > search.height() {
        return None;
    }
    if pattern.width() == 0 || pattern.height() == 0 {
        return None;
    }
    let response = ncc_response(search, pattern);
    let (value, loc) = response_peak(&response);
    Some((value as f64, loc))
}

fn scale_ladder(scale_min: f64, scale_max: f64, steps: usize) -> Vec<f64> {
    let lo = scale_min.min(scale_max);
    let hi = scale_min.max(scale_max);
    let steps = steps.max(1);

    let mut ladder: Vec<f64> = (0..=steps)
        .map(|i| lo + i as f64 * (hi - lo) / steps as f64)
        .collect();
    ladder.dedup();
    ladder
}

/// Rotate by `angle_deg` and scale about the pattern center into a buffer of
/// the same size, sampling bilinearly with reflected (reflect-101) borders so
/// no artificial dark frame appears.
fn rotate_and_scale(pattern: &GrayImage, angle_deg: f64, scale: f64) -> GrayImage {
    let (width, height) = pattern.dimensions();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let theta = angle_deg.to_radians();
    let (sin_t, cos_t) = theta.sin_cos();
    let inv_scale = if scale.abs() < 1e-9 { 0.0 } else { 1.0 / scale };

    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = (cos_t * dx + sin_t * dy) * inv_scale + cx;
        let sy = (-sin_t * dx + cos_t * dy) * inv_scale + cy;
        Luma([sample_reflected(pattern, sx, sy)])
    })
}

fn reflect_coordinate(value: f64, len: u32) -> f64 {
    let max = (len - 1) as f64;
    if max <= 0.0 {
        return 0.0;
    }
    let period = 2.0 * max;
    let folded = value.rem_euclid(period);
    if folded > max {
        period - folded
    } else {
        folded
    }
}

fn sample_reflected(image: &GrayImage, x: f64, y: f64) -> u8 {
    let x = reflect_coordinate(x, image.width());
    let y = reflect_coordinate(y, image.height());

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = image.get_pixel(x0, y0)[0] as f64;
    let p10 = image.get_pixel(x1, y0)[0] as f64;
    let p01 = image.get_pixel(x0, y1)[0] as f64;
    let p11 = image.get_pixel(x1, y1)[0] as f64;

    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

/// Zero-mean normalized cross-correlation response over every placement of
/// `template` inside `search`. Rows are computed in parallel; template
/// statistics are hoisted out of the sliding loop.
fn ncc_response(search: &GrayImage, template: &GrayImage) -> Array2<f32> {
    let (t_width, t_height) = template.dimensions();
    let out_width = (search.width() - t_width + 1) as usize;
    let out_height = (search.height() - t_height + 1) as usize;

    let n = (t_width * t_height) as f32;
    let template_sum: f32 = template.pixels().map(|p| p[0] as f32).sum();
    let template_mean = template_sum / n;
    let template_variance = template
        .pixels()
        .map(|p| {
            let d = p[0] as f32 - template_mean;
            d * d
        })
        .sum::<f32>()
        / n;
    let template_std = template_variance.sqrt();

    if template_std < 1e-6 {
        return Array2::zeros((out_height, out_width));
    }

    let values: Vec<f32> = (0..out_height * out_width)
        .into_par_iter()
        .map(|index| {
            let x = (index % out_width) as u32;
            let y = (index / out_width) as u32;
            ncc_at(search, template, x, y, template_mean, template_std)
        })
        .collect();

    Array2::from_shape_vec((out_height, out_width), values)
        .expect("response buffer matches sweep dimensions")
}

fn ncc_at(
    search: &GrayImage,
    template: &GrayImage,
    offset_x: u32,
    offset_y: u32,
    template_mean: f32,
    template_std: f32,
) -> f32 {
    let (t_width, t_height) = template.dimensions();
    let n = (t_width * t_height) as f32;

    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;
    let mut sum_product = 0.0f32;

    for y in 0..t_height {
        for x in 0..t_width {
            let t = template.get_pixel(x, y)[0] as f32;
            let s = search.get_pixel(x + offset_x, y + offset_y)[0] as f32;
            sum += s;
            sum_sq += s * s;
            sum_product += t * s;
        }
    }

    let mean = sum / n;
    let variance = (sum_sq / n) - mean * mean;
    let std = variance.max(0.0).sqrt();
    if std < 1e-6 {
        return 0.0;
    }

    ((sum_product / n) - template_mean * mean) / (template_std * std)
}

fn response_peak(response: &Array2<f32>) -> (f32, (u32, u32)) {
    let mut best = f32::NEG_INFINITY;
    let mut best_loc = (0u32, 0u32);
    for ((y, x), &value) in response.indexed_iter() {
        if value > best {
            best = value;
            best_loc = (x as u32, y as u32);
        }
    }
    (best, best_loc)
}
