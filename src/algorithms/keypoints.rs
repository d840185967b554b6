use crate::config::FeatureConfig;
use image::GrayImage;
use std::cmp::Ordering;

pub const DESCRIPTOR_BYTES: usize = 32;

/// 256-bit binary descriptor; Hamming distances therefore lie in [0, 256].
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub response: f32,
    /// Dominant orientation in radians, used to steer the descriptor.
    pub angle: f32,
}

/// Keypoints and their descriptors, detected from a single grayscale view.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detect FAST corners, orient them and compute steered binary descriptors.
///
/// Pure: the input buffer is only read. Small images yield an empty set
/// rather than an error; callers decide how to react.
pub fn detect_and_describe(image: &GrayImage, config: &FeatureConfig) -> FeatureSet {
    let (width, height) = image.dimensions();
    if width < 8 || height < 8 {
        return FeatureSet::default();
    }

    let mut corners = detect_corners(image, config.fast_threshold);
    corners = suppress_non_maxima(corners, config.max_keypoints);

    let orientation_radius = (config.patch_size / 2).max(3) as i32;
    for corner in &mut corners {
        corner.angle = orientation_at(image, corner.x as u32, corner.y as u32, orientation_radius);
    }

    let pattern = sampling_pattern(config.patch_size);
    let descriptors = corners
        .iter()
        .map(|corner| describe_keypoint(image, corner, &pattern))
        .collect();

    FeatureSet { keypoints: corners, descriptors }
}

pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

// Bresenham circle of radius 3 used by the segment test.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1), (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1), (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

fn detect_corners(image: &GrayImage, threshold: u8) -> Vec<Keypoint> {
    let (width, height) = image.dimensions();
    let mut corners = Vec::new();

    for y in 3..(height - 3) {
        for x in 3..(width - 3) {
            let center = image.get_pixel(x, y)[0];
            if is_segment_corner(image, x, y, center, threshold) {
                corners.push(Keypoint {
                    x: x as f32,
                    y: y as f32,
                    response: corner_response(image, x, y),
                    angle: 0.0,
                });
            }
        }
    }

    corners
}

/// FAST-9 segment test: 9 contiguous circle pixels all brighter or all
/// darker than the center by the threshold. The circle is walked twice to
/// handle wraparound.
fn is_segment_corner(image: &GrayImage, x: u32, y: u32, center: u8, threshold: u8) -> bool {
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);

    let mut bright_run = 0u32;
    let mut dark_run = 0u32;
    let mut best_bright = 0u32;
    let mut best_dark = 0u32;

    for i in 0..(CIRCLE.len() * 2) {
        let (dx, dy) = CIRCLE[i % CIRCLE.len()];
        let px = (x as i32 + dx) as u32;
        let py = (y as i32 + dy) as u32;
        let value = image.get_pixel(px, py)[0];

        if value > bright {
            bright_run += 1;
            dark_run = 0;
            best_bright = best_bright.max(bright_run);
        } else if value < dark {
            dark_run += 1;
            bright_run = 0;
            best_dark = best_dark.max(dark_run);
        } else {
            bright_run = 0;
            dark_run = 0;
        }
    }

    best_bright >= 9 || best_dark >= 9
}

/// Corner strength from local intensity variance in a 5x5 neighborhood.
fn corner_response(image: &GrayImage, x: u32, y: u32) -> f32 {
    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;
    let mut count = 0u32;

    for dy in -2i32..=2 {
        for dx in -2i32..=2 {
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px >= 0 && py >= 0 && (px as u32) < image.width() && (py as u32) < image.height() {
                let value = image.get_pixel(px as u32, py as u32)[0] as f32;
                sum += value;
                sum_sq += value * value;
                count += 1;
            }
        }
    }

    let mean = sum / count as f32;
    ((sum_sq / count as f32) - mean * mean).max(0.0).sqrt()
}

fn suppress_non_maxima(mut corners: Vec<Keypoint>, max_keypoints: usize) -> Vec<Keypoint> {
    if corners.is_empty() {
        return corners;
    }

    corners.sort_by(|a, b| b.response.partial_cmp(&a.response).unwrap_or(Ordering::Equal));

    let radius_sq = 3.0f32 * 3.0;
    let mut selected: Vec<Keypoint> = Vec::new();
    for corner in corners {
        let crowded = selected.iter().any(|kept| {
            let dx = corner.x - kept.x;
            let dy = corner.y - kept.y;
            dx * dx + dy * dy < radius_sq
        });
        if !crowded {
            selected.push(corner);
            if selected.len() >= max_keypoints {
                break;
            }
        }
    }

    selected
}

/// Intensity-centroid orientation over a circular patch.
fn orientation_at(image: &GrayImage, x: u32, y: u32, radius: i32) -> f32 {
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px >= 0 && py >= 0 && (px as u32) < image.width() && (py as u32) < image.height() {
                let value = image.get_pixel(px as u32, py as u32)[0] as f32;
                m01 += value * dy as f32;
                m10 += value * dx as f32;
            }
        }
    }

    m01.atan2(m10)
}

/// Fixed pseudo-random point-pair pattern for the 256 descriptor tests,
/// confined to the patch. Deterministic so descriptors are comparable
/// across images and runs.
fn sampling_pattern(patch_size: u32) -> Vec<(i8, i8, i8, i8)> {
    let span = patch_size.clamp(9, 31);
    let half = (span / 2) as i8;

    let mut pattern = Vec::with_capacity(256);
    let mut state = 0x9e37u32;
    let mut next = move || {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        ((state >> 8) % span) as i8 - half
    };

    for _ in 0..256 {
        pattern.push((next(), next(), next(), next()));
    }
    pattern
}

fn describe_keypoint(image: &GrayImage, keypoint: &Keypoint, pattern: &[(i8, i8, i8, i8)]) -> Descriptor {
    let mut descriptor = [0u8; DESCRIPTOR_BYTES];
    let (cos_a, sin_a) = (keypoint.angle.cos(), keypoint.angle.sin());
    let cx = keypoint.x as i32;
    let cy = keypoint.y as i32;
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;

    let sample = |dx: i8, dy: i8| -> u8 {
        // Steer the test point by the keypoint orientation.
        let rx = (dx as f32 * cos_a - dy as f32 * sin_a).round() as i32;
        let ry = (dx as f32 * sin_a + dy as f32 * cos_a).round() as i32;
        let px = (cx + rx).clamp(0, max_x) as u32;
        let py = (cy + ry).clamp(0, max_y) as u32;
        image.get_pixel(px, py)[0]
    };

    for (byte_index, tests) in pattern.chunks(8).enumerate() {
        let mut byte = 0u8;
        for (bit, &(x1, y1, x2, y2)) in tests.iter().enumerate() {
            if sample(x1, y1) < sample(x2, y2) {
                byte |= 1 << bit;
            }
        }
        descriptor[byte_index] = byte;
    }

    descriptor
}
