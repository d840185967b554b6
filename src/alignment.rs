//! Alignment propagation: once the two master patterns are located, their
//! displacement relative to the saved baseline defines a similarity
//! transform that repositions every dependent inspection region.

use crate::roi::{Roi, RoiShape};
use serde::{Deserialize, Serialize};

/// A point in full-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImgPoint {
    pub x: f64,
    pub y: f64,
}

impl ImgPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(a: ImgPoint, b: ImgPoint) -> Self {
        Self::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
    }

    fn sub(self, other: ImgPoint) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }

    fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    fn rotated(self, angle_rad: f64) -> Self {
        let (sin_a, cos_a) = angle_rad.sin_cos();
        Self::new(self.x * cos_a - self.y * sin_a, self.x * sin_a + self.y * cos_a)
    }
}

/// The two master centers at baseline time and in the current frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnchorContext {
    pub baseline_m1: Option<ImgPoint>,
    pub baseline_m2: Option<ImgPoint>,
    pub current_m1: ImgPoint,
    pub current_m2: ImgPoint,
}

impl AnchorContext {
    /// Scale and angle delta of the master-to-master vector, when both
    /// baseline anchors are available and the vectors are usable.
    fn similarity(&self) -> Option<(f64, f64, ImgPoint)> {
        let (b1, b2) = (self.baseline_m1?, self.baseline_m2?);
        let base_vec = b2.sub(b1);
        let current_vec = self.current_m2.sub(self.current_m1);

        let base_len = base_vec.norm();
        let current_len = current_vec.norm();
        if base_len <= 1e-6 || current_len == 0.0 {
            return None;
        }

        let scale = current_len / base_len;
        let angle_delta =
            normalize_angle_rad(current_vec.y.atan2(current_vec.x) - base_vec.y.atan2(base_vec.x));
        Some((scale, angle_delta, b1))
    }
}

/// Reposition `target` from the displacement of the two master anchors.
///
/// On the first call (`baseline_target` is `None`) the baseline is captured
/// as a copy of the target's current state before any computation. The
/// primary path rotates and scales the baseline target's offset from
/// master 1 around master 1's current center; when the baseline anchors are
/// missing or degenerate the target falls back to the midpoint of the two
/// current centers with scale 1 and no rotation.
///
/// Mutates `target` in place; the baseline and anchors are never modified.
pub fn reposition_dependent_region(
    target: &mut Roi,
    baseline_target: &mut Option<Roi>,
    anchors: &AnchorContext,
) {
    let baseline = baseline_target.get_or_insert_with(|| target.clone()).clone();

    let (new_center, scale, angle_delta) = match anchors.similarity() {
        Some((scale, angle_delta, baseline_pivot)) => {
            let offset = ImgPoint::new(baseline.cx, baseline.cy).sub(baseline_pivot);
            let rotated = offset.rotated(angle_delta);
            let center = ImgPoint::new(
                anchors.current_m1.x + rotated.x * scale,
                anchors.current_m1.y + rotated.y * scale,
            );
            (center, scale, angle_delta)
        }
        None => (ImgPoint::midpoint(anchors.current_m1, anchors.current_m2), 1.0, 0.0),
    };

    log::debug!(
        "[align] roi={} base_center=({:.3},{:.3}) new_center=({:.3},{:.3}) scale={:.4} ang_delta_deg={:.3}",
        target.display_name(),
        baseline.cx,
        baseline.cy,
        new_center.x,
        new_center.y,
        scale,
        angle_delta.to_degrees(),
    );

    target.cx = new_center.x;
    target.cy = new_center.y;

    match baseline.shape {
        RoiShape::Rect { width, height } => {
            target.shape = RoiShape::Rect {
                width: (width * scale).max(1.0),
                height: (height * scale).max(1.0),
            };
            target.angle_deg = baseline.angle_deg + angle_delta.to_degrees();
        }
        RoiShape::Circle { radius } => {
            target.shape = RoiShape::Circle { radius: (radius * scale).max(1.0) };
            target.angle_deg = baseline.angle_deg;
        }
        RoiShape::Annulus { radius, inner_radius } => {
            let outer = (radius * scale).max(1.0);
            let mut inner = (inner_radius * scale).max(0.0);
            if inner >= outer {
                inner = (outer - 1.0).max(0.0);
            }
            target.shape = RoiShape::Annulus { radius: outer, inner_radius: inner };
            target.angle_deg = baseline.angle_deg;
        }
    }
}

/// Apply the anchor displacement to a batch of inspection regions, each with
/// its saved baseline. Pairs are matched by position.
pub fn place_inspections(targets: &mut [Roi], baselines: &[Roi], anchors: &AnchorContext) {
    for (target, baseline) in targets.iter_mut().zip(baselines.iter()) {
        let mut baseline = Some(baseline.clone());
        reposition_dependent_region(target, &mut baseline, anchors);
    }
}

fn normalize_angle_rad(angle: f64) -> f64 {
    let wrapped = (angle + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI);
    wrapped - std::f64::consts::PI
}
