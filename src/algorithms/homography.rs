//! Planar homography estimation: DLT with Hartley normalization plus a
//! seeded RANSAC wrapper used by the feature matcher for localization.

use crate::config::RansacConfig;
use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Project a point through `h`. Returns `None` on a degenerate weight.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> Option<(f64, f64)> {
    let p = h * Vector3::new(x, y, 1.0);
    let w = p[2];
    if !w.is_finite() || w.abs() < 1e-12 {
        return None;
    }
    let (px, py) = (p[0] / w, p[1] / w);
    if px.is_finite() && py.is_finite() {
        Some((px, py))
    } else {
        None
    }
}

fn reprojection_error(h: &Matrix3<f64>, src: (f64, f64), dst: (f64, f64)) -> f64 {
    match project(h, src.0, src.1) {
        Some((px, py)) => {
            let dx = px - dst.0;
            let dy = py - dst.1;
            (dx * dx + dy * dy).sqrt()
        }
        None => f64::INFINITY,
    }
}

/// Translate the centroid to the origin and scale so the mean distance from
/// it is sqrt(2).
fn normalize_points(points: &[(f64, f64)]) -> (Matrix3<f64>, Vec<(f64, f64)>) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;

    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points.iter().map(|p| (s * (p.0 - cx), s * (p.1 - cy))).collect();
    (t, normalized)
}

/// Direct linear transform from >=4 correspondences, `dst ~ H * src`.
pub fn estimate_homography(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Matrix3<f64>> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = src_n[i];
        let (dx, dy) = dst_n[i];

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // h is the eigenvector of A^T A with the smallest eigenvalue.
    let ata = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(ata);

    let mut min_index = 0;
    let mut min_value = eig.eigenvalues[0].abs();
    for i in 1..9 {
        let value = eig.eigenvalues[i].abs();
        if value < min_value {
            min_value = value;
            min_index = i;
        }
    }

    let h_norm = Matrix3::from_fn(|r, c| eig.eigenvectors[(r * 3 + c, min_index)]);
    let t_dst_inv = t_dst.try_inverse()?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Some(h)
    } else {
        Some(h / scale)
    }
}

#[derive(Debug, Clone)]
pub struct RansacFit {
    pub h: Matrix3<f64>,
    pub inlier_mask: Vec<bool>,
    pub inliers: usize,
}

/// Robust homography fit. Deterministic for a given seed.
pub fn ransac_homography(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    config: &RansacConfig,
) -> Option<RansacFit> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_inliers = 0usize;
    let mut best_mask = vec![false; n];
    let mut best_h: Option<Matrix3<f64>> = None;

    for _ in 0..config.max_iterations {
        let Some(indices) = sample_four_distinct(&mut rng, n) else {
            break;
        };

        let s4: Vec<(f64, f64)> = indices.iter().map(|&i| src[i]).collect();
        let d4: Vec<(f64, f64)> = indices.iter().map(|&i| dst[i]).collect();
        let Some(h) = estimate_homography(&s4, &d4) else {
            continue;
        };

        let mut mask = vec![false; n];
        let mut count = 0usize;
        for i in 0..n {
            if reprojection_error(&h, src[i], dst[i]) < config.inlier_threshold {
                mask[i] = true;
                count += 1;
            }
        }

        if count > best_inliers {
            best_inliers = count;
            best_mask = mask;
            best_h = Some(h);

            if count * 10 > n * 9 {
                break;
            }
        }
    }

    let best_h = best_h?;
    if best_inliers < config.min_inliers.max(4) {
        return None;
    }

    // Refit on the consensus set, then re-evaluate the mask once.
    let inlier_src: Vec<_> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<_> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let h = estimate_homography(&inlier_src, &inlier_dst).unwrap_or(best_h);

    let mut mask = vec![false; n];
    let mut inliers = 0usize;
    for i in 0..n {
        if reprojection_error(&h, src[i], dst[i]) < config.inlier_threshold {
            mask[i] = true;
            inliers += 1;
        }
    }

    Some(RansacFit { h, inlier_mask: mask, inliers })
}

fn sample_four_distinct(rng: &mut StdRng, n: usize) -> Option<[usize; 4]> {
    if n < 4 {
        return None;
    }
    for _ in 0..100 {
        let mut indices = [0usize; 4];
        for slot in &mut indices {
            *slot = rng.gen_range(0..n);
        }
        let distinct = (0..4).all(|i| ((i + 1)..4).all(|j| indices[i] != indices[j]));
        if distinct {
            return Some(indices);
        }
    }
    None
}
