use image::{DynamicImage, GrayImage};
use imageproc::edges::canny;

/// Channel-aware grayscale conversion. The source is never mutated.
///
/// Single-channel inputs are copied through, 3-channel inputs get the
/// standard luma conversion, 4-channel inputs drop alpha during the luma
/// conversion, and anything else falls back to the generic luma path.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image.to_luma8(),
        other => other.to_luma8(),
    }
}

const CLAHE_TILES: u32 = 8;
const CLAHE_CLIP_LIMIT: f64 = 2.0;

/// Contrast-limited adaptive histogram equalization.
///
/// Counteracts low-texture regions before feature detection: per-tile
/// histograms (8x8 grid) are clipped at ~2x the uniform bin height, the
/// excess is redistributed, and per-pixel lookups interpolate bilinearly
/// between the four surrounding tile transfer functions. Returns a new
/// buffer.
pub fn boost_local_contrast(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let nx = CLAHE_TILES.min(width).max(1);
    let ny = CLAHE_TILES.min(height).max(1);
    let tile_w = width.div_ceil(nx);
    let tile_h = height.div_ceil(ny);

    // One 256-entry transfer function per tile.
    let mut luts = vec![[0u8; 256]; (nx * ny) as usize];
    for ty in 0..ny {
        for tx in 0..nx {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }

            let area = ((x1 - x0) * (y1 - y0)) as u32;
            let clip = ((CLAHE_CLIP_LIMIT * area as f64 / 256.0) as u32).max(1);

            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let bonus = excess / 256;
            let mut remainder = excess % 256;
            for bin in hist.iter_mut() {
                *bin += bonus;
                if remainder > 0 {
                    *bin += 1;
                    remainder -= 1;
                }
            }

            let lut = &mut luts[(ty * nx + tx) as usize];
            let mut cdf = 0u64;
            for (value, bin) in hist.iter().enumerate() {
                cdf += *bin as u64;
                lut[value] = ((cdf * 255) / area as u64).min(255) as u8;
            }
        }
    }

    let lut_index = |ix: i64, iy: i64| -> usize {
        let ix = ix.clamp(0, nx as i64 - 1);
        let iy = iy.clamp(0, ny as i64 - 1);
        (iy as u32 * nx + ix as u32) as usize
    };

    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y)[0] as usize;

        let gx = (x as f64 + 0.5) / tile_w as f64 - 0.5;
        let gy = (y as f64 + 0.5) / tile_h as f64 - 0.5;
        let ix = gx.floor() as i64;
        let iy = gy.floor() as i64;
        let wx = gx - ix as f64;
        let wy = gy - iy as f64;

        let v00 = luts[lut_index(ix, iy)][value] as f64;
        let v10 = luts[lut_index(ix + 1, iy)][value] as f64;
        let v01 = luts[lut_index(ix, iy + 1)][value] as f64;
        let v11 = luts[lut_index(ix + 1, iy + 1)][value] as f64;

        let top = v00 * (1.0 - wx) + v10 * wx;
        let bottom = v01 * (1.0 - wx) + v11 * wx;
        image::Luma([(top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8])
    })
}

/// Edge map for the "edges" matching mode.
pub fn edge_map(gray: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(gray, low_threshold, high_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, Rgba};

    #[test]
    fn grayscale_passes_single_channel_through() {
        let gray = GrayImage::from_fn(16, 12, |x, y| Luma([(x * 7 + y * 3) as u8]));
        let out = to_grayscale(&DynamicImage::ImageLuma8(gray.clone()));
        assert_eq!(out, gray);
    }

    #[test]
    fn grayscale_converts_rgb_and_rgba() {
        let rgb = image::RgbImage::from_pixel(8, 8, Rgb([200, 100, 50]));
        let from_rgb = to_grayscale(&DynamicImage::ImageRgb8(rgb));

        let rgba = image::RgbaImage::from_pixel(8, 8, Rgba([200, 100, 50, 10]));
        let from_rgba = to_grayscale(&DynamicImage::ImageRgba8(rgba));

        assert_eq!(from_rgb.dimensions(), (8, 8));
        // Alpha must not influence the luma result.
        assert_eq!(from_rgb.get_pixel(0, 0), from_rgba.get_pixel(0, 0));
    }

    #[test]
    fn clahe_preserves_dimensions() {
        let gray = GrayImage::from_fn(100, 60, |x, y| Luma([((x * x + y) % 251) as u8]));
        let boosted = boost_local_contrast(&gray);
        assert_eq!(boosted.dimensions(), gray.dimensions());
    }

    #[test]
    fn clahe_spreads_a_narrow_histogram() {
        // Low-contrast gradient confined to [100, 120).
        let gray = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 20) as u8]));
        let boosted = boost_local_contrast(&gray);

        let (min_in, max_in) = min_max(&gray);
        let (min_out, max_out) = min_max(&boosted);
        assert!((max_out - min_out) > (max_in - min_in));
    }

    #[test]
    fn clahe_handles_tiny_images() {
        let gray = GrayImage::from_pixel(3, 3, Luma([90]));
        let boosted = boost_local_contrast(&gray);
        assert_eq!(boosted.dimensions(), (3, 3));
    }

    fn min_max(img: &GrayImage) -> (u8, u8) {
        let mut min = u8::MAX;
        let mut max = u8::MIN;
        for p in img.pixels() {
            min = min.min(p[0]);
            max = max.max(p[0]);
        }
        (min, max)
    }
}
