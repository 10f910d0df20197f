//! The palette optimizer: a K-means-flavored color quantizer that refines
//! an existing palette against a source image, plus the nearest-color
//! encode/decode pair that uses the result.
//!
//! Distance between two colors is always the plain squared Euclidean
//! distance in RGB space (`dr*dr + dg*dg + db*db`) — not `dr*dr + dg*dg +
//! db + db`, a transposition that would bias every match toward blue.

use core_error::{PipelineError, Result};
use core_format::{Format, Palette};
use core_stats::{sample_random_rgb, Lcg};

/// Index of the palette entry closest to `color` under squared RGB distance.
pub fn nearest_color_index(color: [u8; 3], palette: &[[u8; 3]]) -> usize {
    let mut best = 0;
    let mut best_dist = u32::MAX;
    for (i, c) in palette.iter().enumerate() {
        let dr = color[0] as i32 - c[0] as i32;
        let dg = color[1] as i32 - c[1] as i32;
        let db = color[2] as i32 - c[2] as i32;
        let dist = (dr * dr + dg * dg + db * db) as u32;
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// One E-M step over `pixels`, updating `palette` in place.
///
/// A cluster that received no pixels this round is not left untouched: it
/// is nudged by wrapping `+16` per channel. That's a deliberate carryover
/// of the original algorithm's behavior (an empty cluster "escapes" its
/// position instead of sitting dead forever) rather than a clamp to 255,
/// which would instead wedge an unlucky centroid at the gamut edge.
pub fn optimize_palette_iteration(pixels: &[[u8; 3]], palette: &mut [[u8; 3]]) {
    let k = palette.len();
    if k == 0 || pixels.is_empty() {
        return;
    }
    let mut sums = vec![[0u64; 3]; k];
    let mut nums = vec![0u64; k];

    for &px in pixels {
        let idx = nearest_color_index(px, palette);
        sums[idx][0] += px[0] as u64;
        sums[idx][1] += px[1] as u64;
        sums[idx][2] += px[2] as u64;
        nums[idx] += 1;
    }

    for i in 0..k {
        if nums[i] > 0 {
            palette[i] = [
                (sums[i][0] / nums[i]) as u8,
                (sums[i][1] / nums[i]) as u8,
                (sums[i][2] / nums[i]) as u8,
            ];
        } else {
            log::warn!("palette entry {i} received no pixels this round, shifting by +16 (wrapping)");
            palette[i] = [
                palette[i][0].wrapping_add(16),
                palette[i][1].wrapping_add(16),
                palette[i][2].wrapping_add(16),
            ];
        }
    }
}

/// A single K-means iteration against a source image held as `buf`/`fmt`:
/// draws `num_samples` random pixels (the same LCG sampler stats uses),
/// buckets each into its nearest palette entry, and updates the palette
/// once from the accumulated sums. Callers repeat this externally
/// (`num_iterations >= 1`) until the palette converges; one call is
/// O(num_samples) in the source size, not O(width*height).
pub fn image_optimize_palette(buf: &[u8], fmt: Format, seed: u32, palette: &mut Palette, num_samples: u32) -> Result<()> {
    if palette.colors.is_empty() {
        return Err(PipelineError::invalid_argument("palette has no entries to optimize"));
    }

    let mut rng = Lcg::new(seed);
    let mut sampled = Vec::with_capacity(num_samples as usize);
    for _ in 0..num_samples {
        if let Some(rgb) = sample_random_rgb(buf, fmt, &mut rng) {
            sampled.push(rgb);
        }
    }
    optimize_palette_iteration(&sampled, &mut palette.colors);
    Ok(())
}

/// Encodes one RGB24 pixel to its nearest palette index.
pub fn palette_encode_pixel(color: [u8; 3], palette: &Palette) -> usize {
    nearest_color_index(color, &palette.colors)
}

/// Decodes a palette index back to RGB24. Indices outside the palette's
/// size are an error rather than silently clamped — a stage feeding a bad
/// index is a stage bug worth surfacing.
pub fn palette_decode_index(index: usize, palette: &Palette) -> Result<[u8; 3]> {
    palette
        .colors
        .get(index)
        .copied()
        .ok_or_else(|| PipelineError::invalid_argument(format!("palette index {index} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_color_picks_the_closer_entry() {
        let palette = [[0, 0, 0], [255, 255, 255]];
        assert_eq!(nearest_color_index([10, 10, 10], &palette), 0);
        assert_eq!(nearest_color_index([240, 240, 240], &palette), 1);
    }

    #[test]
    fn distance_is_not_biased_toward_blue() {
        // A color only a single unit off in red should not lose to one
        // two units off in blue under a correct squared-distance metric.
        let palette = [[10, 10, 10], [9, 10, 12]];
        assert_eq!(nearest_color_index([10, 10, 10], &palette), 0);
    }

    #[test]
    fn iteration_moves_centroid_toward_cluster_mean() {
        let pixels = [[0u8, 0, 0], [0, 0, 0], [20, 20, 20]];
        let mut palette = vec![[0u8, 0, 0]];
        optimize_palette_iteration(&pixels, &mut palette);
        // mean of (0,0,0),(0,0,0),(20,20,20) = 6 (integer division)
        assert_eq!(palette[0], [6, 6, 6]);
    }

    #[test]
    fn empty_cluster_wraps_by_sixteen_rather_than_clamping() {
        let pixels = [[0u8, 0, 0]];
        let mut palette = vec![[0u8, 0, 0], [250u8, 250, 250]];
        optimize_palette_iteration(&pixels, &mut palette);
        assert_eq!(palette[1], [10, 10, 10]); // 250 + 16 wraps past 255
    }

    #[test]
    fn decode_rejects_out_of_range_index() {
        let palette = Palette::new(1);
        assert!(palette_decode_index(10, &palette).is_err());
    }

    #[test]
    fn image_optimize_palette_draws_samples_rather_than_scanning_every_pixel() {
        use core_format::PixelFormat;

        let fmt = Format::new(PixelFormat::Rgb24, 4, 4);
        let buf = vec![200u8, 100, 50].repeat(16);
        let mut palette = Palette::new(1);
        palette.colors[0] = [0, 0, 0];

        image_optimize_palette(&buf, fmt, 7, &mut palette, 8).unwrap();
        assert_eq!(palette.colors[0], [200, 100, 50]);
    }
}
