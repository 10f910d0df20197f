//! The statistics sampler: a cheap, seedable random-pixel sample of a frame,
//! folded into a luma histogram and per-channel min/max/average.
//!
//! Sampling rather than scanning every pixel keeps this usable on a
//! microcontroller budget; the generator is a plain 32-bit LCG rather than
//! anything cryptographic, since the only requirement is "spreads samples
//! around the frame", not unpredictability.

use core_config::HISTOGRAM_BUCKETS;
use core_error::{PipelineError, Result};
use core_format::{BayerPhase, Format, PixelFormat};

/// 32-bit linear congruential generator, Numerical-Recipes constants.
#[derive(Debug, Clone, Copy)]
pub struct Lcg(u32);

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self(seed | 1)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.0
    }

    fn next_below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            0
        } else {
            self.next_u32() % bound
        }
    }
}

fn luma_from_rgb(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb;
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

fn decode_rgb565(lo: u8, hi: u8, byte_swapped: bool) -> [u8; 3] {
    let (lo, hi) = if byte_swapped { (hi, lo) } else { (lo, hi) };
    let word = (lo as u16) | ((hi as u16) << 8);
    let r5 = ((word >> 11) & 0x1f) as u8;
    let g6 = ((word >> 5) & 0x3f) as u8;
    let b5 = (word & 0x1f) as u8;
    [
        (r5 << 3) | (r5 >> 2),
        (g6 << 2) | (g6 >> 4),
        (b5 << 3) | (b5 >> 2),
    ]
}

fn decode_yuv(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as i32;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    let r = y + ((359 * v) >> 8);
    let g = y - ((88 * u + 183 * v) >> 8);
    let b = y + ((454 * u) >> 8);
    [r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8]
}

/// Decodes one synthetic RGB sample from `buf` at a random location chosen
/// by `rng`. Returns `None` for formats the sampler doesn't know how to read
/// a representative pixel from (compressed and indexed formats).
pub fn sample_random_rgb(buf: &[u8], fmt: Format, rng: &mut Lcg) -> Option<[u8; 3]> {
    let pitch = fmt.pitch().ok()? as usize;
    let width = fmt.width as usize;
    let height = fmt.height as usize;
    if width == 0 || height == 0 {
        return None;
    }

    match fmt.pixfmt {
        PixelFormat::Rgb24 | PixelFormat::Yuv24 => {
            let x = rng.next_below(fmt.width) as usize;
            let y = rng.next_below(fmt.height) as usize;
            let off = y * pitch + x * 3;
            let px = [buf.get(off)?, buf.get(off + 1)?, buf.get(off + 2)?];
            Some(match fmt.pixfmt {
                PixelFormat::Yuv24 => decode_yuv(*px[0], *px[1], *px[2]),
                _ => [*px[0], *px[1], *px[2]],
            })
        }
        PixelFormat::Rgb565 | PixelFormat::Rgb565x => {
            let x = rng.next_below(fmt.width) as usize;
            let y = rng.next_below(fmt.height) as usize;
            let off = y * pitch + x * 2;
            Some(decode_rgb565(
                *buf.get(off)?,
                *buf.get(off + 1)?,
                fmt.pixfmt == PixelFormat::Rgb565x,
            ))
        }
        PixelFormat::Rgb332 => {
            let x = rng.next_below(fmt.width) as usize;
            let y = rng.next_below(fmt.height) as usize;
            let b = *buf.get(y * pitch + x)?;
            let r3 = (b >> 5) & 0x07;
            let g3 = (b >> 2) & 0x07;
            let b2 = b & 0x03;
            Some([(r3 << 5) | (r3 << 2) | (r3 >> 1), (g3 << 5) | (g3 << 2) | (g3 >> 1), (b2 << 6) | (b2 << 4) | (b2 << 2) | b2])
        }
        PixelFormat::Grey => {
            let x = rng.next_below(fmt.width) as usize;
            let y = rng.next_below(fmt.height) as usize;
            let v = *buf.get(y * pitch + x)?;
            Some([v, v, v])
        }
        PixelFormat::Yuyv => {
            let x = (rng.next_below(fmt.width / 2) as usize) * 2;
            let y = rng.next_below(fmt.height) as usize;
            let off = y * pitch + x * 2;
            let y0 = *buf.get(off)?;
            let u = *buf.get(off + 1)?;
            let y1 = *buf.get(off + 2)?;
            let v = *buf.get(off + 3)?;
            let luma = if rng.next_u32() & 1 == 0 { y0 } else { y1 };
            Some(decode_yuv(luma, u, v))
        }
        PixelFormat::Bayer(phase) => {
            let bw = width.saturating_sub(1).max(1);
            let bh = height.saturating_sub(1).max(1);
            let x = (rng.next_below(bw as u32) as usize) & !1;
            let y = (rng.next_below(bh as u32) as usize) & !1;
            let p00 = *buf.get(y * pitch + x)?;
            let p01 = *buf.get(y * pitch + x + 1)?;
            let p10 = *buf.get((y + 1) * pitch + x)?;
            let p11 = *buf.get((y + 1) * pitch + x + 1)?;
            let (r, g0, g1, b) = match phase {
                BayerPhase::Rggb => (p00, p01, p10, p11),
                BayerPhase::Bggr => (p11, p01, p10, p00),
                BayerPhase::Grbg => (p01, p00, p11, p10),
                BayerPhase::Gbrg => (p10, p00, p11, p01),
            };
            let g = ((g0 as u16 + g1 as u16) / 2) as u8;
            Some([r, g, b])
        }
        PixelFormat::Palette(_) | PixelFormat::Qoi | PixelFormat::Jpeg => None,
    }
}

/// Aggregate statistics gathered from a sampling pass over a frame.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub y_histogram: [u32; HISTOGRAM_BUCKETS],
    /// Representative luma value (bucket midpoint) for each histogram bucket.
    pub y_histogram_vals: [u8; HISTOGRAM_BUCKETS],
    pub y_histogram_total: u32,
    pub rgb_average: [u32; 3],
    pub rgb_min: [u8; 3],
    pub rgb_max: [u8; 3],
    pub nvals: u32,
}

impl Statistics {
    fn empty() -> Self {
        let mut y_histogram_vals = [0u8; HISTOGRAM_BUCKETS];
        let span = 256 / HISTOGRAM_BUCKETS;
        for (i, slot) in y_histogram_vals.iter_mut().enumerate() {
            *slot = (i * span + span / 2) as u8;
        }
        Self {
            y_histogram: [0; HISTOGRAM_BUCKETS],
            y_histogram_vals,
            y_histogram_total: 0,
            rgb_average: [0; 3],
            rgb_min: [255; 3],
            rgb_max: [0; 3],
            nvals: 0,
        }
    }
}

/// Draws `nvals` random samples from `buf` (laid out as `fmt`) seeded by
/// `seed`, and folds them into a [`Statistics`] summary.
pub fn stats_from_buf(buf: &[u8], fmt: Format, seed: u32, nvals: u32) -> Result<Statistics> {
    if fmt.pixfmt.is_palette() || matches!(fmt.pixfmt, PixelFormat::Qoi | PixelFormat::Jpeg) {
        return Err(PipelineError::unsupported(format!(
            "cannot sample statistics from {}",
            fmt.pixfmt.name()
        )));
    }

    let mut rng = Lcg::new(seed);
    let mut stats = Statistics::empty();
    let mut sum = [0u64; 3];

    for _ in 0..nvals {
        let Some(rgb) = sample_random_rgb(buf, fmt, &mut rng) else {
            continue;
        };
        let luma = luma_from_rgb(rgb);
        let bucket = ((luma as usize) * HISTOGRAM_BUCKETS / 256).min(HISTOGRAM_BUCKETS - 1);
        stats.y_histogram[bucket] += 1;
        for c in 0..3 {
            sum[c] += rgb[c] as u64;
            stats.rgb_min[c] = stats.rgb_min[c].min(rgb[c]);
            stats.rgb_max[c] = stats.rgb_max[c].max(rgb[c]);
        }
        stats.nvals += 1;
    }

    stats.y_histogram_total = stats.nvals;
    if stats.nvals > 0 {
        for c in 0..3 {
            stats.rgb_average[c] = (sum[c] / stats.nvals as u64) as u32;
        }
    } else {
        stats.rgb_min = [0; 3];
    }
    Ok(stats)
}
