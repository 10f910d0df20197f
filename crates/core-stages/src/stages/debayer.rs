//! Bayer demosaic: a cheap 2x2 block-replicate stage ([`Debayer1x1Stage`])
//! and a proper bilinear interpolation stage ([`Debayer3x3Stage`]) that
//! trades a three-line window for noticeably less color fringing.

use core_error::{PipelineError, Result};
use core_format::{BayerPhase, Format, PixelFormat};
use core_hostport::HostPort;
use core_op::{input_done, input_lines, output_done, output_flush, output_line, OpBase, OpKind, Operation};
use core_ring::Ring;

fn bayer_phase_of(fmt: Format) -> Result<BayerPhase> {
    match fmt.pixfmt {
        PixelFormat::Bayer(phase) => Ok(phase),
        _ => Err(PipelineError::unsupported("debayer requires a Bayer input format").at_stage("debayer")),
    }
}

/// Block-replicate debayer: every 2x2 Bayer tile becomes a single flat
/// RGB24 color repeated across all four output pixels. No interpolation
/// across tile boundaries, hence "1x1" — the cheapest option the engine
/// offers.
pub struct Debayer1x1Stage {
    base: OpBase,
    phase: BayerPhase,
}

impl Debayer1x1Stage {
    pub fn new(fmt: Format, input: usize) -> Result<Self> {
        let phase = bayer_phase_of(fmt)?;
        Ok(Self { base: OpBase::new(OpKind::Debayer1x1, fmt, input), phase })
    }

    pub fn output_format(&self) -> Format {
        Format::new(PixelFormat::Rgb24, self.base.fmt.width, self.base.fmt.height)
    }
}

impl Operation for Debayer1x1Stage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let pitch = self.base.fmt.pitch()? as usize;
        let width = self.base.fmt.width as usize;
        let out_pitch = width * 3;
        output_line(output, out_pitch * 2)?;

        let rows = input_lines(input, pitch, 2)?;
        let (row0, row1) = rows.split_at(pitch);

        let mut out0 = vec![0u8; out_pitch];
        let mut out1 = vec![0u8; out_pitch];
        let mut x = 0;
        while x + 1 < width {
            let p00 = row0[x];
            let p01 = row0[x + 1];
            let p10 = row1[x];
            let p11 = row1[x + 1];
            let (r, g0, g1, b) = match self.phase {
                BayerPhase::Rggb => (p00, p01, p10, p11),
                BayerPhase::Bggr => (p11, p01, p10, p00),
                BayerPhase::Grbg => (p01, p00, p11, p10),
                BayerPhase::Gbrg => (p10, p00, p11, p01),
            };
            let g = ((g0 as u16 + g1 as u16) / 2) as u8;
            let rgb = [r, g, b];
            for dst in [&mut out0, &mut out1] {
                dst[x * 3..x * 3 + 3].copy_from_slice(&rgb);
                dst[(x + 1) * 3..(x + 1) * 3 + 3].copy_from_slice(&rgb);
            }
            x += 2;
        }

        input_done(input, pitch * 2);
        output_flush(output, &out0);
        output_flush(output, &out1);
        output_done(&mut self.base, 2, (out_pitch * 2) as u64);
        self.base.lines_in += 2;
        self.base.bytes_in += (pitch * 2) as u64;
        self.base.line_offset += 2;
        Ok(())
    }
}

fn channel_table(phase: BayerPhase) -> [[u8; 2]; 2] {
    // 0 = R, 1 = G, 2 = B
    match phase {
        BayerPhase::Rggb => [[0, 1], [1, 2]],
        BayerPhase::Bggr => [[2, 1], [1, 0]],
        BayerPhase::Grbg => [[1, 0], [2, 1]],
        BayerPhase::Gbrg => [[1, 2], [0, 1]],
    }
}

/// Averages the two horizontal neighbors of `x` in `row`, falling back to
/// whichever single neighbor exists at a frame edge instead of blending in
/// a clamped duplicate of `x` itself — a column one step past the edge
/// genuinely doesn't exist, so it contributes nothing rather than being
/// stood in for by the wrong-channel pixel at `x`.
fn avg_horizontal(row: &[u8], x: usize, width: usize) -> u8 {
    let left = x.checked_sub(1).map(|i| row[i]);
    let right = if x + 1 < width { Some(row[x + 1]) } else { None };
    match (left, right) {
        (Some(l), Some(r)) => ((l as u16 + r as u16) / 2) as u8,
        (Some(v), None) | (None, Some(v)) => v,
        (None, None) => row[x],
    }
}

/// Averages the (up to four) diagonal neighbors of `x` across `prev_row`
/// and `next_row`, dropping a column that falls off either edge rather
/// than padding it with a clamped duplicate.
fn avg_diagonal(prev_row: &[u8], next_row: &[u8], x: usize, width: usize) -> u8 {
    let mut sum = 0u32;
    let mut n = 0u32;
    if x > 0 {
        sum += prev_row[x - 1] as u32 + next_row[x - 1] as u32;
        n += 2;
    }
    if x + 1 < width {
        sum += prev_row[x + 1] as u32 + next_row[x + 1] as u32;
        n += 2;
    }
    if n == 0 {
        return prev_row[x];
    }
    (sum / n) as u8
}

/// `prev_row`/`next_row` must already account for the top/bottom edge
/// substitution (see [`Debayer3x3Stage::step`]) — by the time they reach
/// here both are genuine rows one step away from `cur`, never `cur` itself
/// unless the frame is only one line tall.
fn interpolate_pixel(prev_row: &[u8], cur: &[u8], next_row: &[u8], phase: BayerPhase, width: usize, x: usize, y: u32) -> [u8; 3] {
    let table = channel_table(phase);
    let ry = (y % 2) as usize;
    let rx = x % 2;
    let this_channel = table[ry][rx];
    let same_row_other_col = table[ry][1 - rx];
    let other_row_same_col = table[1 - ry][rx];
    let diag = table[1 - ry][1 - rx];

    let mut rgb = [0u8; 3];
    let put = |ch: u8, v: u8, rgb: &mut [u8; 3]| rgb[ch as usize] = v;

    put(this_channel, cur[x], &mut rgb);
    put(same_row_other_col, avg_horizontal(cur, x, width), &mut rgb);
    put(other_row_same_col, ((prev_row[x] as u16 + next_row[x] as u16) / 2) as u8, &mut rgb);
    if diag != this_channel {
        put(diag, avg_diagonal(prev_row, next_row, x, width), &mut rgb);
    }
    rgb
}

/// Bilinear debayer over a rolling three-line window (the previous, current,
/// and next raw Bayer rows). The first and last rows of a frame have no real
/// neighbor on one side; since the Bayer phase repeats every two rows, the
/// substitute for a missing row is the row on the OTHER side of `cur` (same
/// phase as the missing one), falling back to `cur` itself only when the
/// frame is a single line tall.
pub struct Debayer3x3Stage {
    base: OpBase,
    phase: BayerPhase,
    prev_line: Option<Vec<u8>>,
}

impl Debayer3x3Stage {
    pub fn new(fmt: Format, input: usize) -> Result<Self> {
        let phase = bayer_phase_of(fmt)?;
        Ok(Self { base: OpBase::new(OpKind::Debayer3x3, fmt, input), phase, prev_line: None })
    }

    pub fn output_format(&self) -> Format {
        Format::new(PixelFormat::Rgb24, self.base.fmt.width, self.base.fmt.height)
    }
}

impl Operation for Debayer3x3Stage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let pitch = self.base.fmt.pitch()? as usize;
        let width = self.base.fmt.width as usize;
        let out_pitch = width * 3;
        output_line(output, out_pitch)?;

        let is_last_row = self.base.line_offset + 1 >= self.base.fmt.height;
        let window = input_lines(input, pitch, if is_last_row { 1 } else { 2 })?;
        let cur = &window[..pitch];
        let next = if is_last_row { None } else { Some(&window[pitch..2 * pitch]) };
        let prev = self.prev_line.as_deref();

        // The Bayer phase repeats every two rows, so the row missing past an
        // edge shares its layout with the row two steps in from that edge,
        // not with `cur` itself: row -1 reads like row 1, row height reads
        // like row height-2. Falling back to `cur` would read `cur`'s own
        // channel at every column, not the complementary one a real
        // neighbor row would carry.
        let prev_row = prev.or(next).unwrap_or(cur);
        let next_row = next.or(prev).unwrap_or(cur);

        let mut out_row = vec![0u8; out_pitch];
        for x in 0..width {
            let rgb = interpolate_pixel(prev_row, cur, next_row, self.phase, width, x, self.base.line_offset);
            out_row[x * 3..x * 3 + 3].copy_from_slice(&rgb);
        }

        let cur_owned = cur.to_vec();
        input_done(input, pitch);
        output_flush(output, &out_row);
        output_done(&mut self.base, 1, out_pitch as u64);
        self.base.lines_in += 1;
        self.base.bytes_in += pitch as u64;
        self.base.line_offset += 1;
        self.prev_line = Some(cur_owned);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_hostport::StdHostPort;

    #[test]
    fn debayer_1x1_flattens_a_2x2_block_to_one_color() {
        let fmt = Format::new(PixelFormat::Bayer(BayerPhase::Rggb), 2, 2);
        let host = StdHostPort::new();
        let mut input = Ring::alloc(&host, 64).unwrap();
        let mut output = Ring::alloc(&host, 64).unwrap();
        input.write(&[100, 150, 150, 200]); // R G / G B
        let mut stage = Debayer1x1Stage::new(fmt, 0).unwrap();
        stage.step(&mut input, &mut output, &host).unwrap();
        let mut out = [0u8; 12];
        output.read(&mut out);
        assert_eq!(&out[0..3], &[100, 150, 200]);
        assert_eq!(&out[9..12], &[100, 150, 200]);
    }

    #[test]
    fn debayer_3x3_reproduces_a_flat_field_exactly() {
        // A uniformly-lit gray Bayer frame should debayer to a uniform RGB
        // frame: every interpolated neighbor equals the same flat value.
        let fmt = Format::new(PixelFormat::Bayer(BayerPhase::Rggb), 4, 4);
        let host = StdHostPort::new();
        let mut input = Ring::alloc(&host, 256).unwrap();
        let mut output = Ring::alloc(&host, 256).unwrap();
        // Construct a bayer mosaic that corresponds to flat gray: R samples
        // read 128, G samples 128, B samples 128 everywhere.
        let row_even = vec![128u8; 4];
        let row_odd = vec![128u8; 4];
        for _ in 0..2 {
            input.write(&row_even);
            input.write(&row_odd);
        }
        let mut stage = Debayer3x3Stage::new(fmt, 0).unwrap();
        for _ in 0..4 {
            stage.step(&mut input, &mut output, &host).unwrap();
        }
        let mut out = [0u8; 48];
        output.read(&mut out);
        assert!(out.iter().all(|&b| b == 128));
    }
}
