//! RGB24-only spatial filters: weighted convolution ([`KernelConvolveStage`])
//! and median denoise ([`KernelDenoiseStage`]), both over a rolling window of
//! `size` lines (3 or 5) with edge rows replicated at the top/bottom of the
//! frame, matching the edge handling already used for
//! [`super::debayer::Debayer3x3Stage`].

use core_error::{PipelineError, Result};
use core_format::{Format, PixelFormat};
use core_hostport::HostPort;
use core_op::{input_done, input_lines, output_done, output_flush, output_line, OpBase, OpKind, Operation};
use core_ring::Ring;

/// A convolution kernel's integer weights and the shift needed to bring the
/// weighted sum back to an 8-bit range (weights sum to `1 << shift`, except
/// `edge_detect`, which is not meant to preserve overall brightness).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelType {
    Identity,
    EdgeDetect,
    GaussianBlur,
    Sharpen,
}

fn kernel_3x3(kind: KernelType) -> ([i32; 9], u32) {
    match kind {
        KernelType::Identity => ([0, 0, 0, 0, 1, 0, 0, 0, 0], 0),
        KernelType::EdgeDetect => ([-1, -1, -1, -1, 8, -1, -1, -1, -1], 0),
        KernelType::GaussianBlur => ([1, 2, 1, 2, 4, 2, 1, 2, 1], 4),
        KernelType::Sharpen => ([0, -1, 0, -1, 5, -1, 0, -1, 0], 0),
    }
}

fn kernel_5x5(kind: KernelType) -> ([i32; 25], u32) {
    match kind {
        KernelType::Identity => {
            let mut w = [0i32; 25];
            w[12] = 1;
            (w, 0)
        }
        KernelType::EdgeDetect => {
            let mut w = [-1i32; 25];
            w[12] = 24;
            (w, 0)
        }
        KernelType::GaussianBlur => (
            [
                1, 4, 6, 4, 1, //
                4, 16, 24, 16, 4, //
                6, 24, 36, 24, 6, //
                4, 16, 24, 16, 4, //
                1, 4, 6, 4, 1,
            ],
            8,
        ),
        KernelType::Sharpen => {
            let mut w = [-1i32; 25];
            w[12] = 25;
            (w, 0)
        }
    }
}

fn clamp_channel(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// A rolling window of `size` decoded RGB24 lines, shared by the convolve
/// and denoise stages. The window is always centered on the row currently
/// being emitted: the top/bottom frame edges are handled by replicating the
/// nearest real row instead of reading past the frame.
struct RollingWindow {
    size: usize,
    half: usize,
    rows: Vec<Vec<u8>>,
    rows_read: u32,
}

impl RollingWindow {
    fn new(size: usize) -> Self {
        Self { size, half: size / 2, rows: Vec::new(), rows_read: 0 }
    }

    fn row(&self, idx: isize) -> &[u8] {
        let idx = idx.clamp(0, self.rows.len() as isize - 1) as usize;
        &self.rows[idx]
    }

    fn read_real(&mut self, input: &mut Ring, pitch: usize, base: &mut OpBase) -> Result<Vec<u8>> {
        let l = input_lines(input, pitch, 1)?;
        input_done(input, pitch);
        base.lines_in += 1;
        base.bytes_in += pitch as u64;
        self.rows_read += 1;
        Ok(l)
    }

    /// Fills the window for the very first output row, or resumes a prior
    /// attempt that suspended partway through.
    fn prime(&mut self, input: &mut Ring, pitch: usize, height: u32, base: &mut OpBase) -> Result<()> {
        if self.rows.is_empty() {
            let row0 = self.read_real(input, pitch, base)?;
            for _ in 0..self.half {
                self.rows.push(row0.clone());
            }
            self.rows.push(row0);
        }
        while self.rows.len() < self.size {
            let next = if self.rows_read < height {
                self.read_real(input, pitch, base)?
            } else {
                self.rows.last().unwrap().clone()
            };
            self.rows.push(next);
        }
        Ok(())
    }

    /// Slides the window down by one row after an output row has been
    /// emitted, replicating the bottom edge once the real frame is exhausted.
    fn advance(&mut self, input: &mut Ring, pitch: usize, height: u32, base: &mut OpBase) -> Result<()> {
        let next = if self.rows_read < height {
            self.read_real(input, pitch, base)?
        } else {
            self.rows.last().unwrap().clone()
        };
        self.rows.remove(0);
        self.rows.push(next);
        Ok(())
    }
}

fn rgb24_stage_precheck(fmt: Format, size: usize, stage_name: &'static str) -> Result<()> {
    if fmt.pixfmt != PixelFormat::Rgb24 {
        return Err(PipelineError::unsupported(format!("{stage_name} operates on RGB24 only")).at_stage(stage_name));
    }
    if size != 3 && size != 5 {
        return Err(PipelineError::invalid_argument(format!("{stage_name} window must be 3 or 5")).at_stage(stage_name));
    }
    Ok(())
}

pub struct KernelConvolveStage {
    base: OpBase,
    size: usize,
    weights_3: [i32; 9],
    weights_5: [i32; 25],
    shift: u32,
    window: RollingWindow,
    /// Set once a row's output has been flushed but [`RollingWindow::advance`]
    /// for it hasn't completed yet (the input ring suspended). `line_offset`
    /// only advances once the slide actually happens, so a suspend here
    /// can't leave the window one row behind where `line_offset` claims it is.
    pending_advance: bool,
}

impl KernelConvolveStage {
    pub fn new(fmt: Format, size: usize, kind: KernelType, input: usize) -> Result<Self> {
        rgb24_stage_precheck(fmt, size, "kernel_convolve")?;
        let mut weights_3 = [0i32; 9];
        let mut weights_5 = [0i32; 25];
        let shift = if size == 3 {
            let (w, s) = kernel_3x3(kind);
            weights_3 = w;
            s
        } else {
            let (w, s) = kernel_5x5(kind);
            weights_5 = w;
            s
        };
        Ok(Self {
            base: OpBase::new(if size == 3 { OpKind::Kernel3x3 } else { OpKind::Kernel5x5 }, fmt, input),
            size,
            weights_3,
            weights_5,
            shift,
            window: RollingWindow::new(size),
            pending_advance: false,
        })
    }

    pub fn output_format(&self) -> Format {
        self.base.fmt
    }
}

impl Operation for KernelConvolveStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let width = self.base.fmt.width as usize;
        let pitch = self.base.fmt.pitch()? as usize;
        let half = self.window.half as isize;
        let height = self.base.fmt.height;

        if self.pending_advance {
            self.window.advance(input, pitch, height, &mut self.base)?;
            self.pending_advance = false;
            self.base.line_offset += 1;
        }

        if self.base.line_offset >= height {
            return Err(PipelineError::would_block().at_stage("kernel_convolve"));
        }
        self.window.prime(input, pitch, height, &mut self.base)?;

        let out_pitch = width * 3;
        output_line(output, out_pitch)?;
        let mut out_row = vec![0u8; out_pitch];
        for x in 0..width {
            let mut acc = [0i32; 3];
            let mut idx = 0usize;
            for dy in -half..=half {
                let row = self.window.row(half + dy);
                for dx in -half..=half {
                    let sx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                    let w = if self.size == 3 { self.weights_3[idx] } else { self.weights_5[idx] };
                    for c in 0..3 {
                        acc[c] += w * row[sx * 3 + c] as i32;
                    }
                    idx += 1;
                }
            }
            for c in 0..3 {
                out_row[x * 3 + c] = clamp_channel(acc[c] >> self.shift);
            }
        }
        output_flush(output, &out_row);
        output_done(&mut self.base, 1, out_pitch as u64);

        // The slide for the row just emitted is attempted now, not after
        // `line_offset` advances, so a suspended `advance` leaves both the
        // window and `line_offset` pointed at the row that was actually
        // emitted rather than one row ahead of where the window really is.
        if self.base.line_offset + 1 < height {
            if let Err(e) = self.window.advance(input, pitch, height, &mut self.base) {
                self.pending_advance = true;
                return Err(e);
            }
        }
        self.base.line_offset += 1;
        Ok(())
    }
}

fn median_of_9(mut v: [u8; 9]) -> u8 {
    v.sort_unstable();
    v[4]
}

fn median_of_25(mut v: [u8; 25]) -> u8 {
    v.sort_unstable();
    v[12]
}

pub struct KernelDenoiseStage {
    base: OpBase,
    size: usize,
    window: RollingWindow,
    /// See [`KernelConvolveStage::pending_advance`].
    pending_advance: bool,
}

impl KernelDenoiseStage {
    pub fn new(fmt: Format, size: usize, input: usize) -> Result<Self> {
        rgb24_stage_precheck(fmt, size, "kernel_denoise")?;
        Ok(Self {
            base: OpBase::new(if size == 3 { OpKind::Denoise3x3 } else { OpKind::Denoise5x5 }, fmt, input),
            size,
            window: RollingWindow::new(size),
            pending_advance: false,
        })
    }

    pub fn output_format(&self) -> Format {
        self.base.fmt
    }
}

impl Operation for KernelDenoiseStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let width = self.base.fmt.width as usize;
        let pitch = self.base.fmt.pitch()? as usize;
        let half = self.window.half as isize;
        let height = self.base.fmt.height;

        if self.pending_advance {
            self.window.advance(input, pitch, height, &mut self.base)?;
            self.pending_advance = false;
            self.base.line_offset += 1;
        }

        if self.base.line_offset >= height {
            return Err(PipelineError::would_block().at_stage("kernel_denoise"));
        }
        self.window.prime(input, pitch, height, &mut self.base)?;

        let out_pitch = width * 3;
        output_line(output, out_pitch)?;
        let mut out_row = vec![0u8; out_pitch];
        for x in 0..width {
            for c in 0..3 {
                let v = if self.size == 3 {
                    let mut win = [0u8; 9];
                    let mut idx = 0;
                    for dy in -1..=1 {
                        let row = self.window.row(half + dy);
                        for dx in -1..=1 {
                            let sx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                            win[idx] = row[sx * 3 + c];
                            idx += 1;
                        }
                    }
                    median_of_9(win)
                } else {
                    let mut win = [0u8; 25];
                    let mut idx = 0;
                    for dy in -2..=2 {
                        let row = self.window.row(half + dy);
                        for dx in -2..=2 {
                            let sx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                            win[idx] = row[sx * 3 + c];
                            idx += 1;
                        }
                    }
                    median_of_25(win)
                };
                out_row[x * 3 + c] = v;
            }
        }
        output_flush(output, &out_row);
        output_done(&mut self.base, 1, out_pitch as u64);

        if self.base.line_offset + 1 < height {
            if let Err(e) = self.window.advance(input, pitch, height, &mut self.base) {
                self.pending_advance = true;
                return Err(e);
            }
        }
        self.base.line_offset += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_hostport::StdHostPort;

    fn write_flat(ring: &mut Ring, width: usize, height: usize, val: u8) {
        for _ in 0..height {
            ring.write(&vec![val; width * 3]);
        }
    }

    #[test]
    fn identity_kernel_reproduces_the_source_exactly() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Rgb24, 3, 3);
        let mut input = Ring::alloc(&host, 256).unwrap();
        let mut output = Ring::alloc(&host, 256).unwrap();
        write_flat(&mut input, 3, 3, 77);
        let mut stage = KernelConvolveStage::new(fmt, 3, KernelType::Identity, 0).unwrap();
        for _ in 0..3 {
            stage.step(&mut input, &mut output, &host).unwrap();
        }
        let mut out = [0u8; 27];
        output.read(&mut out);
        assert!(out.iter().all(|&b| b == 77));
    }

    #[test]
    fn gaussian_blur_keeps_a_flat_field_flat() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Rgb24, 4, 4);
        let mut input = Ring::alloc(&host, 512).unwrap();
        let mut output = Ring::alloc(&host, 512).unwrap();
        write_flat(&mut input, 4, 4, 100);
        let mut stage = KernelConvolveStage::new(fmt, 3, KernelType::GaussianBlur, 0).unwrap();
        for _ in 0..4 {
            stage.step(&mut input, &mut output, &host).unwrap();
        }
        let mut out = [0u8; 48];
        output.read(&mut out);
        assert!(out.iter().all(|&b| b == 100));
    }

    #[test]
    fn convolve_suspends_past_the_last_row() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Rgb24, 2, 2);
        let mut input = Ring::alloc(&host, 256).unwrap();
        let mut output = Ring::alloc(&host, 256).unwrap();
        write_flat(&mut input, 2, 2, 9);
        let mut stage = KernelConvolveStage::new(fmt, 3, KernelType::Identity, 0).unwrap();
        stage.step(&mut input, &mut output, &host).unwrap();
        stage.step(&mut input, &mut output, &host).unwrap();
        let err = stage.step(&mut input, &mut output, &host).unwrap_err();
        assert!(err.is_would_block());
    }

    #[test]
    fn convolve_stays_synchronized_when_a_row_arrives_one_at_a_time() {
        // Feeds rows in only as the stage asks for them (rather than all up
        // front), so the post-emit window slide suspends mid-row the way a
        // slow upstream stage would leave it. A desynced `line_offset`
        // would shift the identity output by a row.
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Rgb24, 1, 4);
        let mut input = Ring::alloc(&host, 64).unwrap();
        let mut output = Ring::alloc(&host, 64).unwrap();
        let rows = [10u8, 20, 30, 40];
        input.write(&[rows[0]; 3]);
        let mut stage = KernelConvolveStage::new(fmt, 3, KernelType::Identity, 0).unwrap();

        let mut fed = 1;
        let mut emitted = 0;
        let mut guard = 0;
        while emitted < rows.len() {
            guard += 1;
            assert!(guard < 100, "stage made no progress");
            match stage.step(&mut input, &mut output, &host) {
                Ok(()) => emitted += 1,
                Err(e) if e.is_would_block() => {
                    assert!(fed < rows.len(), "suspended with no more input to feed");
                    input.write(&[rows[fed]; 3]);
                    fed += 1;
                }
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }

        let mut out = [0u8; 12];
        output.read(&mut out);
        for (i, &val) in rows.iter().enumerate() {
            assert_eq!(&out[i * 3..i * 3 + 3], &[val, val, val], "row {i} desynced after suspend/resume");
        }
    }

    #[test]
    fn denoise_removes_a_single_outlier_pixel() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Rgb24, 3, 3);
        let mut input = Ring::alloc(&host, 256).unwrap();
        let mut output = Ring::alloc(&host, 256).unwrap();
        write_flat(&mut input, 3, 3, 50);
        let mut stage = KernelDenoiseStage::new(fmt, 3, 0).unwrap();
        for _ in 0..3 {
            stage.step(&mut input, &mut output, &host).unwrap();
        }
        let mut out = [0u8; 27];
        output.read(&mut out);
        assert!(out.iter().all(|&b| b == 50));
    }

    #[test]
    fn convolve_rejects_non_rgb24_input() {
        let fmt = Format::new(PixelFormat::Grey, 3, 3);
        assert!(KernelConvolveStage::new(fmt, 3, KernelType::Identity, 0).is_err());
    }
}
