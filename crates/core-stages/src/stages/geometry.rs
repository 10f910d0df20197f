//! Frame geometry: [`CropStage`] extracts a sub-rectangle, [`ResizeStage`]
//! nearest-neighbor subsamples to a new size. Both operate on raw bytes
//! using the format's per-pixel byte stride, so they work across every
//! byte-aligned format (everything except sub-byte palettes and the
//! compressed formats).

use core_error::{PipelineError, Result};
use core_format::Format;
use core_hostport::HostPort;
use core_op::{input_done, input_lines, output_done, output_line, output_flush, OpBase, OpKind, Operation};
use core_ring::Ring;

fn bytes_per_pixel(fmt: Format) -> Result<u32> {
    let bits = fmt.pixfmt.bits_per_pixel().ok_or_else(|| {
        PipelineError::unsupported(format!("{} has no fixed per-pixel byte size", fmt.pixfmt.name()))
    })?;
    if bits % 8 != 0 {
        return Err(PipelineError::unsupported(format!(
            "{} is not byte-aligned, crop/resize need whole-byte pixels",
            fmt.pixfmt.name()
        )));
    }
    Ok(bits / 8)
}

/// A crop rectangle in source pixel coordinates. `x + width` and `y + height`
/// must not exceed the source frame.
#[derive(Debug, Clone, Copy)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub struct CropStage {
    base: OpBase,
    rect: CropRect,
    bpp: u32,
}

impl CropStage {
    pub fn new(fmt: Format, rect: CropRect, input: usize) -> Result<Self> {
        let bpp = bytes_per_pixel(fmt)?;
        if rect.x + rect.width > fmt.width || rect.y + rect.height > fmt.height {
            return Err(PipelineError::invalid_argument("crop rectangle exceeds source frame").at_stage("crop"));
        }
        Ok(Self { base: OpBase::new(OpKind::Crop, fmt, input), rect, bpp })
    }

    pub fn output_format(&self) -> Format {
        Format::new(self.base.fmt.pixfmt, self.rect.width, self.rect.height)
    }
}

impl Operation for CropStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        // The bottom edge is inclusive: a line_offset equal to y + height is
        // already past the crop window and the stage is done, not blocked.
        if self.base.line_offset >= self.rect.y + self.rect.height {
            return Err(PipelineError::would_block().at_stage("crop"));
        }

        let in_pitch = self.base.fmt.pitch()? as usize;
        let out_width_bytes = (self.rect.width * self.bpp) as usize;

        if self.base.line_offset < self.rect.y {
            // Skip rows above the crop window without producing output.
            let _ = input_lines(input, in_pitch, 1)?;
            input_done(input, in_pitch);
            self.base.lines_in += 1;
            self.base.bytes_in += in_pitch as u64;
            self.base.line_offset += 1;
            return Ok(());
        }

        output_line(output, out_width_bytes)?;
        let line = input_lines(input, in_pitch, 1)?;
        let x_off = (self.rect.x * self.bpp) as usize;
        let cropped = &line[x_off..x_off + out_width_bytes];

        input_done(input, in_pitch);
        output_flush(output, cropped);
        output_done(&mut self.base, 1, out_width_bytes as u64);
        self.base.lines_in += 1;
        self.base.bytes_in += in_pitch as u64;
        self.base.line_offset += 1;
        Ok(())
    }
}

/// Nearest-neighbor subsample to a new width/height. Only shrinking is
/// supported; the ratio need not be integral (rows/columns are selected by
/// proportional index, matching how `resize` is described in the stage
/// table — no interpolation, a straight pick-the-nearest-source-sample).
pub struct ResizeStage {
    base: OpBase,
    out_width: u32,
    out_height: u32,
    bpp: u32,
    /// Which source row to pull for the next output row we produce.
    next_source_row: u32,
}

impl ResizeStage {
    pub fn new(fmt: Format, out_width: u32, out_height: u32, input: usize) -> Result<Self> {
        let bpp = bytes_per_pixel(fmt)?;
        if out_width == 0 || out_height == 0 || out_width > fmt.width || out_height > fmt.height {
            return Err(PipelineError::invalid_argument("resize target must be smaller, nonzero").at_stage("resize"));
        }
        Ok(Self { base: OpBase::new(OpKind::Resize, fmt, input), out_width, out_height, bpp, next_source_row: 0 })
    }

    pub fn output_format(&self) -> Format {
        Format::new(self.base.fmt.pixfmt, self.out_width, self.out_height)
    }

    fn source_row_for(&self, out_row: u32) -> u32 {
        (out_row * self.base.fmt.height) / self.out_height
    }
}

impl Operation for ResizeStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let out_rows_done = self.base.lines_out as u32;
        if out_rows_done >= self.out_height {
            return Err(PipelineError::would_block().at_stage("resize"));
        }

        let in_pitch = self.base.fmt.pitch()? as usize;
        let target_row = self.source_row_for(out_rows_done);

        while self.base.line_offset <= target_row {
            if self.base.line_offset == target_row {
                break;
            }
            let _ = input_lines(input, in_pitch, 1)?;
            input_done(input, in_pitch);
            self.base.lines_in += 1;
            self.base.bytes_in += in_pitch as u64;
            self.base.line_offset += 1;
        }

        let out_pitch = (self.out_width * self.bpp) as usize;
        output_line(output, out_pitch)?;
        let line = input_lines(input, in_pitch, 1)?;

        let mut out_row = vec![0u8; out_pitch];
        for out_x in 0..self.out_width {
            let src_x = (out_x * self.base.fmt.width) / self.out_width;
            let src_off = (src_x * self.bpp) as usize;
            let dst_off = (out_x * self.bpp) as usize;
            out_row[dst_off..dst_off + self.bpp as usize]
                .copy_from_slice(&line[src_off..src_off + self.bpp as usize]);
        }

        // The source row stays peeked (not consumed) until a later output
        // row no longer needs it, since subsampling can reuse one source
        // row for several output rows when shrinking by more than 2x.
        let next_row_differs = out_rows_done + 1 >= self.out_height
            || self.source_row_for(out_rows_done + 1) > self.base.line_offset;
        if next_row_differs {
            input_done(input, in_pitch);
            self.base.lines_in += 1;
            self.base.bytes_in += in_pitch as u64;
            self.base.line_offset += 1;
        } else {
            input.reset_peek();
        }

        output_flush(output, &out_row);
        output_done(&mut self.base, 1, out_pitch as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_format::PixelFormat;
    use core_hostport::StdHostPort;

    #[test]
    fn crop_extracts_the_requested_rect() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Grey, 4, 4);
        let mut input = Ring::alloc(&host, 64).unwrap();
        let mut output = Ring::alloc(&host, 64).unwrap();
        for row in 0..4u8 {
            input.write(&[row * 10, row * 10 + 1, row * 10 + 2, row * 10 + 3]);
        }
        let rect = CropRect { x: 1, y: 1, width: 2, height: 2 };
        let mut stage = CropStage::new(fmt, rect, 0).unwrap();
        for _ in 0..4 {
            let _ = stage.step(&mut input, &mut output, &host);
        }
        let mut out = [0u8; 4];
        output.read(&mut out);
        assert_eq!(out, [11, 12, 21, 22]);
    }

    #[test]
    fn crop_stops_at_the_inclusive_bottom_edge() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Grey, 2, 2);
        let mut input = Ring::alloc(&host, 16).unwrap();
        let mut output = Ring::alloc(&host, 16).unwrap();
        input.write(&[1, 2, 3, 4]);
        let rect = CropRect { x: 0, y: 0, width: 2, height: 2 };
        let mut stage = CropStage::new(fmt, rect, 0).unwrap();
        stage.step(&mut input, &mut output, &host).unwrap();
        stage.step(&mut input, &mut output, &host).unwrap();
        let err = stage.step(&mut input, &mut output, &host).unwrap_err();
        assert!(err.is_would_block());
    }

    #[test]
    fn resize_halves_a_4x4_frame_to_2x2() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Grey, 4, 4);
        let mut input = Ring::alloc(&host, 64).unwrap();
        let mut output = Ring::alloc(&host, 64).unwrap();
        for row in 0..4u8 {
            input.write(&[row, row, row, row]);
        }
        let mut stage = ResizeStage::new(fmt, 2, 2, 0).unwrap();
        for _ in 0..2 {
            stage.step(&mut input, &mut output, &host).unwrap();
        }
        let mut out = [0u8; 4];
        output.read(&mut out);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn resize_rejects_upscaling() {
        let fmt = Format::new(PixelFormat::Grey, 4, 4);
        assert!(ResizeStage::new(fmt, 8, 8, 0).is_err());
    }
}
