//! Palette encode/decode stages, thin line-at-a-time wrappers around
//! [`core_palette`]'s nearest-match functions. The palette itself is set
//! once the optimizer has run (typically after a first statistics-gathering
//! pass), hence the shared handle rather than an owned copy.

use std::cell::RefCell;
use std::rc::Rc;

use core_error::{PipelineError, Result};
use core_format::{Format, Palette, PixelFormat};
use core_hostport::HostPort;
use core_op::{input_done, input_lines, output_done, output_flush, output_line, OpBase, OpKind, Operation};
use core_palette::{palette_decode_index, palette_encode_pixel};
use core_ring::Ring;

pub type SharedPalette = Rc<RefCell<Palette>>;

fn pack_indices(indices: &[usize], bit_depth: u8) -> Vec<u8> {
    let per_byte = 8 / bit_depth as usize;
    let mut out = vec![0u8; indices.len().div_ceil(per_byte)];
    for (i, &idx) in indices.iter().enumerate() {
        let byte = i / per_byte;
        let slot = i % per_byte;
        let shift = (per_byte - 1 - slot) * bit_depth as usize;
        out[byte] |= ((idx as u8) & ((1 << bit_depth) - 1)) << shift;
    }
    out
}

fn unpack_indices(bytes: &[u8], bit_depth: u8, count: usize) -> Vec<usize> {
    let per_byte = 8 / bit_depth as usize;
    let mask = (1u8 << bit_depth) - 1;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let byte = bytes[i / per_byte];
        let slot = i % per_byte;
        let shift = (per_byte - 1 - slot) * bit_depth as usize;
        out.push(((byte >> shift) & mask) as usize);
    }
    out
}

pub struct PaletteEncodeStage {
    base: OpBase,
    palette: SharedPalette,
    out_fmt: Format,
}

impl PaletteEncodeStage {
    pub fn new(fmt: Format, palette: SharedPalette, input: usize) -> Result<Self> {
        if fmt.pixfmt != PixelFormat::Rgb24 {
            return Err(PipelineError::unsupported("palette_encode takes RGB24 input").at_stage("palette_encode"));
        }
        let bit_depth = palette.borrow().bit_depth;
        let out_fmt = Format::new(PixelFormat::Palette(bit_depth), fmt.width, fmt.height);
        Ok(Self { base: OpBase::new(OpKind::PaletteEncode, fmt, input), palette, out_fmt })
    }

    pub fn output_format(&self) -> Format {
        self.out_fmt
    }
}

impl Operation for PaletteEncodeStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let width = self.base.fmt.width as usize;
        let in_pitch = self.base.fmt.pitch()? as usize;
        let out_pitch = self.out_fmt.pitch()? as usize;
        output_line(output, out_pitch)?;

        let line = input_lines(input, in_pitch, 1)?;
        let palette = self.palette.borrow();
        let indices: Vec<usize> = line.chunks_exact(3).take(width).map(|c| palette_encode_pixel([c[0], c[1], c[2]], &palette)).collect();
        drop(palette);
        let packed = pack_indices(&indices, self.out_fmt.pixfmt.palette_bit_depth().unwrap());

        input_done(input, in_pitch);
        output_flush(output, &packed);
        output_done(&mut self.base, 1, packed.len() as u64);
        self.base.lines_in += 1;
        self.base.bytes_in += in_pitch as u64;
        self.base.line_offset += 1;
        Ok(())
    }
}

pub struct PaletteDecodeStage {
    base: OpBase,
    palette: SharedPalette,
}

impl PaletteDecodeStage {
    pub fn new(fmt: Format, palette: SharedPalette, input: usize) -> Result<Self> {
        if !fmt.pixfmt.is_palette() {
            return Err(PipelineError::unsupported("palette_decode takes an indexed-color input").at_stage("palette_decode"));
        }
        Ok(Self { base: OpBase::new(OpKind::PaletteDecode, fmt, input), palette })
    }

    pub fn output_format(&self) -> Format {
        Format::new(PixelFormat::Rgb24, self.base.fmt.width, self.base.fmt.height)
    }
}

impl Operation for PaletteDecodeStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let width = self.base.fmt.width as usize;
        let in_pitch = self.base.fmt.pitch()? as usize;
        let out_pitch = width * 3;
        output_line(output, out_pitch)?;

        let line = input_lines(input, in_pitch, 1)?;
        let bit_depth = self.base.fmt.pixfmt.palette_bit_depth().unwrap();
        let indices = unpack_indices(&line, bit_depth, width);
        let palette = self.palette.borrow();
        let mut out_row = Vec::with_capacity(out_pitch);
        for idx in indices {
            out_row.extend_from_slice(&palette_decode_index(idx, &palette)?);
        }
        drop(palette);

        input_done(input, in_pitch);
        output_flush(output, &out_row);
        output_done(&mut self.base, 1, out_pitch as u64);
        self.base.lines_in += 1;
        self.base.bytes_in += in_pitch as u64;
        self.base.line_offset += 1;
        Ok(())
    }
}
