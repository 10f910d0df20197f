//! JPEG encode stage: a thin adapter over an external entropy coder.
//!
//! Baseline JPEG (DCT, zigzag, Huffman tables) is squarely outside what this
//! engine owns — it's delegated to a [`JpegEntropyCoder`] the same way
//! [`core_hostport::ExposureDevice`] delegates hardware exposure control.
//! The stage's own job is just feeding it 8-line MCU-row windows (the
//! minimum block height at 4:4:4, the subsampling this engine always
//! requests) and routing its output bytes into the next ring.

use core_control::ControlId;
use core_error::{PipelineError, Result};
use core_format::{Format, PixelFormat};
use core_hostport::HostPort;
use core_op::{input_done, input_lines, output_done, output_flush, output_reserve, OpBase, OpKind, Operation};
use core_ring::Ring;

use super::correct::SharedControls;

pub const MCU_ROWS: u32 = 8;

/// Subsampling is fixed at 4:4:4 (no chroma subsampling); the engine never
/// needs to negotiate this with the coder, but the library contract takes
/// it as an explicit parameter so it's threaded through rather than assumed
/// on the other side.
const SUBSAMPLE_444: u8 = 0;

/// The external entropy coder contract. A real target supplies an
/// implementation backed by its own DCT/Huffman codec (hardware or a
/// vendored library); hosted tests use [`NullEntropyCoder`], a stand-in
/// that is not a valid JPEG bitstream.
pub trait JpegEntropyCoder {
    fn encode_begin(&mut self, width: u32, height: u32, pixel_type: PixelFormat, subsample: u8, quality: i32) -> Result<Vec<u8>>;
    fn encode_mcu_rows(&mut self, rows: &[u8]) -> Result<Vec<u8>>;
    fn encode_end(&mut self) -> Result<Vec<u8>>;
}

/// Frames each MCU-row batch with a length-prefixed marker instead of real
/// JPEG syntax. Exists so the pipeline's line-buffering and suspension
/// contract can be exercised end to end without a real codec on hand.
#[derive(Debug, Default)]
pub struct NullEntropyCoder;

impl JpegEntropyCoder for NullEntropyCoder {
    fn encode_begin(&mut self, width: u32, height: u32, _pixel_type: PixelFormat, _subsample: u8, quality: i32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(12);
        out.extend_from_slice(b"NJPG");
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&height.to_be_bytes());
        out.push(quality.clamp(0, 100) as u8);
        Ok(out)
    }

    fn encode_mcu_rows(&mut self, rows: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(rows.len() + 4);
        out.extend_from_slice(&(rows.len() as u32).to_be_bytes());
        out.extend_from_slice(rows);
        Ok(out)
    }

    fn encode_end(&mut self) -> Result<Vec<u8>> {
        Ok(vec![0xff, 0xd9]) // reuses the real JPEG EOI marker as an end tag
    }
}

pub struct JpegEncodeStage {
    base: OpBase,
    coder: Box<dyn JpegEntropyCoder>,
    controls: SharedControls,
    header_emitted: bool,
    trailer_emitted: bool,
}

impl JpegEncodeStage {
    pub fn new(fmt: Format, coder: Box<dyn JpegEntropyCoder>, controls: SharedControls, input: usize) -> Result<Self> {
        match fmt.pixfmt {
            PixelFormat::Rgb24 | PixelFormat::Rgb565 | PixelFormat::Yuyv => {}
            _ => return Err(PipelineError::unsupported("jpeg_encode takes RGB24/RGB565/YUYV input").at_stage("jpeg_encode")),
        }
        Ok(Self { base: OpBase::new(OpKind::JpegEncode, fmt, input), coder, controls, header_emitted: false, trailer_emitted: false })
    }

    pub fn output_format(&self) -> Format {
        Format::new(PixelFormat::Jpeg, self.base.fmt.width, self.base.fmt.height)
    }
}

impl Operation for JpegEncodeStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let height = self.base.fmt.height;
        let pitch = self.base.fmt.pitch()? as usize;

        if self.base.line_offset >= height {
            if self.trailer_emitted {
                return Err(PipelineError::would_block().at_stage("jpeg_encode"));
            }
            let trailer = self.coder.encode_end()?;
            output_reserve(output, trailer.len())?;
            output_flush(output, &trailer);
            output_done(&mut self.base, 0, trailer.len() as u64);
            self.trailer_emitted = true;
            return Ok(());
        }

        let rows_left = height - self.base.line_offset;
        let window = rows_left.min(MCU_ROWS) as usize;
        let window_bytes = pitch * window;
        output_reserve(output, window_bytes + 12)?;

        let lines = input_lines(input, pitch, window)?;
        let mut out = Vec::new();
        if !self.header_emitted {
            let quality = self.controls.borrow().get(ControlId::JpegQuality).as_scalar().unwrap_or(75);
            let pixel_type = self.base.fmt.pixfmt;
            out.extend_from_slice(&self.coder.encode_begin(self.base.fmt.width, height, pixel_type, SUBSAMPLE_444, quality)?);
            self.header_emitted = true;
        }
        out.extend_from_slice(&self.coder.encode_mcu_rows(&lines)?);

        input_done(input, pitch * window);
        output_flush(output, &out);
        output_done(&mut self.base, window as u64, out.len() as u64);
        self.base.lines_in += window as u64;
        self.base.bytes_in += window_bytes as u64;
        self.base.line_offset += window as u32;
        Ok(())
    }
}
