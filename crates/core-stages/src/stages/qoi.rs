//! QOI (Quite OK Image) encoder: a lossless, run/cache-based byte stream
//! with no block structure, which fits the line-buffered pipeline nicely
//! since nothing about the format needs a lookahead window bigger than one
//! previous pixel.

use core_error::{PipelineError, Result};
use core_format::{Format, PixelFormat};
use core_hostport::HostPort;
use core_op::{input_done, input_lines, output_done, output_flush, output_reserve, OpBase, OpKind, Operation};
use core_ring::Ring;

const QOI_OP_INDEX: u8 = 0x00;
const QOI_OP_DIFF: u8 = 0x40;
const QOI_OP_LUMA: u8 = 0x80;
const QOI_OP_RUN: u8 = 0xc0;
const QOI_OP_RGB: u8 = 0xfe;
const QOI_END_MARKER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

fn hash_index(px: [u8; 3]) -> usize {
    (px[0] as usize * 3 + px[1] as usize * 5 + px[2] as usize * 7 + 255 * 11) % 64
}

pub struct QoiEncodeStage {
    base: OpBase,
    cache: [[u8; 3]; 64],
    prev: [u8; 3],
    run: u32,
    header_emitted: bool,
    trailer_emitted: bool,
}

impl QoiEncodeStage {
    pub fn new(fmt: Format, input: usize) -> Result<Self> {
        if fmt.pixfmt != PixelFormat::Rgb24 {
            return Err(PipelineError::unsupported("qoi_encode takes RGB24 input").at_stage("qoi_encode"));
        }
        Ok(Self {
            base: OpBase::new(OpKind::QoiEncode, fmt, input),
            cache: [[0u8; 3]; 64],
            prev: [0, 0, 0],
            run: 0,
            header_emitted: false,
            trailer_emitted: false,
        })
    }

    pub fn output_format(&self) -> Format {
        Format::new(PixelFormat::Qoi, self.base.fmt.width, self.base.fmt.height)
    }

    fn header(&self) -> [u8; 14] {
        let mut h = [0u8; 14];
        h[0..4].copy_from_slice(b"qoif");
        h[4..8].copy_from_slice(&self.base.fmt.width.to_be_bytes());
        h[8..12].copy_from_slice(&self.base.fmt.height.to_be_bytes());
        h[12] = 3; // channels: RGB, no alpha
        h[13] = 0; // colorspace: sRGB with linear alpha (unused here)
        h
    }

    fn encode_pixel(&mut self, px: [u8; 3], out: &mut Vec<u8>) {
        if px == self.prev {
            self.run += 1;
            if self.run == 62 {
                out.push(QOI_OP_RUN | (self.run as u8 - 1));
                self.run = 0;
            }
            return;
        }
        if self.run > 0 {
            out.push(QOI_OP_RUN | (self.run as u8 - 1));
            self.run = 0;
        }

        let idx = hash_index(px);
        if self.cache[idx] == px {
            out.push(QOI_OP_INDEX | idx as u8);
        } else {
            self.cache[idx] = px;
            let dr = px[0] as i32 - self.prev[0] as i32;
            let dg = px[1] as i32 - self.prev[1] as i32;
            let db = px[2] as i32 - self.prev[2] as i32;
            let dr_dg = dr - dg;
            let db_dg = db - dg;
            if (-2..=1).contains(&dr) && (-2..=1).contains(&dg) && (-2..=1).contains(&db) {
                out.push(QOI_OP_DIFF | (((dr + 2) as u8) << 4) | (((dg + 2) as u8) << 2) | (db + 2) as u8);
            } else if (-32..=31).contains(&dg) && (-8..=7).contains(&dr_dg) && (-8..=7).contains(&db_dg) {
                out.push(QOI_OP_LUMA | (dg + 32) as u8);
                out.push((((dr_dg + 8) as u8) << 4) | (db_dg + 8) as u8);
            } else {
                out.push(QOI_OP_RGB);
                out.extend_from_slice(&px);
            }
        }
        self.prev = px;
    }
}

impl Operation for QoiEncodeStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let width = self.base.fmt.width as usize;
        let height = self.base.fmt.height;
        let in_pitch = self.base.fmt.pitch()? as usize;

        if self.base.line_offset >= height {
            if self.trailer_emitted {
                return Err(PipelineError::would_block().at_stage("qoi_encode"));
            }
            let mut trailer = Vec::with_capacity(1 + QOI_END_MARKER.len());
            if self.run > 0 {
                trailer.push(QOI_OP_RUN | (self.run as u8 - 1));
                self.run = 0;
            }
            trailer.extend_from_slice(&QOI_END_MARKER);
            output_reserve(output, trailer.len())?;
            output_flush(output, &trailer);
            output_done(&mut self.base, 0, trailer.len() as u64);
            self.trailer_emitted = true;
            return Ok(());
        }

        // Worst case every pixel costs 4 bytes (QOI_OP_RGB); reserve for
        // that plus the header on the very first line.
        let reserve = width * 4 + if self.header_emitted { 0 } else { 14 };
        output_reserve(output, reserve)?;

        let line = input_lines(input, in_pitch, 1)?;
        let mut out = Vec::with_capacity(reserve);
        if !self.header_emitted {
            out.extend_from_slice(&self.header());
            self.header_emitted = true;
        }
        for c in line.chunks_exact(3).take(width) {
            self.encode_pixel([c[0], c[1], c[2]], &mut out);
        }

        input_done(input, in_pitch);
        output_flush(output, &out);
        output_done(&mut self.base, 1, out.len() as u64);
        self.base.lines_in += 1;
        self.base.bytes_in += in_pitch as u64;
        self.base.line_offset += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_hostport::StdHostPort;

    #[test]
    fn header_bytes_match_the_qoi_magic_and_dimensions() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Rgb24, 2, 1);
        let mut input = Ring::alloc(&host, 64).unwrap();
        let mut output = Ring::alloc(&host, 64).unwrap();
        input.write(&[10, 20, 30, 10, 20, 30]);
        let mut stage = QoiEncodeStage::new(fmt, 0).unwrap();
        stage.step(&mut input, &mut output, &host).unwrap();
        let mut header = [0u8; 14];
        output.read(&mut header);
        assert_eq!(&header[0..4], b"qoif");
        assert_eq!(u32::from_be_bytes(header[4..8].try_into().unwrap()), 2);
        assert_eq!(u32::from_be_bytes(header[8..12].try_into().unwrap()), 1);
        assert_eq!(header[12], 3);
    }

    #[test]
    fn stream_ends_with_the_qoi_trailer() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Rgb24, 1, 1);
        let mut input = Ring::alloc(&host, 64).unwrap();
        let mut output = Ring::alloc(&host, 64).unwrap();
        input.write(&[1, 2, 3]);
        let mut stage = QoiEncodeStage::new(fmt, 0).unwrap();
        stage.step(&mut input, &mut output, &host).unwrap(); // the one line
        stage.step(&mut input, &mut output, &host).unwrap(); // trailer
        let mut all = vec![0u8; output.used()];
        output.read(&mut all);
        assert_eq!(&all[all.len() - 8..], &QOI_END_MARKER);
    }

    #[test]
    fn repeated_pixel_run_collapses_to_one_run_op() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Rgb24, 4, 1);
        let mut input = Ring::alloc(&host, 64).unwrap();
        let mut output = Ring::alloc(&host, 64).unwrap();
        input.write(&[5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5]);
        let mut stage = QoiEncodeStage::new(fmt, 0).unwrap();
        stage.step(&mut input, &mut output, &host).unwrap(); // header + luma op for pixel 0
        stage.step(&mut input, &mut output, &host).unwrap(); // flushed run + trailer
        // header(14) + QOI_OP_LUMA(2) for the first pixel + one run byte for
        // the remaining 3 identical pixels + the 8-byte end marker.
        assert_eq!(output.used(), 14 + 2 + 1 + 8);
    }
}
