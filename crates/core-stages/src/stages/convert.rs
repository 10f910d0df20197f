//! Line-at-a-time pixel format conversion: RGB24 <-> RGB565 <-> RGB565X <->
//! RGB332 <-> YUV24 <-> YUYV <-> GREY, all routed through the RGB24
//! intermediate in [`super::pixelconv`].

use core_error::{PipelineError, Result};
use core_format::Format;
use core_hostport::HostPort;
use core_op::{input_done, input_lines, output_done, output_line, output_flush, OpBase, OpKind, Operation};
use core_ring::Ring;

use super::pixelconv;

pub struct ConvertStage {
    base: OpBase,
    out_fmt: Format,
}

impl ConvertStage {
    pub fn new(in_fmt: Format, out_fmt: Format, input: usize) -> Result<Self> {
        if in_fmt.width != out_fmt.width || in_fmt.height != out_fmt.height {
            return Err(PipelineError::invalid_argument("convert cannot change frame dimensions").at_stage("convert"));
        }
        if in_fmt.pixfmt.is_bayer() || in_fmt.pixfmt.is_palette() {
            return Err(PipelineError::unsupported("convert does not demosaic or depalettize").at_stage("convert"));
        }
        Ok(Self { base: OpBase::new(OpKind::Convert, in_fmt, input), out_fmt })
    }

    pub fn output_format(&self) -> Format {
        self.out_fmt
    }
}

impl Operation for ConvertStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let in_pitch = self.base.fmt.pitch()? as usize;
        let out_pitch = self.out_fmt.pitch()? as usize;
        output_line(output, out_pitch)?;

        let line = input_lines(input, in_pitch, 1)?;
        let pixels = pixelconv::decode_line(self.base.fmt.pixfmt, self.base.fmt.width, &line);
        let encoded = pixelconv::encode_line(self.out_fmt.pixfmt, &pixels);

        input_done(input, in_pitch);
        output_flush(output, &encoded);
        output_done(&mut self.base, 1, encoded.len() as u64);
        self.base.lines_in += 1;
        self.base.bytes_in += in_pitch as u64;
        self.base.line_offset += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_format::PixelFormat;
    use core_hostport::StdHostPort;

    #[test]
    fn rejects_a_resizing_conversion() {
        let in_fmt = Format::new(PixelFormat::Rgb24, 4, 4);
        let out_fmt = Format::new(PixelFormat::Rgb565, 8, 4);
        assert!(ConvertStage::new(in_fmt, out_fmt, 0).is_err());
    }

    #[test]
    fn converts_one_line_rgb24_to_rgb565_and_back_within_tolerance() {
        let host = StdHostPort::new();
        let in_fmt = Format::new(PixelFormat::Rgb24, 2, 1);
        let mid_fmt = Format::new(PixelFormat::Rgb565, 2, 1);
        let out_fmt = Format::new(PixelFormat::Rgb24, 2, 1);

        let mut to_565 = ConvertStage::new(in_fmt, mid_fmt, 0).unwrap();
        let mut ring_rgb24 = Ring::alloc(&host, 64).unwrap();
        let mut ring_565 = Ring::alloc(&host, 64).unwrap();
        ring_rgb24.write(&[200, 100, 50, 10, 20, 30]);
        to_565.step(&mut ring_rgb24, &mut ring_565, &host).unwrap();

        let mut back_to_24 = ConvertStage::new(mid_fmt, out_fmt, 0).unwrap();
        let mut ring_out = Ring::alloc(&host, 64).unwrap();
        back_to_24.step(&mut ring_565, &mut ring_out, &host).unwrap();

        let mut out = [0u8; 6];
        ring_out.read(&mut out);
        let original = [200i32, 100, 50, 10, 20, 30];
        for (a, b) in original.iter().zip(out.iter()) {
            assert!((*a - *b as i32).abs() <= 13, "{a} vs {b}");
        }
    }

    #[test]
    fn suspends_when_input_has_less_than_one_line() {
        let host = StdHostPort::new();
        let in_fmt = Format::new(PixelFormat::Rgb24, 4, 1);
        let out_fmt = Format::new(PixelFormat::Grey, 4, 1);
        let mut stage = ConvertStage::new(in_fmt, out_fmt, 0).unwrap();
        let mut ring_in = Ring::alloc(&host, 64).unwrap();
        let mut ring_out = Ring::alloc(&host, 64).unwrap();
        ring_in.write(&[1, 2, 3]); // short of 12 bytes (4 px * 3)
        let err = stage.step(&mut ring_in, &mut ring_out, &host).unwrap_err();
        assert!(err.is_would_block());
    }
}
