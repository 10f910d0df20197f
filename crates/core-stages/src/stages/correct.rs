//! Tone correction stages: black level, white balance, color matrix, gamma.
//! Each is a one-line window (no lookahead needed) that reads its current
//! parameters from a shared [`Controls`] handle on every call, so an
//! auto-control pass run between frames takes effect immediately on the
//! next one.

use std::cell::RefCell;
use std::rc::Rc;

use core_control::{ControlId, Controls, Q10_UNITY};
use core_error::{PipelineError, Result};
use core_format::{Format, PixelFormat};
use core_hostport::HostPort;
use core_op::{input_done, input_lines, output_done, output_flush, output_line, OpBase, OpKind, Operation};
use core_ring::Ring;

/// Shared handle to the control registry, cheap to clone. A single-threaded
/// cooperative scheduler never hands stages to different threads, so `Rc`
/// over `Arc` and `RefCell` over a lock are the right-sized tools here.
pub type SharedControls = Rc<RefCell<Controls>>;

fn byte_stage_precheck(fmt: Format, stage_name: &'static str) -> Result<()> {
    match fmt.pixfmt.bits_per_pixel() {
        Some(8) | Some(24) => Ok(()),
        _ => Err(PipelineError::unsupported(format!("{stage_name} needs 8-bit or RGB24 input")).at_stage(stage_name)),
    }
}

fn step_passthrough_line(
    base: &mut OpBase,
    input: &mut Ring,
    output: &mut Ring,
    transform: impl Fn(&mut [u8]),
) -> Result<()> {
    let pitch = base.fmt.pitch()? as usize;
    output_line(output, pitch)?;
    let line = input_lines(input, pitch, 1)?;
    let mut out_line = line.clone();
    transform(&mut out_line);
    input_done(input, pitch);
    output_flush(output, &out_line);
    output_done(base, 1, pitch as u64);
    base.lines_in += 1;
    base.bytes_in += pitch as u64;
    base.line_offset += 1;
    Ok(())
}

pub struct BlackLevelStage {
    base: OpBase,
    controls: SharedControls,
}

impl BlackLevelStage {
    pub fn new(fmt: Format, controls: SharedControls, input: usize) -> Result<Self> {
        byte_stage_precheck(fmt, "correct_black_level")?;
        Ok(Self { base: OpBase::new(OpKind::BlackLevel, fmt, input), controls })
    }

    pub fn output_format(&self) -> Format {
        self.base.fmt
    }
}

impl Operation for BlackLevelStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let floor = self.controls.borrow().get(ControlId::BlackLevel).as_scalar().unwrap_or(0);
        step_passthrough_line(&mut self.base, input, output, |line| {
            for b in line.iter_mut() {
                *b = (*b as i32 - floor).clamp(0, 255) as u8;
            }
        })
    }
}

pub struct WhiteBalanceStage {
    base: OpBase,
    controls: SharedControls,
}

impl WhiteBalanceStage {
    pub fn new(fmt: Format, controls: SharedControls, input: usize) -> Result<Self> {
        if fmt.pixfmt != PixelFormat::Rgb24 {
            return Err(PipelineError::unsupported("white balance operates on RGB24 only").at_stage("correct_white_balance"));
        }
        Ok(Self { base: OpBase::new(OpKind::WhiteBalance, fmt, input), controls })
    }

    pub fn output_format(&self) -> Format {
        self.base.fmt
    }
}

impl Operation for WhiteBalanceStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let controls = self.controls.borrow();
        let red_gain = controls.get(ControlId::RedBalance).as_scalar().unwrap_or(Q10_UNITY);
        let blue_gain = controls.get(ControlId::BlueBalance).as_scalar().unwrap_or(Q10_UNITY);
        drop(controls);
        step_passthrough_line(&mut self.base, input, output, |line| {
            for px in line.chunks_exact_mut(3) {
                px[0] = ((px[0] as i32 * red_gain) / Q10_UNITY).clamp(0, 255) as u8;
                px[2] = ((px[2] as i32 * blue_gain) / Q10_UNITY).clamp(0, 255) as u8;
            }
        })
    }
}

pub struct ColorMatrixStage {
    base: OpBase,
    controls: SharedControls,
}

impl ColorMatrixStage {
    pub fn new(fmt: Format, controls: SharedControls, input: usize) -> Result<Self> {
        if fmt.pixfmt != PixelFormat::Rgb24 {
            return Err(PipelineError::unsupported("color matrix operates on RGB24 only").at_stage("correct_color_matrix"));
        }
        Ok(Self { base: OpBase::new(OpKind::ColorMatrix, fmt, input), controls })
    }

    pub fn output_format(&self) -> Format {
        self.base.fmt
    }
}

impl Operation for ColorMatrixStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let matrix = self.controls.borrow().get(ControlId::ColorMatrix).as_matrix().unwrap_or([
            [Q10_UNITY, 0, 0],
            [0, Q10_UNITY, 0],
            [0, 0, Q10_UNITY],
        ]);
        step_passthrough_line(&mut self.base, input, output, |line| {
            for px in line.chunks_exact_mut(3) {
                let src = [px[0] as i32, px[1] as i32, px[2] as i32];
                for c in 0..3 {
                    let acc = matrix[c][0] * src[0] + matrix[c][1] * src[1] + matrix[c][2] * src[2];
                    px[c] = (acc / Q10_UNITY).clamp(0, 255) as u8;
                }
            }
        })
    }
}

pub struct GammaStage {
    base: OpBase,
    controls: SharedControls,
    lut_gamma: i32,
    lut: [u8; 256],
}

/// `out = pow(in/255, level/16) * 255`; `level == 16` is the identity curve.
fn build_gamma_lut(level: i32) -> [u8; 256] {
    let exponent = (level.max(1) as f64) / 16.0;
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let normalized = i as f64 / 255.0;
        *slot = (normalized.powf(exponent) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

impl GammaStage {
    pub fn new(fmt: Format, controls: SharedControls, input: usize) -> Result<Self> {
        byte_stage_precheck(fmt, "correct_gamma")?;
        let level = controls.borrow().get(ControlId::Gamma).as_scalar().unwrap_or(16);
        Ok(Self { base: OpBase::new(OpKind::Gamma, fmt, input), controls, lut_gamma: level, lut: build_gamma_lut(level) })
    }

    pub fn output_format(&self) -> Format {
        self.base.fmt
    }
}

impl Operation for GammaStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let level = self.controls.borrow().get(ControlId::Gamma).as_scalar().unwrap_or(16);
        if level != self.lut_gamma {
            self.lut = build_gamma_lut(level);
            self.lut_gamma = level;
        }
        let lut = self.lut;
        step_passthrough_line(&mut self.base, input, output, |line| {
            for b in line.iter_mut() {
                *b = lut[*b as usize];
            }
        })
    }
}
