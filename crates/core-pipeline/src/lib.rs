//! The pipeline scheduler: owns a linear chain of stages and the rings
//! between them, drives them to a fixed point, and exposes the handful of
//! whole-chain operations (palette installation, control writes) that
//! don't belong to any single stage.
//!
//! The original design links operations through an intrusive doubly
//! threaded chain and recurses through `output_done` into the downstream
//! stage. Both are replaced here: stages live in an owned `Vec<Box<dyn
//! Operation>>` indexed by position, and `pipeline_run_loop` is a plain
//! outer loop that scans the chain front-to-back until a full pass makes
//! no progress, rather than unbounded recursion. See the top-level design
//! notes for the rationale; externally observable behavior (ordering,
//! backpressure, termination) is unchanged.

use core_control::{ControlId, ControlValue, Controls};
use core_error::{PipelineError, Result};
use core_format::{Format, Palette, PixelFormat};
use core_hostport::HostPort;
use core_op::Operation;
use core_palette::image_optimize_palette;
use core_ring::Ring;
use core_stages::{SharedControls, SharedPalette};

/// One palette-bearing stage's registration: its declared pixel format
/// (carries the bit depth) and the shared handle the stage itself reads
/// from on every `step`. Kept as a side table rather than downcasting the
/// trait object, mirroring the "publish a handle instead of a raw pointer
/// into the op" redesign direction.
struct PaletteSlot {
    fmt: PixelFormat,
    handle: SharedPalette,
}

/// Owner of a stage chain: the source buffer (bound at `pipeline_process`
/// time), every stage in order, the rings connecting them, and the shared
/// control registry every correction stage reads from.
pub struct Image {
    stages: Vec<Box<dyn Operation>>,
    ring_capacities: Vec<usize>,
    rings: Vec<Ring>,
    palettes: Vec<PaletteSlot>,
    controls: SharedControls,
    current_fmt: Option<PixelFormat>,
}

impl Image {
    pub fn new(controls: SharedControls) -> Self {
        Self { stages: Vec::new(), ring_capacities: Vec::new(), rings: Vec::new(), palettes: Vec::new(), controls, current_fmt: None }
    }

    pub fn controls(&self) -> &SharedControls {
        &self.controls
    }

    pub fn current_format(&self) -> Option<PixelFormat> {
        self.current_fmt
    }

    /// The ring the last stage writes into — where a caller reads the
    /// finished frame after [`pipeline_process`] returns.
    pub fn output(&mut self) -> &mut Ring {
        self.rings.last_mut().expect("pipeline_process must run before reading output")
    }
}

/// Appends `stage` to the chain. `output_ring_capacity` sizes the ring the
/// stage will write into; it's allocated lazily by [`pipeline_process`],
/// not here, matching the "ring memory allocated lazily on first process"
/// lifecycle.
pub fn pipeline_add(image: &mut Image, stage: Box<dyn Operation>, output_ring_capacity: usize) -> usize {
    let fmt = stage.base().fmt.pixfmt;
    image.current_fmt = Some(fmt);
    image.stages.push(stage);
    image.ring_capacities.push(output_ring_capacity);
    let index = image.stages.len() - 1;
    log::debug!("stage {index} ({:?}) added, input format {fmt:?}", image.stages[index].base().kind);
    index
}

/// Same as [`pipeline_add`], for a stage that owns a [`SharedPalette`]
/// handle (`palette_encode`/`palette_decode`). `fmt` is the palette-bearing
/// side of the stage (its indexed-color format for encode's output /
/// decode's input), used later to match a [`pipeline_set_palette`] call to
/// the right stage.
pub fn pipeline_add_palette_stage(image: &mut Image, stage: Box<dyn Operation>, output_ring_capacity: usize, fmt: PixelFormat, palette: SharedPalette) -> usize {
    image.palettes.push(PaletteSlot { fmt, handle: palette });
    pipeline_add(image, stage, output_ring_capacity)
}

/// Binds `source` as the first stage's input and runs the chain to a
/// fixed point. Every downstream ring is allocated here, sized by the
/// capacity each stage requested at `pipeline_add` time.
pub fn pipeline_process(image: &mut Image, host: &dyn HostPort, source: &[u8]) -> Result<()> {
    if image.stages.is_empty() {
        return Err(PipelineError::invalid_argument("pipeline_process requires at least one stage"));
    }
    image.rings.clear();
    let mut source_ring = Ring::alloc(host, source.len().max(1))?;
    source_ring.write(source);
    image.rings.push(source_ring);
    for &capacity in &image.ring_capacities {
        image.rings.push(Ring::alloc(host, capacity)?);
    }
    pipeline_run_loop(image, host)
}

/// Runs every stage once, front to back, swallowing `WouldBlock`.
/// Returns whether any stage made progress, the signal
/// [`pipeline_run_loop`] uses to detect the fixed point.
pub fn pipeline_run_once(image: &mut Image, host: &dyn HostPort) -> Result<bool> {
    let mut progressed = false;
    for i in 0..image.stages.len() {
        let (left, right) = image.rings.split_at_mut(i + 1);
        let input_ring = &mut left[i];
        let output_ring = &mut right[0];
        match image.stages[i].step(input_ring, output_ring, host) {
            Ok(()) => progressed = true,
            Err(e) if e.is_would_block() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(progressed)
}

/// Drives [`pipeline_run_once`] until a full pass makes no progress
/// anywhere in the chain. `WouldBlock` from an individual stage is the
/// normal terminal condition for that stage and never reaches here.
pub fn pipeline_run_loop(image: &mut Image, host: &dyn HostPort) -> Result<()> {
    loop {
        match pipeline_run_once(image, host) {
            Ok(true) => continue,
            Ok(false) => {
                log::info!("pipeline reached a fixed point ({} stage(s))", image.stages.len());
                return Ok(());
            }
            Err(e) => {
                log::error!("pipeline aborted: {e}");
                return Err(e);
            }
        }
    }
}

/// Installs `new_palette` into every registered palette stage whose pixel
/// format matches. Returns `NotFound` if no stage is registered for that
/// format at all.
pub fn pipeline_set_palette(image: &mut Image, fmt: PixelFormat, new_palette: Palette) -> Result<()> {
    let mut matched = false;
    for slot in &image.palettes {
        if slot.fmt == fmt {
            *slot.handle.borrow_mut() = new_palette.clone();
            matched = true;
        }
    }
    if matched {
        Ok(())
    } else {
        Err(PipelineError::not_found("no palette stage registered for this format"))
    }
}

/// Returns the pixel format of the first registered palette stage.
pub fn pipeline_get_palette_fourcc(image: &Image) -> Result<PixelFormat> {
    image.palettes.first().map(|slot| slot.fmt).ok_or_else(|| PipelineError::not_found("no palette stage registered"))
}

/// Refines the palette belonging to `fmt` against `rgb24`, one K-means
/// iteration of `num_samples` random draws. A thin wrapper over
/// [`core_palette::image_optimize_palette`] that locates the registered
/// handle instead of requiring the caller to thread it through. Callers
/// after convergence call this repeatedly; it performs a single pass.
pub fn pipeline_optimize_palette(
    image: &mut Image,
    fmt: PixelFormat,
    rgb24: &[u8],
    width: u32,
    height: u32,
    seed: u32,
    num_samples: u32,
) -> Result<()> {
    let slot = image.palettes.iter().find(|s| s.fmt == fmt).ok_or_else(|| PipelineError::not_found("no palette stage registered for this format"))?;
    let mut palette = slot.handle.borrow().clone();
    let src_fmt = Format::new(PixelFormat::Rgb24, width, height);
    image_optimize_palette(rgb24, src_fmt, seed, &mut palette, num_samples)?;
    *slot.handle.borrow_mut() = palette;
    Ok(())
}

/// Writes `value` into the shared control registry. Fails if `value`'s
/// variant doesn't match `id`'s (e.g. a scalar into the color matrix slot).
pub fn image_ctrl_value(image: &Image, id: ControlId, value: ControlValue) -> Result<()> {
    image.controls.borrow_mut().set(id, value)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use core_format::Format;
    use core_hostport::StdHostPort;
    use core_stages::{BlackLevelStage, PaletteDecodeStage, PaletteEncodeStage};

    #[test]
    fn run_loop_drains_a_single_black_level_stage_to_completion() {
        let host = StdHostPort::new();
        let fmt = Format::new(PixelFormat::Grey, 4, 2);
        let controls = Rc::new(RefCell::new(Controls::new()));
        let mut image = Image::new(controls.clone());
        let stage = Box::new(BlackLevelStage::new(fmt, controls, 0).unwrap());
        pipeline_add(&mut image, stage, 64);

        let source = [10u8, 20, 30, 40, 50, 60, 70, 80];
        pipeline_process(&mut image, &host, &source).unwrap();

        assert_eq!(image.rings[1].used(), source.len());
        assert_eq!(image.stages[0].base().line_offset, 2);
    }

    #[test]
    fn set_palette_updates_the_shared_handle_every_registered_stage_reads() {
        let mut palette = Palette::new(2);
        palette.colors[0] = [1, 1, 1];
        let shared = Rc::new(RefCell::new(palette));

        let enc_fmt = Format::new(PixelFormat::Rgb24, 1, 1);
        let controls = Rc::new(RefCell::new(Controls::new()));
        let mut image = Image::new(controls);
        let encode = Box::new(PaletteEncodeStage::new(enc_fmt, shared.clone(), 0).unwrap());
        let out_fmt = PixelFormat::Palette(2);
        pipeline_add_palette_stage(&mut image, encode, 64, out_fmt, shared.clone());
        let _decode = PaletteDecodeStage::new(Format::new(out_fmt, 1, 1), shared.clone(), 0).unwrap();

        let mut replacement = Palette::new(2);
        replacement.colors[0] = [9, 9, 9];
        pipeline_set_palette(&mut image, out_fmt, replacement).unwrap();
        assert_eq!(shared.borrow().colors[0], [9, 9, 9]);

        let missing = pipeline_set_palette(&mut image, PixelFormat::Palette(4), Palette::new(4));
        assert!(missing.is_err());
    }
}
