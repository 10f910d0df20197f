//! Public facade: re-exports every piece a caller needs to build a
//! pipeline (formats, the host port, the stage library, the scheduler,
//! the palette optimizer, and the auto-control algorithms) from one
//! crate, so an embedder depends on `imgpipe` alone rather than the full
//! set of `core-*` crates individually.

pub use core_autoctl::{auto_black_level, auto_exposure, auto_white_balance, AutoExposureState};
pub use core_config::{EngineConfig, HISTOGRAM_BUCKETS};
pub use core_control::{ControlId, ControlValue, Controls, Q10_UNITY};
pub use core_error::{ErrorKind, PipelineError, Result};
pub use core_format::{BayerPhase, FourCc, Format, Palette, PixelFormat};
pub use core_hostport::{ExposureDevice, HostPort, MemSource, StdHostPort};
pub use core_op::{OpBase, OpKind, Operation};
pub use core_palette::{image_optimize_palette, nearest_color_index, palette_decode_index, palette_encode_pixel};
pub use core_pipeline::{
    image_ctrl_value, pipeline_add, pipeline_add_palette_stage, pipeline_get_palette_fourcc, pipeline_optimize_palette,
    pipeline_process, pipeline_run_loop, pipeline_run_once, pipeline_set_palette, Image,
};
pub use core_ring::Ring;
pub use core_stages::{
    BlackLevelStage, CallbackSink, CallbackStage, ColorMatrixStage, ConvertStage, CropRect, CropStage, Debayer1x1Stage, Debayer3x3Stage,
    GammaStage, JpegEncodeStage, JpegEntropyCoder, KernelConvolveStage, KernelDenoiseStage, KernelType, NullEntropyCoder, PaletteDecodeStage,
    PaletteEncodeStage, QoiEncodeStage, ResizeStage, SharedControls, SharedPalette, WhiteBalanceStage, MCU_ROWS,
};
pub use core_stats::{sample_random_rgb, stats_from_buf, Lcg, Statistics};
