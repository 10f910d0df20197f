//! The concrete stage library: one [`core_op::Operation`] impl per pixel
//! transform the engine knows about, grouped by what they do to a frame
//! rather than by pixel format. `pixelconv` is the one module that's just
//! functions (no `Operation`) — it's the per-pixel codec `convert` and
//! `qoi`/`palette` build on top of, not a stage in its own right.

pub mod stages;

pub use stages::callback::{CallbackSink, CallbackStage};
pub use stages::convert::ConvertStage;
pub use stages::correct::{BlackLevelStage, ColorMatrixStage, GammaStage, SharedControls, WhiteBalanceStage};
pub use stages::debayer::{Debayer1x1Stage, Debayer3x3Stage};
pub use stages::geometry::{CropRect, CropStage, ResizeStage};
pub use stages::jpeg::{JpegEncodeStage, JpegEntropyCoder, NullEntropyCoder, MCU_ROWS};
pub use stages::kernel::{KernelConvolveStage, KernelDenoiseStage, KernelType};
pub use stages::palette::{PaletteDecodeStage, PaletteEncodeStage, SharedPalette};
pub use stages::qoi::QoiEncodeStage;
