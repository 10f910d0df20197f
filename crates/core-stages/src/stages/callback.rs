//! Terminal callback stage: hands a contiguous buffer to a host sink once
//! at least `threshold` bytes have accumulated, then drains exactly that
//! much from its input ring. It never writes to an output ring — it's the
//! end of a chain.

use core_error::Result;
use core_format::Format;
use core_hostport::HostPort;
use core_op::{input_bytes, input_done, OpBase, OpKind, Operation};
use core_ring::Ring;

/// The opaque host-side consumer. Kept as a trait object rather than a
/// generic so a chain's stage list can stay a plain `Vec<Box<dyn Operation>>`
/// without threading the sink's concrete type through it.
pub trait CallbackSink {
    /// Returns whether the buffer was accepted. Rejecting leaves the bytes
    /// in the ring for a later retry instead of dropping them.
    fn consume(&mut self, bytes: &[u8]) -> bool;
}

pub struct CallbackStage {
    base: OpBase,
    sink: Box<dyn CallbackSink>,
    threshold: usize,
}

impl CallbackStage {
    pub fn new(fmt: Format, sink: Box<dyn CallbackSink>, threshold: usize, input: usize) -> Self {
        Self { base: OpBase::new(OpKind::Callback, fmt, input), sink, threshold }
    }
}

impl Operation for CallbackStage {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn step(&mut self, input: &mut Ring, _output: &mut Ring, _host: &dyn HostPort) -> Result<()> {
        let buf = input_bytes(input, self.threshold)?;
        if self.sink.consume(&buf) {
            input_done(input, self.threshold);
            self.base.lines_in += 0;
            self.base.bytes_in += self.threshold as u64;
            self.base.bytes_out += self.threshold as u64;
        } else {
            input.reset_peek();
            self.base.note_suspend();
        }
        Ok(())
    }
}
