//! The host port: the one interface the engine asks a target to provide.
//!
//! Everything else in the engine is portable `no_std`-flavored Rust written
//! against the standard collections; allocation, timekeeping, and (optional)
//! exposure device control are the three things that genuinely differ
//! between a hosted development build and a board-specific firmware image,
//! so they are pulled behind this trait rather than called directly.

use core_error::Result;

/// Identifies which pool a buffer was allocated from, so a `free` never
/// releases memory the engine does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemSource {
    /// A buffer supplied by the caller (e.g. the source image). The engine
    /// must never hand these to `free`.
    User,
    /// A buffer the engine allocated for itself (a stage's ring, scratch
    /// space for the palette optimizer).
    Engine,
}

/// A device capable of being told an exposure level. Kept separate from
/// [`HostPort`] since most targets (and every hosted test) have no such
/// device; `auto_exposure` treats it as optional.
pub trait ExposureDevice {
    fn init_exposure(&mut self, default: u32, max: u32) -> Result<()>;
    fn set_exposure(&mut self, value: u32) -> Result<()>;
}

/// The target-specific services the engine needs.
pub trait HostPort {
    /// Allocate a zeroed buffer of `size` bytes from the given pool.
    fn alloc(&self, size: usize, source: MemSource) -> Result<Vec<u8>>;

    /// Release a buffer previously returned by `alloc`. The default
    /// implementation relies on `Vec`'s own `Drop`; targets with a custom
    /// allocator (an arena, a fixed pool) override this to reclaim the
    /// region explicitly. Never called with a `MemSource::User` buffer.
    fn free(&self, _buf: Vec<u8>, _source: MemSource) {}

    /// Monotonic microsecond clock. Wraparound is tolerated by every caller.
    fn uptime_us(&self) -> u32;
}

/// Hosted (`std`) implementation used for development and tests. Not the
/// product surface: a firmware target supplies its own `HostPort`.
#[derive(Debug)]
pub struct StdHostPort {
    start: std::time::Instant,
}

impl Default for StdHostPort {
    fn default() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

impl StdHostPort {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostPort for StdHostPort {
    fn alloc(&self, size: usize, source: MemSource) -> Result<Vec<u8>> {
        log::trace!("hostport: alloc {size} bytes ({source:?})");
        Ok(vec![0u8; size])
    }

    fn uptime_us(&self) -> u32 {
        self.start.elapsed().as_micros() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_zeroed_buffer_of_requested_size() {
        let port = StdHostPort::new();
        let buf = port.alloc(128, MemSource::Engine).unwrap();
        assert_eq!(buf.len(), 128);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn uptime_is_monotonic() {
        let port = StdHostPort::new();
        let a = port.uptime_us();
        std::thread::sleep(std::time::Duration::from_micros(50));
        let b = port.uptime_us();
        assert!(b >= a);
    }
}
