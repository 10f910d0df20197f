//! The byte ring buffer that sits between adjacent pipeline stages.
//!
//! A stage writes finished output lines in here; the next stage peeks ahead
//! to decide whether it has enough buffered to make progress, then commits
//! the read once it actually consumes the bytes. Peeking and reading are
//! deliberately separate operations (mirroring an acquire/commit split
//! rather than a single destructive read) so a stage can look at more than
//! one line's worth of data before deciding it has enough to run.

use core_error::{PipelineError, Result};
use core_hostport::{HostPort, MemSource};

/// A fixed-capacity circular byte buffer.
///
/// `tail` marks the oldest unread byte, `head` the next byte to be written.
/// `peek_offset` is a second read cursor, relative to `tail`, that advances
/// on [`Ring::peek`] without consuming anything; [`Ring::reset_peek`] rewinds
/// it back to `tail` and [`Ring::read`] (which does consume) clears it too.
pub struct Ring {
    buf: Vec<u8>,
    capacity: usize,
    head: usize,
    tail: usize,
    len: usize,
    peek_offset: usize,
    total_written: u64,
    total_read: u64,
}

impl Ring {
    pub fn alloc(host: &dyn HostPort, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::invalid_argument("ring capacity must be nonzero"));
        }
        let buf = host.alloc(capacity, MemSource::Engine)?;
        Ok(Self {
            buf,
            capacity,
            head: 0,
            tail: 0,
            len: 0,
            peek_offset: 0,
            total_written: 0,
            total_read: 0,
        })
    }

    pub fn free(self, host: &dyn HostPort) {
        host.free(self.buf, MemSource::Engine);
    }

    /// Copies as much of `data` as fits into free space. Returns the number
    /// of bytes actually written; a short write means the ring is full and
    /// the caller should suspend until the consumer drains it.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free_size());
        for &byte in &data[..n] {
            self.buf[self.head] = byte;
            self.head = (self.head + 1) % self.capacity;
        }
        self.len += n;
        self.total_written += n as u64;
        n
    }

    /// Consumes up to `out.len()` buffered bytes, dropping any outstanding
    /// peek position since it no longer refers to unread data.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        for slot in out.iter_mut().take(n) {
            *slot = self.buf[self.tail];
            self.tail = (self.tail + 1) % self.capacity;
        }
        self.len -= n;
        self.peek_offset = 0;
        self.total_read += n as u64;
        n
    }

    /// Copies up to `out.len()` bytes starting from the current peek cursor
    /// without consuming them. Repeated calls advance the cursor, so a
    /// stage can peek a header then peek the payload that follows it.
    pub fn peek(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.peek_size());
        let mut pos = (self.tail + self.peek_offset) % self.capacity;
        for slot in out.iter_mut().take(n) {
            *slot = self.buf[pos];
            pos = (pos + 1) % self.capacity;
        }
        self.peek_offset += n;
        n
    }

    /// Rewinds the peek cursor back to the oldest unread byte.
    pub fn reset_peek(&mut self) {
        self.peek_offset = 0;
    }

    /// Drops `n` bytes already inspected via [`Ring::peek`] without copying
    /// them out. Used once a stage has decided a peeked region is safe to
    /// discard (e.g. a stage's own scratch copy already holds it).
    pub fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.len);
        self.tail = (self.tail + n) % self.capacity;
        self.len -= n;
        self.peek_offset = self.peek_offset.saturating_sub(n);
        self.total_read += n as u64;
        n
    }

    /// Bytes currently buffered and unread.
    pub fn used(&self) -> usize {
        self.len
    }

    /// Free capacity available to [`Ring::write`].
    pub fn free_size(&self) -> usize {
        self.capacity - self.len
    }

    /// Bytes still reachable by [`Ring::peek`] beyond the current cursor.
    pub fn peek_size(&self) -> usize {
        self.len - self.peek_offset
    }

    /// Lifetime count of bytes ever written into the ring.
    pub fn total_used(&self) -> u64 {
        self.total_written
    }

    /// Lifetime count of bytes ever consumed from the ring via [`Ring::read`].
    pub fn total_free(&self) -> u64 {
        self.total_read
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_hostport::StdHostPort;

    #[test]
    fn write_then_read_round_trips() {
        let host = StdHostPort::new();
        let mut ring = Ring::alloc(&host, 8).unwrap();
        assert_eq!(ring.write(b"abcd"), 4);
        assert_eq!(ring.used(), 4);
        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(&out, b"abcd");
        assert!(ring.is_empty());
    }

    #[test]
    fn write_short_when_nearly_full() {
        let host = StdHostPort::new();
        let mut ring = Ring::alloc(&host, 4).unwrap();
        assert_eq!(ring.write(b"abc"), 3);
        assert_eq!(ring.write(b"xyz"), 1);
        assert!(ring.is_full());
    }

    #[test]
    fn peek_does_not_consume() {
        let host = StdHostPort::new();
        let mut ring = Ring::alloc(&host, 8).unwrap();
        ring.write(b"abcd");
        let mut out = [0u8; 2];
        assert_eq!(ring.peek(&mut out), 2);
        assert_eq!(&out, b"ab");
        assert_eq!(ring.used(), 4); // peek doesn't drain
        assert_eq!(ring.peek_size(), 2);
        ring.reset_peek();
        assert_eq!(ring.peek_size(), 4);
    }

    #[test]
    fn wraps_around_the_backing_buffer() {
        let host = StdHostPort::new();
        let mut ring = Ring::alloc(&host, 4).unwrap();
        ring.write(b"ab");
        let mut out = [0u8; 2];
        ring.read(&mut out);
        ring.write(b"cdef");
        let mut rest = [0u8; 4];
        assert_eq!(ring.read(&mut rest), 4);
        assert_eq!(&rest, b"cdef");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let host = StdHostPort::new();
        assert!(Ring::alloc(&host, 0).is_err());
    }
}
