//! The tagged error set shared by every crate in the pipeline engine.
//!
//! `WouldBlock` is the cooperative suspension signal (`-EAGAIN` in the
//! errno-flavored vocabulary the rest of the engine's documentation uses)
//! and is expected to be swallowed by the scheduler; every other variant is
//! a real failure that aborts the run in progress.

use std::fmt;

/// Errno-style failure tag. See the crate-level docs for the swallow policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    WouldBlock,
    InvalidArgument,
    Unsupported,
    OutOfMemory,
    Io,
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::WouldBlock => "would block (-EAGAIN)",
            ErrorKind::InvalidArgument => "invalid argument (-EINVAL)",
            ErrorKind::Unsupported => "unsupported (-ENOTSUP)",
            ErrorKind::OutOfMemory => "out of memory (-ENOMEM)",
            ErrorKind::Io => "io error (-EIO)",
            ErrorKind::NotFound => "not found (-ENOENT)",
        };
        f.write_str(s)
    }
}

/// The error type returned across the engine's public API.
///
/// `stage` is filled in by callers close to the failure (an op's `run_K`,
/// the scheduler) so a front end can report "which stage broke" without the
/// engine depending on any particular diagnostic format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub stage: Option<&'static str>,
    pub detail: Option<String>,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(stage) = self.stage {
            write!(f, " in {stage}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, stage: None, detail: None }
    }

    pub fn would_block() -> Self {
        Self::new(ErrorKind::WouldBlock)
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self { kind: ErrorKind::InvalidArgument, stage: None, detail: Some(detail.into()) }
    }

    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Unsupported, stage: None, detail: Some(detail.into()) }
    }

    pub fn out_of_memory() -> Self {
        Self::new(ErrorKind::OutOfMemory)
    }

    pub fn io(detail: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, stage: None, detail: Some(detail.into()) }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self { kind: ErrorKind::NotFound, stage: None, detail: Some(detail.into()) }
    }

    /// Attach the name of the stage that raised the error. Used by the
    /// scheduler so a front end can build a `strerror`-style diagnostic
    /// without the engine formatting one itself.
    pub fn at_stage(mut self, stage: &'static str) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn is_would_block(&self) -> bool {
        self.kind == ErrorKind::WouldBlock
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_recognized() {
        let e = PipelineError::would_block();
        assert!(e.is_would_block());
        assert!(!PipelineError::out_of_memory().is_would_block());
    }

    #[test]
    fn stage_annotation_shows_in_display() {
        let e = PipelineError::invalid_argument("bad width").at_stage("crop");
        let s = e.to_string();
        assert!(s.contains("crop"));
    }
}
