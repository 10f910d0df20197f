//! Named control slots threaded from the auto-control algorithms to the
//! stages that consume them.
//!
//! A handful of values (black level, gamma, the white-balance gains, JPEG
//! quality, the color matrix) are written by one part of the pipeline and
//! read by another, and nothing else in the engine needs to know their
//! names — [`ControlId`] is the one tagged enum both sides match on, rather
//! than either side reaching for a stringly-typed lookup.

use core_error::{PipelineError, Result};

/// A single tunable control slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlId {
    BlackLevel,
    Gamma,
    RedBalance,
    BlueBalance,
    JpegQuality,
    ColorMatrix,
}

/// The value stored in a control slot. Most slots are a plain scalar; the
/// color matrix is the one 3x3-int exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlValue {
    Scalar(i32),
    Matrix([[i32; 3]; 3]),
}

impl ControlValue {
    pub fn as_scalar(self) -> Option<i32> {
        match self {
            ControlValue::Scalar(v) => Some(v),
            ControlValue::Matrix(_) => None,
        }
    }

    pub fn as_matrix(self) -> Option<[[i32; 3]; 3]> {
        match self {
            ControlValue::Matrix(m) => Some(m),
            ControlValue::Scalar(_) => None,
        }
    }
}

/// Unity gain in Q.10 (10 fractional bits): `1024` represents a `1.0` scale
/// factor for the white-balance gains and the color matrix.
pub const Q10_UNITY: i32 = 1024;

const IDENTITY_MATRIX: [[i32; 3]; 3] = [[Q10_UNITY, 0, 0], [0, Q10_UNITY, 0], [0, 0, Q10_UNITY]];

/// Registry of every control slot, with defaults chosen so a pipeline that
/// never touches auto-control still runs: no black-level offset, unity
/// gamma, unity white balance (Q.10), a fixed JPEG quality, and an identity
/// color matrix (Q.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    black_level: i32,
    /// Gamma level: the curve applies exponent `level/16`, so `16` is unity
    /// (a straight line) and larger levels darken midtones. Unlike the
    /// balance gains this isn't Q.10 scaled.
    gamma: i32,
    red_balance: i32,
    blue_balance: i32,
    jpeg_quality: i32,
    color_matrix: [[i32; 3]; 3],
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            black_level: 0,
            gamma: 16, // unity: level/16 == 1
            red_balance: Q10_UNITY,
            blue_balance: Q10_UNITY,
            jpeg_quality: 85,
            color_matrix: IDENTITY_MATRIX,
        }
    }
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ControlId) -> ControlValue {
        match id {
            ControlId::BlackLevel => ControlValue::Scalar(self.black_level),
            ControlId::Gamma => ControlValue::Scalar(self.gamma),
            ControlId::RedBalance => ControlValue::Scalar(self.red_balance),
            ControlId::BlueBalance => ControlValue::Scalar(self.blue_balance),
            ControlId::JpegQuality => ControlValue::Scalar(self.jpeg_quality),
            ControlId::ColorMatrix => ControlValue::Matrix(self.color_matrix),
        }
    }

    pub fn set(&mut self, id: ControlId, value: ControlValue) -> Result<()> {
        match (id, value) {
            (ControlId::BlackLevel, ControlValue::Scalar(v)) => self.black_level = v,
            (ControlId::Gamma, ControlValue::Scalar(v)) => self.gamma = v,
            (ControlId::RedBalance, ControlValue::Scalar(v)) => self.red_balance = v,
            (ControlId::BlueBalance, ControlValue::Scalar(v)) => self.blue_balance = v,
            (ControlId::JpegQuality, ControlValue::Scalar(v)) => self.jpeg_quality = v,
            (ControlId::ColorMatrix, ControlValue::Matrix(m)) => self.color_matrix = m,
            (id, _) => {
                return Err(PipelineError::invalid_argument(format!(
                    "value shape does not match control {id:?}"
                )))
            }
        }
        log::debug!("control {id:?} updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_neutral() {
        let c = Controls::new();
        assert_eq!(c.get(ControlId::Gamma).as_scalar(), Some(16));
        assert_eq!(c.get(ControlId::RedBalance).as_scalar(), Some(Q10_UNITY));
        assert_eq!(c.get(ControlId::ColorMatrix).as_matrix(), Some(IDENTITY_MATRIX));
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut c = Controls::new();
        c.set(ControlId::BlackLevel, ControlValue::Scalar(12)).unwrap();
        assert_eq!(c.get(ControlId::BlackLevel).as_scalar(), Some(12));
    }

    #[test]
    fn mismatched_value_shape_is_rejected() {
        let mut c = Controls::new();
        let err = c.set(ControlId::Gamma, ControlValue::Matrix(IDENTITY_MATRIX));
        assert!(err.is_err());
    }
}
