//! The three auto-control algorithms: exposure, black level, and
//! gray-world white balance. Each reads a [`Statistics`] sample and nudges
//! either an [`ExposureDevice`] (exposure, the one control that lives off
//! the [`Controls`] registry since it's a hardware write, not a pipeline
//! tunable) or a [`Controls`] slot (black level, the balance gains).

use core_config::EngineConfig;
use core_control::{ControlId, ControlValue, Controls};
use core_error::Result;
use core_hostport::ExposureDevice;
use core_stats::Statistics;

/// Persistent state auto-exposure carries between frames: the device's
/// current setting and the bounds it was initialized with.
#[derive(Debug, Clone, Copy)]
pub struct AutoExposureState {
    pub current: u32,
    pub max: u32,
    pub target_luma: u8,
}

impl AutoExposureState {
    pub fn new(default: u32, max: u32, target_luma: u8) -> Self {
        Self { current: default.min(max), max, target_luma }
    }
}

fn weighted_mean_luma(stats: &Statistics) -> i32 {
    if stats.y_histogram_total == 0 {
        return stats.target_fallback();
    }
    let mut acc = 0u64;
    for (count, val) in stats.y_histogram.iter().zip(stats.y_histogram_vals.iter()) {
        acc += *count as u64 * *val as u64;
    }
    (acc / stats.y_histogram_total as u64) as i32
}

// Statistics has no inherent notion of a fallback luma; this trait keeps
// the zero-sample edge case local to this module instead of polluting
// the stats type with an auto-exposure-specific concept.
trait FallbackLuma {
    fn target_fallback(&self) -> i32;
}
impl FallbackLuma for Statistics {
    fn target_fallback(&self) -> i32 {
        128
    }
}

/// Adjusts exposure toward `state.target_luma` based on `stats`. Returns
/// whether an adjustment was made (the caller can use this to decide
/// whether a frame is "settled"). A `None` device still updates `state`,
/// useful for hosted tests with no hardware to write to.
pub fn auto_exposure(
    state: &mut AutoExposureState,
    stats: &Statistics,
    config: &EngineConfig,
    device: Option<&mut dyn ExposureDevice>,
) -> Result<bool> {
    let mean = weighted_mean_luma(stats);
    let error = mean - state.target_luma as i32;
    if error.abs() < config.ae_threshold {
        return Ok(false);
    }

    let span = (128 - config.ae_threshold).max(1);
    let over_threshold = (error.unsigned_abs() as i32 - config.ae_threshold).max(0).min(span);
    let rate_span = config.ae_max_rate as i32 - config.ae_min_rate as i32;
    let rate = config.ae_min_rate as i32 + (over_threshold * rate_span) / span;

    let delta = (state.current as i64 * rate as i64) / 100;
    let new_current = if error > 0 {
        state.current.saturating_sub(delta.unsigned_abs() as u32)
    } else {
        ((state.current as i64 + delta).clamp(0, state.max as i64)) as u32
    };
    state.current = new_current.min(state.max);

    if let Some(dev) = device {
        dev.set_exposure(state.current)?;
    }
    log::debug!("auto_exposure: mean={mean} target={} -> exposure={}", state.target_luma, state.current);
    Ok(true)
}

/// Walks the luma histogram from the dark end and treats the first bucket
/// whose cumulative count crosses `config.blc_cumulative_threshold` as the
/// sensor's black floor, writing it to [`ControlId::BlackLevel`]. `stats`
/// is then corrected by subtracting that floor in place, so a caller
/// chaining `auto_exposure`/`auto_white_balance` off the same sample sees
/// black-level-adjusted values rather than the raw, pre-correction ones.
pub fn auto_black_level(stats: &mut Statistics, controls: &mut Controls, config: &EngineConfig) -> Result<()> {
    let mut cumulative = 0u32;
    let mut floor = 0u8;
    for (count, val) in stats.y_histogram.iter().zip(stats.y_histogram_vals.iter()) {
        cumulative += count;
        if cumulative >= config.blc_cumulative_threshold {
            floor = *val;
            break;
        }
    }
    controls.set(ControlId::BlackLevel, ControlValue::Scalar(floor as i32))?;

    for val in stats.y_histogram_vals.iter_mut() {
        *val = val.saturating_sub(floor);
    }
    for c in 0..3 {
        stats.rgb_average[c] = stats.rgb_average[c].saturating_sub(floor as u32);
        stats.rgb_min[c] = stats.rgb_min[c].saturating_sub(floor);
        stats.rgb_max[c] = stats.rgb_max[c].saturating_sub(floor);
    }

    log::debug!("auto_black_level: floor={floor}");
    Ok(())
}

/// Gray-world white balance: assumes the scene averages to neutral gray
/// and derives red/blue gains (in Q.10, matching [`Controls`]'s other
/// scalars) that would pull the red and blue channel averages up to the
/// green channel's. Gains are capped at 4x unity, the same headroom a
/// typical sensor's analog gain stage allows. `stats.rgb_average` is then
/// updated in place to what applying those gains would produce, so a
/// caller reading the sample afterward sees the corrected averages.
pub fn auto_white_balance(stats: &mut Statistics, controls: &mut Controls) -> Result<()> {
    use core_control::Q10_UNITY;
    let [r, g, b] = stats.rgb_average;
    if r == 0 || g == 0 || b == 0 {
        return Ok(());
    }
    let cap = (Q10_UNITY as u64) * 4;
    let red_gain = ((g as u64 * Q10_UNITY as u64) / r as u64).min(cap) as i32;
    let blue_gain = ((g as u64 * Q10_UNITY as u64) / b as u64).min(cap) as i32;
    controls.set(ControlId::RedBalance, ControlValue::Scalar(red_gain))?;
    controls.set(ControlId::BlueBalance, ControlValue::Scalar(blue_gain))?;

    stats.rgb_average[0] = ((r as i64 * red_gain as i64) / Q10_UNITY as i64).clamp(0, 255) as u32;
    stats.rgb_average[2] = ((b as i64 * blue_gain as i64) / Q10_UNITY as i64).clamp(0, 255) as u32;

    log::debug!("auto_white_balance: red_gain={red_gain} blue_gain={blue_gain}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::HISTOGRAM_BUCKETS;

    fn flat_stats(luma: u8, total: u32) -> Statistics {
        let mut y_histogram = [0u32; HISTOGRAM_BUCKETS];
        let mut y_histogram_vals = [0u8; HISTOGRAM_BUCKETS];
        let span = 256 / HISTOGRAM_BUCKETS;
        for (i, v) in y_histogram_vals.iter_mut().enumerate() {
            *v = (i * span + span / 2) as u8;
        }
        let bucket = (luma as usize * HISTOGRAM_BUCKETS / 256).min(HISTOGRAM_BUCKETS - 1);
        y_histogram[bucket] = total;
        Statistics {
            y_histogram,
            y_histogram_vals,
            y_histogram_total: total,
            rgb_average: [luma as u32; 3],
            rgb_min: [luma; 3],
            rgb_max: [luma; 3],
            nvals: total,
        }
    }

    #[test]
    fn exposure_increases_when_scene_is_dark() {
        let config = EngineConfig::default();
        let mut state = AutoExposureState::new(1000, 4000, 128);
        let stats = flat_stats(40, 64);
        let adjusted = auto_exposure(&mut state, &stats, &config, None).unwrap();
        assert!(adjusted);
        assert!(state.current > 1000);
    }

    #[test]
    fn exposure_settles_within_threshold() {
        let config = EngineConfig::default();
        let mut state = AutoExposureState::new(1000, 4000, 128);
        let stats = flat_stats(128, 64);
        let adjusted = auto_exposure(&mut state, &stats, &config, None).unwrap();
        assert!(!adjusted);
        assert_eq!(state.current, 1000);
    }

    #[test]
    fn black_level_picks_the_dark_floor_bucket() {
        let config = EngineConfig::default();
        let mut controls = Controls::new();
        let mut stats = flat_stats(8, 64);
        auto_black_level(&mut stats, &mut controls, &config).unwrap();
        assert!(controls.get(ControlId::BlackLevel).as_scalar().unwrap() < 16);
    }

    #[test]
    fn black_level_correction_carries_into_the_local_statistics() {
        let config = EngineConfig::default();
        let mut controls = Controls::new();
        let mut stats = flat_stats(40, 64);
        auto_black_level(&mut stats, &mut controls, &config).unwrap();
        let floor = controls.get(ControlId::BlackLevel).as_scalar().unwrap() as u8;
        assert!(floor > 0);
        assert_eq!(weighted_mean_luma(&stats), (40i32 - floor as i32).max(0));
    }

    #[test]
    fn white_balance_is_unity_for_a_neutral_scene() {
        let mut controls = Controls::new();
        let mut stats = Statistics {
            rgb_average: [120, 120, 120],
            ..flat_stats(120, 64)
        };
        auto_white_balance(&mut stats, &mut controls).unwrap();
        assert_eq!(controls.get(ControlId::RedBalance).as_scalar(), Some(core_control::Q10_UNITY));
        assert_eq!(controls.get(ControlId::BlueBalance).as_scalar(), Some(core_control::Q10_UNITY));
        assert_eq!(stats.rgb_average, [120, 120, 120]);
    }

    #[test]
    fn white_balance_correction_pulls_the_local_average_toward_green() {
        let mut controls = Controls::new();
        let mut stats = Statistics {
            rgb_average: [60, 120, 30],
            ..flat_stats(120, 64)
        };
        auto_white_balance(&mut stats, &mut controls).unwrap();
        assert_eq!(stats.rgb_average[1], 120);
        assert!((stats.rgb_average[0] as i32 - 120).abs() <= 1);
        assert!((stats.rgb_average[2] as i32 - 120).abs() <= 1);
    }
}
