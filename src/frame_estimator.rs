//! Expected output-frame count for a whole job.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::JobError;
use crate::probe::MediaProbe;

/// Absorbs float error in `duration / interval` (0.3 / 0.1 must give 3).
const FLOOR_EPSILON: f64 = 1e-9;

#[derive(Debug, Default)]
pub struct FrameEstimate {
    pub total_frames: u64,
    /// Inputs that probed successfully, in the order given.
    pub probed: Vec<PathBuf>,
    /// Inputs that could not be probed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Frames one input yields per direction: `floor(duration / interval)`.
/// `None` when the count does not fit in a `u64`.
pub fn frames_per_direction(duration_seconds: f64, interval_seconds: f64) -> Option<u64> {
    if !(duration_seconds > 0.0) {
        return Some(0);
    }
    let frames = (duration_seconds / interval_seconds + FLOOR_EPSILON).floor();
    if !frames.is_finite() || frames >= u64::MAX as f64 {
        return None;
    }
    Some(frames as u64)
}

/// Sums `floor(duration / interval) * transform_count` over every input.
/// Inputs that fail to probe contribute nothing and are listed in
/// `FrameEstimate::failed` instead of failing the estimate. An interval so
/// small that the count overflows is rejected as `InvalidInterval`.
pub fn estimate(
    probe: &dyn MediaProbe,
    inputs: &[PathBuf],
    interval_seconds: f64,
    transform_count: usize,
) -> Result<FrameEstimate, JobError> {
    if !(interval_seconds > 0.0) || !interval_seconds.is_finite() {
        return Err(JobError::InvalidInterval(interval_seconds));
    }

    let mut result = FrameEstimate::default();
    for input in inputs {
        match probe_duration(probe, input) {
            Ok(duration) => {
                result.total_frames = frames_per_direction(duration, interval_seconds)
                    .and_then(|frames| frames.checked_mul(transform_count as u64))
                    .and_then(|frames| result.total_frames.checked_add(frames))
                    .ok_or(JobError::InvalidInterval(interval_seconds))?;
                result.probed.push(input.clone());
            },
            Err(err) => {
                warn!("leaving {:?} out of the frame estimate: {}", input, err);
                result.failed.push((input.clone(), err.to_string()));
            },
        }
    }
    Ok(result)
}

fn probe_duration(probe: &dyn MediaProbe, input: &Path) -> Result<f64, JobError> {
    probe
        .probe(input)?
        .duration_seconds()
        .ok_or_else(|| JobError::probe_for_file(input, "frame rate is zero."))
}
