use std::time::Duration;

use chrono::{DateTime, Local};

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressState {
    pub total_frames: u64,
    pub processed_frames: u64,
    /// 0 when the total is unknown (zero).
    pub progress_percent: f64,
    pub elapsed: Duration,
    /// Unknown until at least one frame has been written.
    pub estimated_total: Option<Duration>,
    pub estimated_completion: Option<DateTime<Local>>,
}

impl ProgressState {
    pub fn estimated_remaining(&self) -> Option<Duration> {
        self.estimated_total.map(|total| total.saturating_sub(self.elapsed))
    }
}

pub fn update(processed_frames: u64, total_frames: u64, elapsed: Duration) -> ProgressState {
    update_at(processed_frames, total_frames, elapsed, Local::now())
}

/// Extrapolates the observed time per frame over `total_frames`.
pub fn update_at(
    processed_frames: u64,
    total_frames: u64,
    elapsed: Duration,
    now: DateTime<Local>,
) -> ProgressState {
    let progress_percent = match total_frames {
        0 => 0.0,
        _ => f64::min(100.0, (processed_frames as f64) / (total_frames as f64) * 100.0),
    };

    let estimated_total = match processed_frames {
        0 => None,
        _ => Duration::try_from_secs_f64(
            elapsed.as_secs_f64() * (total_frames as f64) / (processed_frames as f64),
        )
        .ok(),
    };

    let estimated_completion = estimated_total.and_then(|total| {
        let remaining = chrono::Duration::from_std(total.saturating_sub(elapsed)).ok()?;
        now.checked_add_signed(remaining)
    });

    ProgressState {
        total_frames,
        processed_frames,
        progress_percent,
        elapsed,
        estimated_total,
        estimated_completion,
    }
}
