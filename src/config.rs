use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// What to do with an input whose metadata cannot be read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailurePolicy {
    /// Leave it out of the frame estimate but still try to convert it.
    #[default]
    EstimateOnly,
    /// Leave it out of the estimate and skip its conversions.
    Exclude,
}

/// Where processed-frame counts come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressSource {
    /// The converter's own frame counter, falling back to counting files.
    #[default]
    Auto,
    /// Always count files in the output directory.
    Directory,
}

/// Files a task would write that already exist before it starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleOutputs {
    #[default]
    Keep,
    Remove,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub output_size: u32,
    pub h_fov: f64,
    pub v_fov: f64,
    pub software_decode_min_width: u64,
    pub hwaccel: String,
    pub overwrite: bool,
    pub poll_interval_ms: u64,
    pub max_concurrent_conversions: usize,
    pub probe_failure_policy: ProbeFailurePolicy,
    pub progress_source: ProgressSource,
    pub stale_outputs: StaleOutputs,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ffmpeg: String::from("ffmpeg"),
            ffprobe: String::from("ffprobe"),
            output_size: 1600,
            h_fov: 90.0,
            v_fov: 90.0,
            software_decode_min_width: 4096,
            hwaccel: String::from("cuda"),
            overwrite: true,
            poll_interval_ms: 100,
            max_concurrent_conversions: 1,
            probe_failure_policy: ProbeFailurePolicy::default(),
            progress_source: ProgressSource::default(),
            stale_outputs: StaleOutputs::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, JobError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| JobError::Configuration(format!("{path:?}: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self, JobError> {
        let settings: Settings = serde_json::from_str(json)
            .map_err(|e| JobError::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.output_size == 0 {
            return Err(JobError::configuration("output_size must be greater than zero."));
        }
        if !(self.h_fov > 0.0 && self.v_fov > 0.0) {
            return Err(JobError::configuration("h_fov and v_fov must be greater than zero."));
        }
        if self.poll_interval_ms == 0 {
            return Err(JobError::configuration("poll_interval_ms must be greater than zero."));
        }
        if self.max_concurrent_conversions == 0 {
            return Err(JobError::configuration("max_concurrent_conversions must be at least 1."));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
