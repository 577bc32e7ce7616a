use std::collections::HashSet;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::presets::DirectionPreset;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpg,
    Png,
}

impl FromStr for ImageFormat {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "png" => Ok(ImageFormat::Png),
            _ => Err(JobError::Configuration(format!("Unsupported image format: {s}."))),
        }
    }
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed)
    }

    fn can_become(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Idle, Running) => true,
            (Running, Cancelling) | (Running, Completed) | (Running, Failed) => true,
            (Cancelling, Cancelled) | (Cancelling, Failed) => true,
            (Completed | Cancelled | Failed, Idle) => true,
            _ => false,
        }
    }
}

/// What the caller asks for; validated into a `Job` by `Job::new`.
#[derive(Clone, Debug)]
pub struct JobRequest {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub interval_seconds: f64,
    pub format: ImageFormat,
    pub preset_id: String,
}

#[derive(Clone, Debug)]
pub struct Job {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub interval_seconds: f64,
    pub format: ImageFormat,
    pub preset: DirectionPreset,
    status: JobStatus,
}

impl Job {
    pub fn new(request: JobRequest) -> Result<Self, JobError> {
        let inputs = dedup_inputs(request.inputs);
        if inputs.is_empty() {
            return Err(JobError::configuration("Select at least one input file."));
        }
        if request.output_dir.as_os_str().is_empty() {
            return Err(JobError::configuration("Select an output directory."));
        }
        if !(request.interval_seconds > 0.0) || !request.interval_seconds.is_finite() {
            return Err(JobError::InvalidInterval(request.interval_seconds));
        }
        let preset = DirectionPreset::resolve(&request.preset_id);
        if preset.is_empty() {
            return Err(JobError::Configuration(format!("Unknown direction preset {:?}.", request.preset_id)));
        }

        Ok(Job {
            inputs,
            output_dir: request.output_dir,
            interval_seconds: request.interval_seconds,
            format: request.format,
            preset,
            status: JobStatus::Idle,
        })
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub(crate) fn transition(&mut self, next: JobStatus) -> Result<(), JobError> {
        if self.status.can_become(next) {
            self.status = next;
            Ok(())
        } else {
            Err(JobError::InvalidTransition { from: self.status, to: next })
        }
    }

    /// Output frame rate handed to ffmpeg, one frame every `interval_seconds`.
    pub fn output_rate(&self) -> f64 {
        1.0 / self.interval_seconds
    }
}

fn dedup_inputs(inputs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    inputs
        .into_iter()
        .filter(|p| !p.as_os_str().is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
