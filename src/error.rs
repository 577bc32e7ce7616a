use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::job::JobStatus;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Frame interval must be greater than zero (got {0}).")]
    InvalidInterval(f64),

    #[error("{tool} was not found. Install it or put it on PATH.")]
    ToolNotFound { tool: String },

    #[error("Error probing {path:?}: {msg}")]
    MediaProbe { path: PathBuf, msg: String },

    #[error("Converting {path:?} failed: {}", exit_description(.code))]
    ExternalProcess { path: PathBuf, code: Option<i32> },

    #[error("Job cannot move from {from:?} to {to:?}.")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Job(String),
}

impl JobError {
    pub fn configuration(msg: &str) -> Self {
        JobError::Configuration(String::from(msg))
    }

    pub fn probe_for_file(path: &Path, msg: &str) -> Self {
        JobError::MediaProbe {
            path: PathBuf::from(path),
            msg: String::from(msg),
        }
    }

    pub fn process_for_file(path: &Path, code: Option<i32>) -> Self {
        JobError::ExternalProcess {
            path: PathBuf::from(path),
            code,
        }
    }
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("ffmpeg exited with {code}"),
        None => String::from("ffmpeg was terminated by a signal"),
    }
}
