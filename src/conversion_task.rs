use std::path::{Path, PathBuf};

use crate::job::{ImageFormat, Job};
use crate::presets::Transform;

/// One ffmpeg invocation: a single input rendered in a single direction.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionTask {
    pub input: PathBuf,
    pub transform: Transform,
    pub transform_index: usize,
    pub output_dir: PathBuf,
    pub format: ImageFormat,
    pub output_rate: f64,
}

impl ConversionTask {
    /// `<tag>_ot_<index>_`, shared by every frame this task writes.
    pub fn file_prefix(&self) -> String {
        format!("{}_ot_{}_", input_tag(&self.input), self.transform_index)
    }

    /// Output path with ffmpeg's `%04d` frame placeholder.
    pub fn output_pattern(&self) -> PathBuf {
        self.output_dir.join(format!("{}%04d.{}", self.file_prefix(), self.format.extension()))
    }

    pub fn output_file_name(&self, frame: u64) -> String {
        output_file_name(&self.input, self.transform_index, frame, self.format)
    }
}

/// Last three characters of the input's file stem (the whole stem if shorter).
pub fn input_tag(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let chars: Vec<char> = stem.chars().collect();
    chars[chars.len().saturating_sub(3)..].iter().collect()
}

pub fn output_file_name(input: &Path, transform_index: usize, frame: u64, format: ImageFormat) -> String {
    format!("{}_ot_{}_{:04}.{}", input_tag(input), transform_index, frame, format.extension())
}

/// Input-major, transform-minor.
pub fn build_tasks(job: &Job, inputs: &[PathBuf]) -> Vec<ConversionTask> {
    inputs
        .iter()
        .flat_map(|input| {
            job.preset
                .transforms
                .iter()
                .enumerate()
                .map(move |(transform_index, transform)| ConversionTask {
                    input: input.clone(),
                    transform: *transform,
                    transform_index,
                    output_dir: job.output_dir.clone(),
                    format: job.format,
                    output_rate: job.output_rate(),
                })
        })
        .collect()
}
