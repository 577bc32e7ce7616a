use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json;
use tracing::debug;

use crate::error::JobError;
use crate::probe::{MediaInfo, MediaProbe, Resolution};

#[derive(Serialize, Deserialize, Debug)]
struct FFProbeJsonOutput {
    pub streams: Vec<FFProbeJsonStream>,
    pub format: Option<FFProbeJsonFormat>,
}

#[derive(Serialize, Deserialize, Debug)]
struct FFProbeJsonStream {
    pub codec_name: Option<String>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub avg_frame_rate: Option<String>,
    pub r_frame_rate: Option<String>,
    pub nb_frames: Option<String>,
    pub duration: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
struct FFProbeJsonFormat {
    pub duration: Option<String>,
}

/// `MediaProbe` backed by the ffprobe command line tool.
pub struct FFprobe {
    binary: PathBuf,
}

impl FFprobe {
    pub fn new(binary: PathBuf) -> Self {
        FFprobe { binary }
    }
}

impl MediaProbe for FFprobe {
    fn probe(&self, path: &Path) -> Result<MediaInfo, JobError> {
        let output = Command::new(&self.binary)
            .args([
                Path::new("-v"),
                Path::new("error"),
                Path::new("-of"),
                Path::new("json"),
                Path::new("-show_streams"),
                Path::new("-show_format"),
                Path::new("-select_streams"),
                Path::new("v:0"),
                path,
            ])
            .output()
            .map_err(|e| JobError::probe_for_file(path, &format!("unable to run ffprobe: {e}")))?;
        if !output.status.success() {
            return Err(JobError::probe_for_file(path, "ffprobe did not exit successfully."));
        }
        let utf8 = String::from_utf8(output.stdout)
            .map_err(|_| JobError::probe_for_file(path, "ffprobe output is not utf-8."))?;
        let info = parse_ffprobe_json(path, &utf8)?;
        debug!("probed {:?}: {} @ {:.3} fps, {} frames", path, info.resolution, info.fps, info.frame_count);
        Ok(info)
    }
}

fn parse_ffprobe_json(path: &Path, json: &str) -> Result<MediaInfo, JobError> {
    let deserialized = serde_json::from_str::<FFProbeJsonOutput>(json)
        .map_err(|e| JobError::probe_for_file(path, &format!("unexpected ffprobe output: {e}")))?;
    let Some(stream) = deserialized.streams.first() else {
        return Err(JobError::probe_for_file(path, "no video stream."));
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(|rate| get_frame_rate(path, rate).ok())
        .or_else(|| stream.r_frame_rate.as_deref().and_then(|rate| get_frame_rate(path, rate).ok()))
        .ok_or_else(|| JobError::probe_for_file(path, "no usable frame rate."))?;

    let duration = stream
        .duration
        .as_deref()
        .or_else(|| deserialized.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok());

    let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
        Some(frames) => frames,
        None => match duration {
            Some(seconds) => (seconds * fps).round() as u64,
            None => return Err(JobError::probe_for_file(path, "neither frame count nor duration is known.")),
        },
    };

    Ok(MediaInfo {
        fps,
        frame_count,
        resolution: Resolution {
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
        },
    })
}

fn get_frame_rate(path: &Path, rate: &str) -> Result<f64, JobError> {
    let splits: Vec<&str> = rate.split('/').collect();
    match splits.len() {
        2 => {
            let Ok(num) = splits[0].parse::<f64>() else {
                return Err(JobError::probe_for_file(path, &format!("numerator '{}' from '{}' is not a number.", splits[0], rate)));
            };
            let Ok(denom) = splits[1].parse::<f64>() else {
                return Err(JobError::probe_for_file(path, &format!("denominator '{}' from '{}' is not a number.", splits[1], rate)));
            };
            if num > 0.0 && denom > 0.0 {
                Ok(num / denom)
            } else {
                Err(JobError::probe_for_file(path, &format!("'{}' is not a usable frame rate.", rate)))
            }
        },
        _ => Err(JobError::probe_for_file(path, &format!("Unexpected frame rate format: '{}'", rate))),
    }
}
