use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::conversion_task::ConversionTask;
use crate::converter::{ConversionProcess, Converter, ProcessState};
use crate::error::JobError;
use crate::ffmpeg::FFmpegTool;
use crate::job::ImageFormat;
use crate::probe::MediaProbe;

const STDERR_TAIL_LINES: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acceleration {
    /// CPU decode; used for inputs wider than the hardware decoder handles.
    Software,
    /// GPU decode, frames downloaded to system memory before filtering.
    Hardware,
}

/// Decided once per task from the probed input width. An unknown width is
/// treated as small.
pub fn select_acceleration(width: Option<u64>, software_decode_min_width: u64) -> Acceleration {
    match width {
        Some(w) if w > software_decode_min_width => Acceleration::Software,
        _ => Acceleration::Hardware,
    }
}

#[derive(Clone, Debug)]
pub struct ConverterSettings {
    pub output_size: u32,
    pub h_fov: f64,
    pub v_fov: f64,
    pub software_decode_min_width: u64,
    pub hwaccel: String,
    pub overwrite: bool,
}

impl From<&Settings> for ConverterSettings {
    fn from(settings: &Settings) -> Self {
        ConverterSettings {
            output_size: settings.output_size,
            h_fov: settings.h_fov,
            v_fov: settings.v_fov,
            software_decode_min_width: settings.software_decode_min_width,
            hwaccel: settings.hwaccel.clone(),
            overwrite: settings.overwrite,
        }
    }
}

/// `input=e:output=rectilinear:h_fov=..:v_fov=..:w=..:h=..:yaw=..:pitch=..:roll=..`
pub fn v360_options(task: &ConversionTask, settings: &ConverterSettings) -> String {
    [
        String::from("input=e"),
        String::from("output=rectilinear"),
        format!("h_fov={}", settings.h_fov),
        format!("v_fov={}", settings.v_fov),
        format!("w={}", settings.output_size),
        format!("h={}", settings.output_size),
        format!("yaw={}", task.transform.yaw),
        format!("pitch={}", task.transform.pitch),
        format!("roll={}", task.transform.roll),
    ]
    .join(":")
}

pub fn build_args(task: &ConversionTask, settings: &ConverterSettings, acceleration: Acceleration) -> Vec<PathBuf> {
    fn pbs(s: &str) -> PathBuf { PathBuf::from(s) }

    let mut args = vec![
        pbs("-hide_banner"),
        pbs("-nostdin"),
        pbs("-nostats"),
        pbs("-loglevel"), pbs("warning"),
        pbs("-progress"), pbs("pipe:1"),
        pbs(if settings.overwrite { "-y" } else { "-n" }),
    ];

    let filter = match acceleration {
        Acceleration::Software => format!("v360={}", v360_options(task, settings)),
        Acceleration::Hardware => {
            args.push(pbs("-hwaccel")); args.push(pbs(&settings.hwaccel));
            args.push(pbs("-hwaccel_output_format")); args.push(pbs(&settings.hwaccel));
            // v360 runs on the CPU, so decoded frames come back to system memory first
            format!("hwdownload,format=nv12,v360={}", v360_options(task, settings))
        },
    };

    args.push(pbs("-i")); args.push(task.input.clone());
    args.push(pbs("-vf")); args.push(pbs(&filter));

    match task.format {
        ImageFormat::Jpg => {
            args.push(pbs("-c:v")); args.push(pbs("mjpeg"));
            args.push(pbs("-q:v")); args.push(pbs("1"));
        },
        ImageFormat::Png => {
            args.push(pbs("-c:v")); args.push(pbs("png"));
        },
    }

    args.push(pbs("-r")); args.push(pbs(&task.output_rate.to_string()));
    args.push(task.output_pattern());
    args
}

pub struct FFmpegConverter {
    tool: FFmpegTool,
    settings: ConverterSettings,
    probe: Arc<dyn MediaProbe>,
}

impl FFmpegConverter {
    pub fn new(tool: FFmpegTool, settings: ConverterSettings, probe: Arc<dyn MediaProbe>) -> Self {
        FFmpegConverter { tool, settings, probe }
    }

    fn input_width(&self, input: &Path) -> Option<u64> {
        match self.probe.probe(input) {
            Ok(info) => Some(info.resolution.width),
            Err(err) => {
                warn!("unable to read the width of {:?}, assuming hardware decode is fine: {}", input, err);
                None
            },
        }
    }
}

impl Converter for FFmpegConverter {
    fn ensure_available(&self) -> Result<(), JobError> {
        self.tool.locate().map(|_| ())
    }

    fn start(&self, task: &ConversionTask) -> Result<Box<dyn ConversionProcess>, JobError> {
        let binary = self.tool.locate()?;
        let acceleration = select_acceleration(self.input_width(&task.input), self.settings.software_decode_min_width);
        let args = build_args(task, &self.settings, acceleration);
        info!("{:?} direction {} ({}) using {:?} decode", task.input, task.transform_index, task.transform, acceleration);
        debug!("ffmpeg {}", args.iter().map(|s| format!("{:?}", s)).collect::<Vec<String>>().join(" "));

        let child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| JobError::Job(format!("There was an error executing ffmpeg: {e}")))?;

        Ok(Box::new(FFmpegProcess::with_watchers(child)))
    }
}

#[derive(Debug, Default)]
struct ConversionProgress {
    pub frame: u64,
}

enum FFmpegStdoutResult {
    Continue,
    Render,
}

fn handle_ffmpeg_stdout_line(line: &str, progress: &mut ConversionProgress) -> FFmpegStdoutResult {
    let parts: Vec<&str> = line.split('=').collect();
    if parts.len() == 2 {
        match parts[0].trim() {
            "frame" => {
                progress.frame = parts[1].trim().parse().unwrap_or(progress.frame);
                FFmpegStdoutResult::Continue
            },
            "progress" => FFmpegStdoutResult::Render,
            _ => FFmpegStdoutResult::Continue,
        }
    } else {
        FFmpegStdoutResult::Continue
    }
}

impl FFmpegProcess {
    /// Takes over the child's pipes: stdout feeds the frame counter, stderr
    /// is drained into a short tail so ffmpeg never blocks on a full pipe.
    fn with_watchers(mut child: Child) -> Self {
        let frames = Arc::new(AtomicU64::new(0));
        let reported = Arc::new(AtomicBool::new(false));
        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            let frames = Arc::clone(&frames);
            let reported = Arc::clone(&reported);
            readers.push(thread::spawn(move || consume_stdout(stdout, &frames, &reported)));
        }
        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&stderr_tail);
            readers.push(thread::spawn(move || consume_stderr(stderr, &tail)));
        }

        FFmpegProcess {
            child,
            frames,
            reported,
            stderr_tail,
            readers,
            exited: None,
        }
    }

    /// Records the exit and waits for the readers to reach end of pipe, so
    /// the frame count and stderr tail are final once `Exited` is returned.
    fn finish(&mut self, state: ProcessState) -> ProcessState {
        self.exited = Some(state);
        for reader in self.readers.drain(..) {
            if reader.join().is_err() {
                warn!("ffmpeg output reader panicked");
            }
        }
        state
    }
}

fn consume_stdout(stdout: impl Read, frames: &AtomicU64, reported: &AtomicBool) {
    let mut progress = ConversionProgress::default();
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else {
            break;
        };
        match handle_ffmpeg_stdout_line(&line, &mut progress) {
            FFmpegStdoutResult::Continue => continue,
            FFmpegStdoutResult::Render => {
                frames.fetch_max(progress.frame, Ordering::SeqCst);
                reported.store(true, Ordering::SeqCst);
            },
        }
    }
}

fn consume_stderr(stderr: impl Read, tail: &Mutex<VecDeque<String>>) {
    for line in BufReader::new(stderr).lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        debug!("ffmpeg: {}", line);
        if let Ok(mut tail) = tail.lock() {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}

pub struct FFmpegProcess {
    child: Child,
    frames: Arc<AtomicU64>,
    reported: Arc<AtomicBool>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    readers: Vec<JoinHandle<()>>,
    exited: Option<ProcessState>,
}

impl ConversionProcess for FFmpegProcess {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn poll(&mut self) -> Result<ProcessState, JobError> {
        if let Some(state) = self.exited {
            return Ok(state);
        }
        match self.child.try_wait()? {
            None => Ok(ProcessState::Running),
            Some(status) => Ok(self.finish(ProcessState::Exited(status.code()))),
        }
    }

    fn frames_reported(&self) -> Option<u64> {
        match self.reported.load(Ordering::SeqCst) {
            true => Some(self.frames.load(Ordering::SeqCst)),
            false => None,
        }
    }

    fn last_error(&self) -> Option<String> {
        self.stderr_tail.lock().ok().and_then(|tail| tail.back().cloned())
    }

    fn kill(&mut self) -> Result<(), JobError> {
        if self.exited.is_some() {
            return Ok(());
        }
        let pid = self.child.id();
        match self.child.kill() {
            Ok(()) => {
                info!("killed ffmpeg process ({})", pid);
                if let Ok(status) = self.child.wait() {
                    self.finish(ProcessState::Exited(status.code()));
                }
                Ok(())
            },
            Err(err) => {
                warn!("error killing ffmpeg process ({}) {:?}", pid, err);
                Err(JobError::Io(err))
            },
        }
    }
}

impl Drop for FFmpegProcess {
    fn drop(&mut self) {
        if let Ok(ProcessState::Running) = self.poll() {
            let _ = self.kill();
        }
    }
}
