pub mod cancellation;
pub mod config;
pub mod conversion_task;
pub mod converter;
pub mod error;
pub mod ffmpeg;
pub mod frame_estimator;
pub mod fstools;
pub mod job;
pub mod job_control;
pub mod job_runner;
pub mod permits;
pub mod presets;
pub mod probe;
pub mod progress;
pub mod reporter;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::TryRecvError;
use std::thread;

use rustop::opts;
use signal_hook::consts::SIGINT;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cancellation::CancellationController;
use config::Settings;
use conversion_task::build_tasks;
use error::JobError;
use ffmpeg::FFmpegTool;
use ffmpeg::converter::{ConverterSettings, FFmpegConverter};
use ffmpeg::probe::FFprobe;
use fstools::{classify_file, DirEntryCategory};
use job::{ImageFormat, Job, JobRequest, JobStatus};
use job_control::JobControl;
use presets::{CATALOG, DEFAULT_PRESET};
use probe::MediaProbe;
use reporter::TerminalReporter;

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Split equirectangular 360 video into rectilinear image sequences.";
        opt output:Option<String>, short:'o', desc:"Output directory.";
        opt interval:f64=1.5, desc:"Seconds between extracted frames.";
        opt format:String=String::from("jpg"), desc:"Image format. [jpg, png]";
        opt preset:String=String::from(DEFAULT_PRESET), desc:"Direction preset. (see --list-presets)";
        opt config:Option<String>, desc:"JSON settings file.";
        opt size:Option<u32>, desc:"Output width and height in pixels.";
        opt dry_run:bool=false, desc:"Describe what would be done, but don't actually do anything.";
        opt list_presets:bool=false, desc:"List the direction presets.";
        opt verbose:bool=false, desc:"Log debug output.";
        param inputs:Vec<String>, desc:"Input video files";
    }.parse_or_exit();

    init_logging(args.verbose);

    if args.list_presets {
        for entry in CATALOG {
            println!("{:<10} {:>2}  {}", entry.id, entry.transforms.len(), entry.description);
        }
        return ExitCode::SUCCESS;
    }

    let mut settings = match &args.config {
        Some(path) => match Settings::load(Path::new(path)) {
            Ok(settings) => settings,
            Err(err) => {
                println!("{}", err);
                return ExitCode::FAILURE;
            },
        },
        None => Settings::default(),
    };
    if let Some(size) = args.size {
        settings.output_size = size;
    }
    if let Err(err) = settings.validate() {
        println!("{}", err);
        return ExitCode::FAILURE;
    }

    let mut inputs = Vec::new();
    for input in &args.inputs {
        let path = PathBuf::from(input);
        match classify_file(&path) {
            DirEntryCategory::RegularFile => inputs.push(path),
            DirEntryCategory::DoesNotExist => {
                println!("{:?} does not exist.", input);
                return ExitCode::FAILURE;
            },
            DirEntryCategory::Directory => {
                println!("{:?} is a directory.", input);
                return ExitCode::FAILURE;
            },
            DirEntryCategory::SymbolicLink | DirEntryCategory::Unknown => {
                println!("Unable to classify {:?}.", input);
                return ExitCode::FAILURE;
            },
        }
    }

    let format = match args.format.parse::<ImageFormat>() {
        Ok(format) => format,
        Err(err) => {
            println!("{}", err);
            return ExitCode::FAILURE;
        },
    };
    let request = JobRequest {
        inputs,
        output_dir: args.output.map(PathBuf::from).unwrap_or_default(),
        interval_seconds: args.interval,
        format,
        preset_id: args.preset,
    };

    let result = match args.dry_run {
        true => dry_run(request, &settings).map(|_| JobStatus::Completed),
        false => convert(request, settings),
    };
    match result {
        Ok(JobStatus::Completed) => {
            println!("Success! ^__^");
            ExitCode::SUCCESS
        },
        Ok(status) => {
            println!("Job ended {:?}.", status);
            ExitCode::FAILURE
        },
        Err(err) => {
            println!("Failure -__-\n{}", err);
            ExitCode::FAILURE
        },
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn ffprobe(settings: &Settings) -> Result<Arc<dyn MediaProbe>, JobError> {
    let binary = FFmpegTool::new(&settings.ffprobe).locate()?;
    Ok(Arc::new(FFprobe::new(binary)))
}

fn dry_run(request: JobRequest, settings: &Settings) -> Result<(), JobError> {
    let job = Job::new(request)?;
    let probe = ffprobe(settings)?;
    let estimate = frame_estimator::estimate(
        probe.as_ref(),
        &job.inputs,
        job.interval_seconds,
        job.preset.transforms.len(),
    )?;
    for (input, reason) in &estimate.failed {
        warn!("{:?}: {}", input, reason);
    }
    let inputs = match settings.probe_failure_policy {
        config::ProbeFailurePolicy::EstimateOnly => job.inputs.clone(),
        config::ProbeFailurePolicy::Exclude => estimate.probed.clone(),
    };
    for task in build_tasks(&job, &inputs) {
        println!("{:?} [{}] -> {:?}", task.input, task.transform, task.output_pattern());
    }
    println!("{} frames expected.", estimate.total_frames);
    Ok(())
}

fn convert(request: JobRequest, settings: Settings) -> Result<JobStatus, JobError> {
    let probe = ffprobe(&settings)?;
    let converter = Arc::new(FFmpegConverter::new(
        FFmpegTool::new(&settings.ffmpeg),
        ConverterSettings::from(&settings),
        Arc::clone(&probe),
    ));

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&interrupted))?;

    let poll_interval = settings.poll_interval();
    let mut control = JobControl::new(converter, probe, settings)
        .with_cancellation(CancellationController::with_flag(Arc::clone(&interrupted)));
    let events = control.subscribe();
    control.start(request)?;

    let mut reporter = TerminalReporter::new();
    let mut cancel_sent = false;
    'drain: loop {
        thread::sleep(poll_interval);
        if interrupted.load(Ordering::SeqCst) && !cancel_sent {
            info!("Caught stop signal; killing ffmpeg!");
            control.cancel();
            cancel_sent = true;
        }
        loop {
            match events.try_recv() {
                Ok(event) => {
                    if reporter.handle(&event).is_some() {
                        break 'drain;
                    }
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'drain,
            }
        }
    }

    Ok(control.wait())
}
