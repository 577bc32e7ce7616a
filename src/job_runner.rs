use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::cancellation::CancellationController;
use crate::config::{ProbeFailurePolicy, ProgressSource, Settings, StaleOutputs};
use crate::conversion_task::{build_tasks, ConversionTask};
use crate::converter::{Converter, ProcessState};
use crate::error::JobError;
use crate::frame_estimator;
use crate::fstools::{count_matching_files, remove_matching_files};
use crate::job::{Job, JobStatus};
use crate::permits::{ConversionPermits, Permit};
use crate::probe::MediaProbe;
use crate::progress::{self, ProgressState};

#[derive(Clone, Debug)]
pub enum JobEvent {
    Started { total_frames: u64, tasks: usize },
    InputSkipped { input: PathBuf, reason: String },
    TaskStarted { index: usize, task: ConversionTask },
    Progress(ProgressState),
    TaskFinished { index: usize, frames: u64 },
    TaskFailed { index: usize, task: ConversionTask, reason: String },
    Finished(JobStatus),
    Failed(String),
}

enum Outcome {
    Completed,
    Cancelled,
}

/// Runs one job to a terminal status, one conversion at a time.
pub struct JobRunner {
    job: Job,
    converter: Arc<dyn Converter>,
    probe: Arc<dyn MediaProbe>,
    settings: Settings,
    cancellation: CancellationController,
    permits: ConversionPermits,
    subscribers: Vec<Sender<JobEvent>>,
}

impl JobRunner {
    pub fn new(
        job: Job,
        converter: Arc<dyn Converter>,
        probe: Arc<dyn MediaProbe>,
        settings: Settings,
        cancellation: CancellationController,
        permits: ConversionPermits,
    ) -> Self {
        JobRunner {
            job,
            converter,
            probe,
            settings,
            cancellation,
            permits,
            subscribers: vec![],
        }
    }

    pub fn subscribe(&mut self, tx: Sender<JobEvent>) {
        self.subscribers.push(tx);
    }

    fn publish(&self, msg: JobEvent) {
        for tx in &self.subscribers {
            let _ = tx.send(msg.clone());
        }
    }

    /// Consumes the runner and hands back the job in its terminal status.
    pub fn run(mut self) -> Job {
        if let Err(err) = self.job.transition(JobStatus::Running) {
            error!("{}", err);
            self.publish(JobEvent::Failed(err.to_string()));
            return self.job;
        }

        let result = self.execute();
        if let Some(mut process) = self.cancellation.release() {
            let _ = process.kill();
        }

        match result {
            Ok(Outcome::Completed) => self.finish(JobStatus::Completed),
            Ok(Outcome::Cancelled) => {
                self.finish(JobStatus::Cancelling);
                self.finish(JobStatus::Cancelled);
            },
            Err(err) => {
                error!("job failed: {}", err);
                let _ = self.job.transition(JobStatus::Failed);
                self.publish(JobEvent::Failed(err.to_string()));
            },
        }
        self.job
    }

    fn finish(&mut self, status: JobStatus) {
        if self.job.status() == status {
            return;
        }
        match self.job.transition(status) {
            Ok(()) if status.is_terminal() => {
                info!("job {:?}", status);
                self.publish(JobEvent::Finished(status));
            },
            Ok(()) => (),
            Err(err) => warn!("{}", err),
        }
    }

    fn execute(&mut self) -> Result<Outcome, JobError> {
        fs::create_dir_all(&self.job.output_dir)?;

        let estimate = frame_estimator::estimate(
            self.probe.as_ref(),
            &self.job.inputs,
            self.job.interval_seconds,
            self.job.preset.transforms.len(),
        )?;
        for (input, reason) in &estimate.failed {
            self.publish(JobEvent::InputSkipped { input: input.clone(), reason: reason.clone() });
        }

        let inputs = match self.settings.probe_failure_policy {
            ProbeFailurePolicy::EstimateOnly => self.job.inputs.clone(),
            ProbeFailurePolicy::Exclude => estimate.probed.clone(),
        };
        let tasks = build_tasks(&self.job, &inputs);
        let total_frames = estimate.total_frames;
        info!("{} conversions, {} frames expected", tasks.len(), total_frames);
        self.publish(JobEvent::Started { total_frames, tasks: tasks.len() });

        let started = Instant::now();
        let mut completed_frames = 0;
        for (index, task) in tasks.iter().enumerate() {
            if self.cancellation.is_cancel_requested() {
                return Ok(Outcome::Cancelled);
            }
            let Some(_permit) = self.wait_for_permit() else {
                return Ok(Outcome::Cancelled);
            };
            match self.run_task(index, task, completed_frames, total_frames, started)? {
                None => return Ok(Outcome::Cancelled),
                Some(frames) => completed_frames += frames,
            }
        }

        if self.cancellation.is_cancel_requested() {
            Ok(Outcome::Cancelled)
        } else {
            Ok(Outcome::Completed)
        }
    }

    fn wait_for_permit(&self) -> Option<Permit> {
        loop {
            if let Some(permit) = self.permits.try_acquire_for(self.settings.poll_interval()) {
                return Some(permit);
            }
            if self.cancellation.is_cancel_requested() {
                return None;
            }
            debug!("waiting for a free conversion slot");
        }
    }

    /// Returns the frames the task wrote, or `None` when it was cancelled.
    fn run_task(
        &mut self,
        index: usize,
        task: &ConversionTask,
        completed_frames: u64,
        total_frames: u64,
        started: Instant,
    ) -> Result<Option<u64>, JobError> {
        let prefix = task.file_prefix();
        let extension = task.format.extension();
        if self.settings.stale_outputs == StaleOutputs::Remove {
            let removed = remove_matching_files(&task.output_dir, &prefix, extension)?;
            if removed > 0 {
                info!("removed {} stale {}*.{} files", removed, prefix, extension);
            }
        }
        let baseline = count_matching_files(&task.output_dir, &prefix, extension)?;

        let process = self.converter.start(task)?;
        debug!("conversion {} started as pid {:?}", index, process.id());
        self.cancellation.track(process);
        self.publish(JobEvent::TaskStarted { index, task: task.clone() });

        let poll_interval: Duration = self.settings.poll_interval();
        loop {
            thread::sleep(poll_interval);

            if self.cancellation.is_cancel_requested() {
                self.finish(JobStatus::Cancelling);
                self.cancellation.force_kill();
                return Ok(None);
            }

            let Some((state, reported)) = self.cancellation.poll_active()? else {
                return Err(JobError::Job(String::from("conversion process handle went missing")));
            };
            let frames = self.task_frames(task, reported, baseline)?;
            self.publish(JobEvent::Progress(progress::update(
                completed_frames + frames,
                total_frames,
                started.elapsed(),
            )));

            if let ProcessState::Exited(code) = state {
                let process = self.cancellation.release();
                if state.success() {
                    debug!("conversion {} finished with {} frames", index, frames);
                    self.publish(JobEvent::TaskFinished { index, frames });
                } else {
                    let failure = JobError::process_for_file(&task.input, code);
                    let reason = match process.and_then(|p| p.last_error()) {
                        Some(detail) => format!("{failure} ({detail})"),
                        None => failure.to_string(),
                    };
                    warn!("{}", reason);
                    self.publish(JobEvent::TaskFailed { index, task: task.clone(), reason });
                }
                return Ok(Some(frames));
            }
        }
    }

    fn task_frames(&self, task: &ConversionTask, reported: Option<u64>, baseline: u64) -> Result<u64, JobError> {
        match (self.settings.progress_source, reported) {
            (ProgressSource::Auto, Some(frames)) => Ok(frames),
            _ => {
                let count = count_matching_files(&task.output_dir, &task.file_prefix(), task.format.extension())?;
                Ok(count.saturating_sub(baseline))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::mpsc::{self, Receiver};

    use super::*;
    use crate::converter::testing::ScriptedConverter;
    use crate::job::{ImageFormat, JobRequest};
    use crate::probe::testing::TableProbe;

    struct Harness {
        dir: tempfile::TempDir,
        settings: Settings,
        cancellation: CancellationController,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                dir: tempfile::tempdir().unwrap(),
                settings: Settings { poll_interval_ms: 5, ..Settings::default() },
                cancellation: CancellationController::new(),
            }
        }

        fn job(&self, inputs: &[&str], preset: &str) -> Job {
            Job::new(JobRequest {
                inputs: inputs.iter().map(PathBuf::from).collect(),
                output_dir: self.dir.path().to_path_buf(),
                interval_seconds: 1.0,
                format: ImageFormat::Jpg,
                preset_id: String::from(preset),
            })
            .unwrap()
        }

        fn run(&self, job: Job, converter: Arc<ScriptedConverter>, probe: TableProbe) -> (Job, Vec<JobEvent>) {
            let (job, rx) = self.spawn(job, converter, probe);
            (job.join().unwrap(), rx.iter().collect())
        }

        fn spawn(
            &self,
            job: Job,
            converter: Arc<ScriptedConverter>,
            probe: TableProbe,
        ) -> (thread::JoinHandle<Job>, Receiver<JobEvent>) {
            let (tx, rx) = mpsc::channel();
            let mut runner = JobRunner::new(
                job,
                converter,
                Arc::new(probe),
                self.settings.clone(),
                self.cancellation.clone(),
                ConversionPermits::new(1),
            );
            runner.subscribe(tx);
            (thread::spawn(move || runner.run()), rx)
        }
    }

    fn probe() -> TableProbe {
        TableProbe::default()
            .with("abc123.mp4", 3, 30.0, 5760)
            .with("xyz789.mp4", 3, 30.0, 3840)
    }

    fn progress_events(events: &[JobEvent]) -> Vec<ProgressState> {
        events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_completes_every_task_in_order() {
        let h = Harness::new();
        let converter = Arc::new(ScriptedConverter::default());
        let (job, events) = h.run(h.job(&["abc123.mp4", "xyz789.mp4"], "2"), Arc::clone(&converter), probe());

        assert_eq!(job.status(), JobStatus::Completed);
        let started: Vec<(PathBuf, usize)> = converter
            .record
            .started
            .lock()
            .unwrap()
            .iter()
            .map(|t| (t.input.clone(), t.transform_index))
            .collect();
        assert_eq!(started, vec![
            (PathBuf::from("abc123.mp4"), 0),
            (PathBuf::from("abc123.mp4"), 1),
            (PathBuf::from("xyz789.mp4"), 0),
            (PathBuf::from("xyz789.mp4"), 1),
        ]);

        assert!(matches!(events.first(), Some(JobEvent::Started { total_frames: 12, tasks: 4 })));
        assert!(matches!(events.last(), Some(JobEvent::Finished(JobStatus::Completed))));
        let finished = events.iter().filter(|e| matches!(e, JobEvent::TaskFinished { frames: 3, .. })).count();
        assert_eq!(finished, 4);

        let progress = progress_events(&events);
        assert!(progress.windows(2).all(|w| w[0].processed_frames <= w[1].processed_frames));
        let last = progress.last().unwrap();
        assert_eq!(last.processed_frames, 12);
        assert_eq!(last.progress_percent, 100.0);
        assert!(last.estimated_completion.is_some());
    }

    #[test]
    fn test_estimates_absent_until_first_frame() {
        let h = Harness::new();
        let converter = Arc::new(ScriptedConverter::default());
        let (_, events) = h.run(h.job(&["abc123.mp4"], "1"), converter, probe());
        for state in progress_events(&events) {
            match state.processed_frames {
                0 => assert!(state.estimated_completion.is_none()),
                _ => {
                    assert!(state.estimated_completion.is_some());
                    assert!(state.estimated_total.unwrap().as_secs_f64().is_finite());
                },
            }
        }
    }

    #[test]
    fn test_reported_frames_take_precedence() {
        let h = Harness::new();
        let converter = Arc::new(ScriptedConverter { report_frames: true, ..ScriptedConverter::default() });
        // stale files from an earlier run must not count
        fs::write(h.dir.path().join("123_ot_0_0099.jpg"), b"").unwrap();
        let (job, events) = h.run(h.job(&["abc123.mp4"], "1"), converter, probe());
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(progress_events(&events).last().unwrap().processed_frames, 3);
    }

    #[test]
    fn test_directory_counting_ignores_stale_files() {
        let mut h = Harness::new();
        h.settings.progress_source = ProgressSource::Directory;
        fs::write(h.dir.path().join("123_ot_0_0099.jpg"), b"").unwrap();
        fs::write(h.dir.path().join("unrelated.jpg"), b"").unwrap();
        let converter = Arc::new(ScriptedConverter::default());
        let (_, events) = h.run(h.job(&["abc123.mp4"], "1"), converter, probe());
        assert_eq!(progress_events(&events).last().unwrap().processed_frames, 3);
    }

    #[test]
    fn test_remove_stale_outputs() {
        let mut h = Harness::new();
        h.settings.stale_outputs = StaleOutputs::Remove;
        let stale = h.dir.path().join("123_ot_0_0099.jpg");
        let unrelated = h.dir.path().join("unrelated.jpg");
        fs::write(&stale, b"").unwrap();
        fs::write(&unrelated, b"").unwrap();
        let converter = Arc::new(ScriptedConverter::default());
        h.run(h.job(&["abc123.mp4"], "1"), converter, probe());
        assert!(!stale.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_failed_task_is_reported_and_job_continues() {
        let h = Harness::new();
        let converter = Arc::new(ScriptedConverter { exit_code: 1, ..ScriptedConverter::default() });
        let (job, events) = h.run(h.job(&["abc123.mp4"], "2"), Arc::clone(&converter), probe());
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(converter.record.started_count(), 2);
        let failures: Vec<&String> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::TaskFailed { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].contains("scripted failure"));
    }

    #[test]
    fn test_probe_failure_estimate_only_still_converts() {
        let h = Harness::new();
        let converter = Arc::new(ScriptedConverter::default());
        let (job, events) = h.run(h.job(&["missing.mp4", "abc123.mp4"], "1"), Arc::clone(&converter), probe());
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(converter.record.started_count(), 2);
        assert!(matches!(events.first(), Some(JobEvent::InputSkipped { .. })));
        assert!(events.iter().any(|e| matches!(e, JobEvent::Started { total_frames: 3, tasks: 2 })));
    }

    #[test]
    fn test_probe_failure_exclude_skips_conversion() {
        let mut h = Harness::new();
        h.settings.probe_failure_policy = ProbeFailurePolicy::Exclude;
        let converter = Arc::new(ScriptedConverter::default());
        let (_, events) = h.run(h.job(&["missing.mp4", "abc123.mp4"], "1"), Arc::clone(&converter), probe());
        assert_eq!(converter.record.started_count(), 1);
        assert!(events.iter().any(|e| matches!(e, JobEvent::Started { total_frames: 3, tasks: 1 })));
    }

    #[test]
    fn test_zero_total_frames_still_runs() {
        let h = Harness::new();
        let converter = Arc::new(ScriptedConverter::default());
        let (job, events) = h.run(h.job(&["missing.mp4"], "1"), converter, TableProbe::default());
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(progress_events(&events).iter().all(|p| p.progress_percent == 0.0));
    }

    #[test]
    fn test_cancel_kills_active_process_and_stops() {
        let h = Harness::new();
        let converter = Arc::new(ScriptedConverter { hang: true, ..ScriptedConverter::default() });
        let (handle, rx) = h.spawn(h.job(&["abc123.mp4", "xyz789.mp4"], "2"), Arc::clone(&converter), probe());

        for event in rx.iter() {
            if let JobEvent::Progress(_) = event {
                h.cancellation.request_cancel();
                break;
            }
        }
        let job = handle.join().unwrap();
        let rest: Vec<JobEvent> = rx.iter().collect();

        assert_eq!(job.status(), JobStatus::Cancelled);
        assert_eq!(converter.record.started_count(), 1);
        assert!(converter.record.killed.load(Ordering::SeqCst));
        assert!(matches!(rest.last(), Some(JobEvent::Finished(JobStatus::Cancelled))));
        assert!(!rest.iter().any(|e| matches!(e, JobEvent::TaskStarted { .. })));
        // partial output stays on disk
        assert!(h.dir.path().join("123_ot_0_0001.jpg").exists());
    }

    #[test]
    fn test_cancel_before_start() {
        let h = Harness::new();
        h.cancellation.request_cancel();
        let converter = Arc::new(ScriptedConverter::default());
        let (job, events) = h.run(h.job(&["abc123.mp4"], "1"), Arc::clone(&converter), probe());
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert_eq!(converter.record.started_count(), 0);
        assert!(matches!(events.last(), Some(JobEvent::Finished(JobStatus::Cancelled))));
    }

    #[test]
    fn test_unwritable_output_fails_once() {
        let h = Harness::new();
        let blocker = h.dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        let mut job = h.job(&["abc123.mp4"], "1");
        job.output_dir = blocker.join("out");
        let converter = Arc::new(ScriptedConverter::default());
        let (job, events) = h.run(job, converter, probe());
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(events.iter().filter(|e| matches!(e, JobEvent::Failed(_))).count(), 1);
    }
}
