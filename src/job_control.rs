//! Start/cancel surface around a background `JobRunner`.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::cancellation::CancellationController;
use crate::config::Settings;
use crate::converter::Converter;
use crate::error::JobError;
use crate::job::{Job, JobRequest, JobStatus};
use crate::job_runner::{JobEvent, JobRunner};
use crate::permits::ConversionPermits;
use crate::probe::MediaProbe;

pub struct JobControl {
    converter: Arc<dyn Converter>,
    probe: Arc<dyn MediaProbe>,
    settings: Settings,
    permits: ConversionPermits,
    cancellation: CancellationController,
    subscribers: Vec<Sender<JobEvent>>,
    worker: Option<JoinHandle<Job>>,
    finished: Option<JobStatus>,
}

impl JobControl {
    pub fn new(converter: Arc<dyn Converter>, probe: Arc<dyn MediaProbe>, settings: Settings) -> Self {
        let permits = ConversionPermits::new(settings.max_concurrent_conversions);
        JobControl {
            converter,
            probe,
            settings,
            permits,
            cancellation: CancellationController::new(),
            subscribers: vec![],
            worker: None,
            finished: None,
        }
    }

    /// Shares a permit pool with other controls so their conversions are
    /// bounded together.
    pub fn with_permits(mut self, permits: ConversionPermits) -> Self {
        self.permits = permits;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationController) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Events for the next job started. Subscribe before calling `start`.
    pub fn subscribe(&mut self) -> Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Validates the request and runs it on a worker thread. Configuration
    /// and missing-tool errors are returned here and leave the control Idle.
    /// Calling it again while a job is active does nothing.
    pub fn start(&mut self, request: JobRequest) -> Result<(), JobError> {
        let status = self.status();
        if status != JobStatus::Idle {
            debug!("start ignored, job is {:?}", status);
            return Ok(());
        }

        let job = Job::new(request)?;
        self.converter.ensure_available()?;

        let mut runner = JobRunner::new(
            job,
            Arc::clone(&self.converter),
            Arc::clone(&self.probe),
            self.settings.clone(),
            self.cancellation.clone(),
            self.permits.clone(),
        );
        for tx in self.subscribers.drain(..) {
            runner.subscribe(tx);
        }

        self.finished = None;
        self.worker = Some(thread::Builder::new()
            .name(String::from("job-runner"))
            .spawn(move || runner.run())?);
        Ok(())
    }

    /// Stops the job: no further conversion starts and the active one is killed.
    pub fn cancel(&self) {
        if self.worker.is_none() {
            return;
        }
        self.cancellation.request_cancel();
        self.cancellation.force_kill();
    }

    pub fn status(&mut self) -> JobStatus {
        if let Some(status) = self.finished {
            return status;
        }
        let worker_done = match &self.worker {
            None => return JobStatus::Idle,
            Some(handle) => handle.is_finished(),
        };
        if worker_done {
            self.wait()
        } else if self.cancellation.is_cancel_requested() {
            JobStatus::Cancelling
        } else {
            JobStatus::Running
        }
    }

    /// Blocks until the worker ends and returns the job's terminal status.
    pub fn wait(&mut self) -> JobStatus {
        if let Some(status) = self.finished {
            return status;
        }
        let Some(handle) = self.worker.take() else {
            return JobStatus::Idle;
        };
        let status = match handle.join() {
            Ok(job) => job.status(),
            Err(_) => {
                error!("job runner thread panicked");
                JobStatus::Failed
            },
        };
        self.finished = Some(status);
        status
    }

    /// Returns a finished control to Idle so another job can start. Any
    /// earlier cancel request is forgotten; an injected flag stays wired.
    pub fn reset(&mut self) -> Result<(), JobError> {
        let status = self.status();
        if status == JobStatus::Idle {
            return Ok(());
        }
        if !status.is_terminal() {
            return Err(JobError::InvalidTransition { from: status, to: JobStatus::Idle });
        }
        self.finished = None;
        self.cancellation.clear();
        Ok(())
    }
}
