use crate::conversion_task::ConversionTask;
use crate::error::JobError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exit code, or `None` when the process was ended by a signal.
    Exited(Option<i32>),
}

impl ProcessState {
    pub fn success(&self) -> bool {
        matches!(self, ProcessState::Exited(Some(0)))
    }
}

/// Handle to one running conversion.
pub trait ConversionProcess: Send {
    fn id(&self) -> Option<u32>;

    fn poll(&mut self) -> Result<ProcessState, JobError>;

    /// Frames the converter itself says it has written, when it reports them.
    fn frames_reported(&self) -> Option<u64> {
        None
    }

    /// Last diagnostic line the converter printed, if any.
    fn last_error(&self) -> Option<String> {
        None
    }

    /// Best effort; the process may still be exiting when this returns.
    fn kill(&mut self) -> Result<(), JobError>;
}

pub trait Converter: Send + Sync {
    /// Fails with `JobError::ToolNotFound` when the conversion binary is missing.
    fn ensure_available(&self) -> Result<(), JobError>;

    fn start(&self, task: &ConversionTask) -> Result<Box<dyn ConversionProcess>, JobError>;
}

#[cfg(test)]
pub mod testing {
    //! Scripted converters for driving `JobRunner` without ffmpeg.

    use std::fs;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    pub struct Record {
        pub started: Arc<Mutex<Vec<ConversionTask>>>,
        pub kills: Arc<AtomicUsize>,
        pub killed: Arc<AtomicBool>,
    }

    impl Record {
        pub fn started_count(&self) -> usize {
            self.started.lock().unwrap().len()
        }
    }

    /// Each process writes one frame file per poll until `frames_per_task`
    /// files exist, then exits with `exit_code`. With `hang` set it never
    /// exits on its own.
    pub struct ScriptedConverter {
        pub frames_per_task: u64,
        pub exit_code: i32,
        pub report_frames: bool,
        pub hang: bool,
        pub available: bool,
        pub record: Record,
    }

    impl Default for ScriptedConverter {
        fn default() -> Self {
            ScriptedConverter {
                frames_per_task: 3,
                exit_code: 0,
                report_frames: false,
                hang: false,
                available: true,
                record: Record::default(),
            }
        }
    }

    struct ScriptedProcess {
        task: ConversionTask,
        written: u64,
        frames_per_task: u64,
        exit_code: i32,
        report_frames: bool,
        hang: bool,
        killed: bool,
        record: Record,
    }

    impl Converter for ScriptedConverter {
        fn ensure_available(&self) -> Result<(), JobError> {
            match self.available {
                true => Ok(()),
                false => Err(JobError::ToolNotFound { tool: String::from("scripted") }),
            }
        }

        fn start(&self, task: &ConversionTask) -> Result<Box<dyn ConversionProcess>, JobError> {
            self.record.started.lock().unwrap().push(task.clone());
            Ok(Box::new(ScriptedProcess {
                task: task.clone(),
                written: 0,
                frames_per_task: self.frames_per_task,
                exit_code: self.exit_code,
                report_frames: self.report_frames,
                hang: self.hang,
                killed: false,
                record: self.record.clone(),
            }))
        }
    }

    impl ConversionProcess for ScriptedProcess {
        fn id(&self) -> Option<u32> {
            Some(4242)
        }

        fn poll(&mut self) -> Result<ProcessState, JobError> {
            if self.killed {
                return Ok(ProcessState::Exited(None));
            }
            if self.written < self.frames_per_task {
                self.written += 1;
                let name = self.task.output_file_name(self.written);
                fs::write(self.task.output_dir.join(name), b"")?;
            }
            if self.hang || self.written < self.frames_per_task {
                Ok(ProcessState::Running)
            } else {
                Ok(ProcessState::Exited(Some(self.exit_code)))
            }
        }

        fn frames_reported(&self) -> Option<u64> {
            self.report_frames.then_some(self.written)
        }

        fn last_error(&self) -> Option<String> {
            (self.exit_code != 0).then(|| String::from("scripted failure"))
        }

        fn kill(&mut self) -> Result<(), JobError> {
            self.killed = true;
            self.record.kills.fetch_add(1, Ordering::SeqCst);
            self.record.killed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
