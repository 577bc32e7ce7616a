use human_repr::{HumanCount, HumanDuration};
use kdam::{term, tqdm, Bar, BarExt};
use tracing::{info, warn};

use crate::job::JobStatus;
use crate::job_runner::JobEvent;
use crate::progress::ProgressState;

const COMPLETION_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Draws job events as a terminal progress bar.
pub struct TerminalReporter {
    bar: Option<Bar>,
    tasks: usize,
}

impl TerminalReporter {
    pub fn new() -> Self {
        TerminalReporter { bar: None, tasks: 0 }
    }

    /// Returns the final status once the job has ended.
    pub fn handle(&mut self, event: &JobEvent) -> Option<JobStatus> {
        match event {
            JobEvent::Started { total_frames, tasks } => {
                term::init(false);
                self.tasks = *tasks;
                self.bar = Some(tqdm!(
                    total = *total_frames as usize,
                    desc = format!("{} conversions", tasks),
                    position = 0,
                    force_refresh = true
                ));
                None
            },
            JobEvent::InputSkipped { input, reason } => {
                warn!("{:?} left out of the estimate: {}", input, reason);
                None
            },
            JobEvent::TaskStarted { index, task } => {
                if let Some(bar) = self.bar.as_mut() {
                    bar.set_description(format!("{}/{} {}", index + 1, self.tasks, task.file_prefix()));
                }
                None
            },
            JobEvent::Progress(state) => {
                if let Some(bar) = self.bar.as_mut() {
                    bar.set_postfix(postfix(state));
                    let _ = bar.update_to(state.processed_frames as usize);
                }
                None
            },
            JobEvent::TaskFinished { .. } => None,
            JobEvent::TaskFailed { reason, .. } => {
                warn!("{}", reason);
                None
            },
            JobEvent::Finished(status) => {
                self.close();
                info!("job {:?}", status);
                Some(*status)
            },
            JobEvent::Failed(msg) => {
                self.close();
                warn!("job failed: {}", msg);
                Some(JobStatus::Failed)
            },
        }
    }

    fn close(&mut self) {
        if let Some(mut bar) = self.bar.take() {
            let _ = bar.refresh();
            eprintln!();
        }
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn postfix(state: &ProgressState) -> String {
    let mut parts = vec![
        format!("{} frames", state.processed_frames.human_count_bare()),
        format!("elapsed {}", state.elapsed.as_secs_f64().human_duration()),
    ];
    if let Some(total) = state.estimated_total {
        parts.push(format!("total ~{}", total.as_secs_f64().human_duration()));
    }
    if let Some(remaining) = state.estimated_remaining() {
        parts.push(format!("left ~{}", remaining.as_secs_f64().human_duration()));
    }
    if let Some(eta) = state.estimated_completion {
        parts.push(format!("done at {}", eta.format(COMPLETION_FORMAT)));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{Local, TimeZone};

    use super::*;
    use crate::progress::update_at;

    #[test]
    fn test_postfix_before_first_frame() {
        let text = postfix(&update_at(0, 10, Duration::from_secs(3), Local::now()));
        assert!(text.starts_with("0"));
        assert!(!text.contains("done at"));
        assert!(!text.contains("total ~"));
        assert!(!text.contains("left ~"));
    }

    #[test]
    fn test_postfix_with_estimate() {
        let now = Local.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
        let text = postfix(&update_at(5, 10, Duration::from_secs(60), now));
        assert!(text.contains("total ~"));
        let left = format!("left ~{}", 60.0_f64.human_duration());
        assert!(text.contains(&left), "{}", text);
        assert!(text.ends_with("done at 2026-10-15 12:01:00"));
    }

    #[test]
    fn test_finished_event_ends_reporting() {
        let mut reporter = TerminalReporter::new();
        assert_eq!(reporter.handle(&JobEvent::Finished(JobStatus::Cancelled)), Some(JobStatus::Cancelled));
        assert_eq!(reporter.handle(&JobEvent::Failed(String::from("boom"))), Some(JobStatus::Failed));
        assert_eq!(reporter.handle(&JobEvent::TaskFinished { index: 0, frames: 1 }), None);
    }
}
