//! Cooperative stop flag plus the slot holding the one active conversion.
//!
//! The runner parks its process handle in the slot while it polls; anyone
//! holding a clone of the controller can kill exactly that process. Nothing
//! is ever matched by executable name.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::converter::{ConversionProcess, ProcessState};
use crate::error::JobError;

type Slot = Option<Box<dyn ConversionProcess>>;

#[derive(Clone, Default)]
pub struct CancellationController {
    requested: Arc<AtomicBool>,
    active: Arc<Mutex<Slot>>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares an existing flag, e.g. one a signal handler sets.
    pub fn with_flag(requested: Arc<AtomicBool>) -> Self {
        CancellationController {
            requested,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn request_cancel(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            info!("cancellation requested");
        }
    }

    /// Forgets an earlier cancel request. The flag itself stays shared, so
    /// whoever injected it can still raise it.
    pub(crate) fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Kills the tracked process if there is one. Returns whether a kill was sent.
    pub fn force_kill(&self) -> bool {
        let mut slot = self.lock();
        let Some(process) = slot.as_mut() else {
            return false;
        };
        match process.kill() {
            Ok(()) => true,
            Err(err) => {
                warn!("unable to kill conversion process {:?}: {}", process.id(), err);
                false
            },
        }
    }

    pub(crate) fn track(&self, process: Box<dyn ConversionProcess>) {
        let mut slot = self.lock();
        *slot = Some(process);
    }

    pub(crate) fn release(&self) -> Option<Box<dyn ConversionProcess>> {
        self.lock().take()
    }

    /// Polls the tracked process; `None` when nothing is tracked.
    pub(crate) fn poll_active(&self) -> Result<Option<(ProcessState, Option<u64>)>, JobError> {
        let mut slot = self.lock();
        match slot.as_mut() {
            None => Ok(None),
            Some(process) => {
                let state = process.poll()?;
                Ok(Some((state, process.frames_reported())))
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // a poisoned slot still holds a valid handle
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
