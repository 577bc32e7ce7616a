//! Bounded pool of conversion slots.
//!
//! ffmpeg with hardware decode may claim the GPU exclusively, so the number
//! of conversions running at once across every job sharing a pool is capped.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct ConversionSemaphore {
    max: usize,
    active: Mutex<usize>,
    condvar: Condvar,
}

impl ConversionSemaphore {
    fn release(&self) {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if *active > 0 {
            *active -= 1;
        }
        self.condvar.notify_one();
    }
}

#[derive(Clone)]
pub struct ConversionPermits {
    sem: Arc<ConversionSemaphore>,
}

/// Returned to the pool when dropped.
pub struct Permit {
    sem: Arc<ConversionSemaphore>,
}

impl ConversionPermits {
    /// A `max` of zero is raised to one.
    pub fn new(max: usize) -> Self {
        ConversionPermits {
            sem: Arc::new(ConversionSemaphore {
                max: max.max(1),
                active: Mutex::new(0),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Waits up to `timeout` for a free slot.
    pub fn try_acquire_for(&self, timeout: Duration) -> Option<Permit> {
        let sem = &self.sem;
        let active = sem.active.lock().unwrap_or_else(|p| p.into_inner());
        let (mut active, _) = sem
            .condvar
            .wait_timeout_while(active, timeout, |n| *n >= sem.max)
            .unwrap_or_else(|p| p.into_inner());
        if *active >= sem.max {
            return None;
        }
        *active += 1;
        Some(Permit { sem: Arc::clone(sem) })
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.sem.release();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    const SHORT: Duration = Duration::from_millis(10);

    #[test]
    fn test_max_one() {
        let permits = ConversionPermits::new(1);
        let first = permits.try_acquire_for(SHORT);
        assert!(first.is_some());
        assert!(permits.try_acquire_for(SHORT).is_none());
        drop(first);
        assert!(permits.try_acquire_for(SHORT).is_some());
    }

    #[test]
    fn test_max_two_is_shared_by_clones() {
        let permits = ConversionPermits::new(2);
        let other = permits.clone();
        let _a = permits.try_acquire_for(SHORT).unwrap();
        let _b = other.try_acquire_for(SHORT).unwrap();
        assert!(permits.try_acquire_for(SHORT).is_none());
    }

    #[test]
    fn test_zero_max_is_raised_to_one() {
        let permits = ConversionPermits::new(0);
        let held = permits.try_acquire_for(SHORT);
        assert!(held.is_some());
        assert!(permits.try_acquire_for(SHORT).is_none());
    }

    #[test]
    fn test_release_wakes_waiter() {
        let permits = ConversionPermits::new(1);
        let held = permits.try_acquire_for(SHORT).unwrap();
        let waiter = {
            let permits = permits.clone();
            thread::spawn(move || permits.try_acquire_for(Duration::from_secs(5)).is_some())
        };
        thread::sleep(Duration::from_millis(50));
        drop(held);
        assert!(waiter.join().unwrap());
    }
}
