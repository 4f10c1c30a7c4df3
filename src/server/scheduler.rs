use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Running state shared between the network executor and the action runner.
#[derive(Default)]
pub struct RunFlags {
    running: AtomicBool,
    just_halted: AtomicBool,
}

impl RunFlags {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark run as started, return false if a run is already in progress.
    pub fn try_start(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Revert [`RunFlags::try_start`] for a run that never began.
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Mark run as finished, the next scheduler poll pushes a final update.
    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.just_halted.store(true, Ordering::SeqCst);
    }

    fn take_just_halted(&self) -> bool {
        self.just_halted.swap(false, Ordering::SeqCst)
    }
}

/// Decides when the network executor pushes a snapshot and a full memory refresh.
pub struct UpdateScheduler {
    min_push_interval: Duration,
    last_push: Option<Instant>,
}

impl UpdateScheduler {
    pub fn new(min_push_interval: Duration) -> Self {
        Self {
            min_push_interval,
            last_push: None,
        }
    }

    /// Return true if an update must be pushed now.
    ///
    /// While running, updates are never closer than the minimal push interval. The first
    /// poll after the run has finished always returns true, exactly once.
    pub fn poll(&mut self, flags: &RunFlags, now: Instant) -> bool {
        if flags.take_just_halted() {
            self.last_push = Some(now);
            return true;
        }

        if !flags.is_running() {
            return false;
        }

        let due = self
            .last_push
            .map_or(true, |last| now.saturating_duration_since(last) >= self.min_push_interval);
        if due {
            self.last_push = Some(now);
        }
        due
    }
}
