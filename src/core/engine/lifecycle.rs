// Ref-counted start/stop lifecycle, serialized against the scheduler via
// the engine's single cycle lock.

/// Mutable cycle state. Only ever touched while holding the engine's cycle
/// lock, so a plain struct with no interior synchronization.
#[derive(Debug, Default)]
pub(crate) struct RefreshCycleState {
    pub(crate) stopped: bool,
    pub(crate) shut_down: bool,
    pub(crate) start_refs: u32,
    /// Pass counter, for sub-sampling expensive checks.
    pub(crate) tick: u64,
    /// Bumped on each 0->1 start; a refresh loop carrying an older
    /// generation exits without rearming.
    pub(crate) generation: u64,
    /// True from loop spawn until that loop observes its exit condition
    /// in `claim_tick`. A restart that arrives while the old loop is
    /// still draining resumes it instead of spawning a second one, so
    /// two passes can never overlap.
    pub(crate) loop_active: bool,
}

/// What `start()` decided while the lock was held.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StartAction {
    /// First reference: spawn the refresh loop with this generation.
    SpawnLoop(u64),
    /// First reference again while the previous loop is still draining;
    /// that loop picks execution back up at its next gate check.
    Resumed,
    /// Already running; reference count bumped.
    AlreadyRunning,
    /// Engine was shut down; start refused.
    Refused,
}

/// What `stop()` decided while the lock was held.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StopAction {
    /// Last reference released; the loop will observe `stopped` and exit.
    Stopping,
    /// Other references remain.
    StillRunning,
    /// Stop without a matching start; count clamped at zero.
    Unbalanced,
}

impl RefreshCycleState {
    pub(crate) fn new() -> Self {
        Self {
            stopped: true,
            ..Self::default()
        }
    }

    pub(crate) fn begin_start(&mut self) -> StartAction {
        if self.shut_down {
            return StartAction::Refused;
        }
        self.start_refs += 1;
        if self.start_refs > 1 {
            return StartAction::AlreadyRunning;
        }
        self.stopped = false;
        self.tick = 0;
        if self.loop_active {
            StartAction::Resumed
        } else {
            self.loop_active = true;
            self.generation += 1;
            StartAction::SpawnLoop(self.generation)
        }
    }

    pub(crate) fn end_stop(&mut self) -> StopAction {
        if self.start_refs == 0 {
            // Callers must pair start/stop; clamp rather than go negative.
            return StopAction::Unbalanced;
        }
        self.start_refs -= 1;
        if self.start_refs == 0 {
            self.stopped = true;
            StopAction::Stopping
        } else {
            StopAction::StillRunning
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.stopped = true;
        self.shut_down = true;
        self.start_refs = 0;
    }

    /// Scheduler gate: may a loop of this generation run another pass?
    pub(crate) fn gate(&self, generation: u64) -> bool {
        !self.stopped && self.generation == generation
    }

    /// Claim the next tick number, or None if the loop must exit.
    pub(crate) fn claim_tick(&mut self, generation: u64) -> Option<u64> {
        if !self.gate(generation) {
            if self.generation == generation {
                self.loop_active = false;
            }
            return None;
        }
        let tick = self.tick;
        self.tick += 1;
        Some(tick)
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.stopped
    }
}
