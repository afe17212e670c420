use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Initializing,
    Running,
    Saving,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    in_flight: usize,
    saving: usize,
}

/// Engine state machine and in-flight operation accounting.
///
/// Every public operation holds an [`OperationGuard`] while it runs. Shutdown
/// closes the gate first, so new operations get `Unavailable`, then waits
/// for the guards still out to be dropped.
#[derive(Debug)]
pub struct Lifecycle {
    inner: Mutex<Inner>,
    drained: Condvar,
}

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle {
            inner: Mutex::new(Inner {
                phase: Phase::Initializing,
                in_flight: 0,
                saving: 0,
            }),
            drained: Condvar::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        let inner = self.inner.lock();
        match inner.phase {
            Phase::Initializing => LifecycleState::Initializing,
            Phase::Running if inner.saving > 0 => LifecycleState::Saving,
            Phase::Running => LifecycleState::Running,
            Phase::ShuttingDown => LifecycleState::ShuttingDown,
            Phase::Stopped => LifecycleState::Stopped,
        }
    }

    pub fn is_serving(&self) -> bool {
        self.inner.lock().phase == Phase::Running
    }

    /// Initializing -> Running.
    pub fn ready(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.phase != Phase::Initializing {
            return Err(Error::invalid_state(format!("cannot start from {:?}", inner.phase)));
        }
        inner.phase = Phase::Running;
        Ok(())
    }

    pub fn enter(&self) -> Result<OperationGuard<'_>> {
        let mut inner = self.inner.lock();
        if inner.phase != Phase::Running {
            return Err(Error::unavailable());
        }
        inner.in_flight += 1;
        Ok(OperationGuard { lifecycle: self })
    }

    /// Marks a save as running for `state()`. Taken inside an operation.
    pub fn begin_save(&self) -> SaveGuard<'_> {
        self.inner.lock().saving += 1;
        SaveGuard { lifecycle: self }
    }

    /// Close the gate and wait for in-flight operations. Only the first
    /// caller gets `Ok`; later ones see `Unavailable`.
    pub fn begin_shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.phase {
            Phase::Running | Phase::Initializing => inner.phase = Phase::ShuttingDown,
            Phase::ShuttingDown | Phase::Stopped => return Err(Error::unavailable()),
        }
        while inner.in_flight > 0 {
            self.drained.wait(&mut inner);
        }
        Ok(())
    }

    pub fn finish_shutdown(&self) {
        self.inner.lock().phase = Phase::Stopped;
        self.drained.notify_all();
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::new()
    }
}

/// Held for the duration of one operation.
#[derive(Debug)]
pub struct OperationGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.lifecycle.inner.lock();
        inner.in_flight -= 1;
        if inner.in_flight == 0 {
            self.lifecycle.drained.notify_all();
        }
    }
}

pub struct SaveGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.inner.lock().saving -= 1;
    }
}
