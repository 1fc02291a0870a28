use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Outcome of a bounded wait on a [`Semaphore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Acquired,
    TimedOut,
    /// [`Semaphore::reset`] ran while waiting. The caller should re-check
    /// whether it is still supposed to be running before waiting again.
    Reset,
}

#[derive(Debug)]
struct State {
    permits: usize,
    epoch: u64,
}

/// Counting semaphore with timed waits and a wake-everyone reset.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<State>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(State { permits, epoch: 0 }),
            cond: Condvar::new(),
        }
    }

    pub fn available(&self) -> usize {
        self.state.lock().permits
    }

    pub fn release(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        self.cond.notify_one();
    }

    /// Take a permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.permits > 0 {
            state.permits -= 1;
            true
        } else {
            false
        }
    }

    /// Wait up to `timeout` for a permit.
    pub fn acquire_timeout(&self, timeout: Duration) -> Acquire {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let epoch = state.epoch;
        loop {
            if state.epoch != epoch {
                return Acquire::Reset;
            }
            if state.permits > 0 {
                state.permits -= 1;
                return Acquire::Acquired;
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                if state.epoch != epoch {
                    return Acquire::Reset;
                }
                if state.permits > 0 {
                    state.permits -= 1;
                    return Acquire::Acquired;
                }
                return Acquire::TimedOut;
            }
        }
    }

    /// Drop all permits without waking anyone. Returns how many were drained.
    pub fn drain(&self) -> usize {
        let mut state = self.state.lock();
        std::mem::take(&mut state.permits)
    }

    /// Replace the permit count and wake every waiter with [`Acquire::Reset`].
    pub fn reset(&self, permits: usize) {
        let mut state = self.state.lock();
        state.permits = permits;
        state.epoch = state.epoch.wrapping_add(1);
        self.cond.notify_all();
    }
}
