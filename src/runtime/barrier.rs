//! Reusable Rendezvous Barrier
//!
//! A resizable barrier for a group of cooperating threads with a cooperative
//! interrupt. Waiting happens in two phases. In the entry phase every caller
//! increments the entry counter and blocks until the last arrival wraps it
//! to zero. In the exit phase the same happens with the exit counter. A
//! caller can only get back into the entry phase after the whole group left
//! the exit phase, so a fast thread re-entering the barrier never meets a
//! counter that still holds arrivals of the previous round.
//!
//! Blocked callers never sleep longer than the polling interval without
//! looking at the interrupt flag.
use parking_lot::Condvar;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use thiserror::Error;

use crate::runtime::config;

/// Returned by [`ReusableBarrier::wait`] when the barrier was interrupted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("barrier wait interrupted")]
pub struct Interrupted;

/// Reusable, resizable, interruptible rendezvous barrier.
pub struct ReusableBarrier {
    size: AtomicUsize,
    entry_counter: AtomicUsize,
    exit_counter: AtomicUsize,
    interrupts: AtomicUsize,
    mutex: Mutex<()>,
    cond: Condvar,
    poll_interval: Duration,
}

impl ReusableBarrier {
    /// Create a barrier for `size` participants.
    ///
    /// The interrupt polling interval is taken from the configuration.
    pub fn new(size: usize) -> Self {
        Self::with_poll_interval(size, config::config().barrier_poll_interval())
    }

    /// Create a barrier for `size` participants with an explicit polling interval.
    pub fn with_poll_interval(size: usize, poll_interval: Duration) -> Self {
        Self {
            size: AtomicUsize::new(size),
            entry_counter: AtomicUsize::new(0),
            exit_counter: AtomicUsize::new(0),
            interrupts: AtomicUsize::new(0),
            mutex: Mutex::new(()),
            cond: Condvar::new(),
            poll_interval,
        }
    }

    /// Number of participants.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Resize the barrier for `size` participants.
    ///
    /// Must only be called while no participant is inside [`wait`](Self::wait).
    /// Resets both counters and clears a pending interrupt.
    pub fn resize(&self, size: usize) {
        self.size.store(size, Ordering::Release);
        self.entry_counter.store(0, Ordering::Release);
        self.exit_counter.store(0, Ordering::Release);
        self.interrupts.store(0, Ordering::Release);
    }

    /// Abort all current and future waits until the interrupt is cleared.
    pub fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::AcqRel);
        self.cond.notify_all();
    }

    /// Clear a pending interrupt.
    ///
    /// Must only be called while no participant is inside [`wait`](Self::wait).
    /// Also resets both counters, dropping arrivals of the interrupted round.
    pub fn clear_interrupt(&self) {
        self.entry_counter.store(0, Ordering::Release);
        self.exit_counter.store(0, Ordering::Release);
        self.interrupts.store(0, Ordering::Release);
    }

    /// Whether the barrier is currently interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.interrupts.load(Ordering::Acquire) != 0
    }

    /// Block until all participants called `wait()`.
    ///
    /// Returns immediately if the barrier has at most one participant.
    pub fn wait(&self) -> Result<(), Interrupted> {
        let size = self.size();
        if size <= 1 {
            return Ok(());
        }
        self.check_interrupt()?;

        // entry phase
        Self::arrive(&self.entry_counter, size);
        {
            let mut guard = self.mutex.lock();
            while self.entry_counter.load(Ordering::Acquire) != 0 {
                self.check_interrupt()?;
                self.cond.wait_for(&mut guard, self.poll_interval);
            }
        }
        self.cond.notify_all();

        // exit phase, to get the entry counter into a known state
        Self::arrive(&self.exit_counter, size);
        while self.exit_counter.load(Ordering::Acquire) != 0 {
            self.check_interrupt()?;
            std::thread::yield_now();
        }

        Ok(())
    }

    // increment and wrap to zero once everybody arrived
    fn arrive(counter: &AtomicUsize, size: usize) {
        counter.fetch_add(1, Ordering::AcqRel);
        let _ = counter.compare_exchange(size, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    fn check_interrupt(&self) -> Result<(), Interrupted> {
        if self.is_interrupted() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

impl Default for ReusableBarrier {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for ReusableBarrier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ReusableBarrier")
            .field("size", &self.size())
            .field("entry_counter", &self.entry_counter.load(Ordering::Relaxed))
            .field("exit_counter", &self.exit_counter.load(Ordering::Relaxed))
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}
