//! Coordination Group
//!
//! Shared state of all blocks that stream through the same device: which
//! blocks currently have streaming ports, and the TX/RX barriers sized to
//! that number. One group is created per device (or flowgraph) and handed to
//! every block that should rendezvous with its siblings.
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::runtime::ReusableBarrier;
use crate::runtime::config;

/// Registry of streaming participants and their shared barriers.
#[derive(Debug)]
pub struct CoordinationGroup {
    // the mutex is the setup lock; barrier resizes only happen while holding it
    active: Mutex<BTreeMap<String, bool>>,
    tx_barrier: ReusableBarrier,
    rx_barrier: ReusableBarrier,
}

impl CoordinationGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::with_poll_interval(config::config().barrier_poll_interval())
    }

    /// Create an empty group whose barriers poll for interrupts at `poll_interval`.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            active: Mutex::new(BTreeMap::new()),
            tx_barrier: ReusableBarrier::with_poll_interval(0, poll_interval),
            rx_barrier: ReusableBarrier::with_poll_interval(0, poll_interval),
        }
    }

    /// Record the negotiated port counts of a participant.
    ///
    /// Participants with at least one port are registered, participants
    /// without ports are removed. Both barriers are resized to the number of
    /// registered participants. Returns the new barrier size.
    pub fn check_topology(&self, participant: &str, n_inputs: usize, n_outputs: usize) -> usize {
        let mut active = self.active.lock();
        if n_inputs > 0 || n_outputs > 0 {
            active.insert(participant.to_string(), true);
        } else {
            active.remove(participant);
        }
        let n = active.len();
        debug!("RFNoC blocks with streaming ports: {n}");
        self.tx_barrier.resize(n);
        self.rx_barrier.resize(n);
        n
    }

    /// Whether the participant is registered as streaming.
    pub fn is_active(&self, participant: &str) -> bool {
        self.active.lock().get(participant).copied().unwrap_or(false)
    }

    /// Number of registered streaming participants.
    pub fn active_participants(&self) -> usize {
        self.active.lock().len()
    }

    /// Barrier passed after all participants set up their TX streamers.
    pub fn tx_barrier(&self) -> &ReusableBarrier {
        &self.tx_barrier
    }

    /// Barrier passed after all participants set up their RX streamers.
    pub fn rx_barrier(&self) -> &ReusableBarrier {
        &self.rx_barrier
    }

    /// Interrupt both barriers, aborting all blocked and future waits.
    pub fn interrupt(&self) {
        warn!("interrupting coordination group");
        self.tx_barrier.interrupt();
        self.rx_barrier.interrupt();
    }

    /// Clear an interrupt on both barriers.
    ///
    /// Must only be called once all waits on the barriers returned.
    pub fn clear_interrupt(&self) {
        self.tx_barrier.clear_interrupt();
        self.rx_barrier.clear_interrupt();
    }
}

impl Default for CoordinationGroup {
    fn default() -> Self {
        Self::new()
    }
}
