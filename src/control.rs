//! Cooperative stop control for the streaming turn in flight.
//!
//! The consumer raises the flag; the presenter checks it at every word
//! boundary and fragment receipt, and the transport checks it between
//! network chunks. There is no preemptive interrupt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag. Cloning hands out another handle to the same flag.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the current turn stop at its next check point.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Rearm before starting a new turn.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}
