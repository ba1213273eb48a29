//! System time clock (STC) correlation.
//!
//! Producers periodically send TIMESTAMP packets pairing the decoder's 90 kHz
//! STC with an external timestamp. [`StcProvider`] keeps the most recent pair
//! together with the local instant it arrived at, and extrapolates the STC from
//! there until the next observation.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tracing::trace;

/// STC tick rate.
pub const STC_HZ: u64 = 90_000;

#[derive(Debug, Clone, Copy)]
struct Observation {
    stc: u32,
    timestamp_ms: u64,
    received_at: Instant,
}

/// Shared STC source for the decoders of one session.
#[derive(Debug, Default)]
pub struct StcProvider {
    last: Mutex<Option<Observation>>,
}

impl StcProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `(stc, timestamp)` observation.
    pub fn process_timestamp(&self, stc: u32, timestamp_ms: u64) {
        self.process_timestamp_at(stc, timestamp_ms, Instant::now());
    }

    pub(crate) fn process_timestamp_at(&self, stc: u32, timestamp_ms: u64, received_at: Instant) {
        trace!(stc, timestamp_ms, "stc observation");
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(Observation { stc, timestamp_ms, received_at });
    }

    /// STC extrapolated to now, or `None` before the first observation.
    pub fn current_stc(&self) -> Option<u32> {
        self.stc_at(Instant::now())
    }

    /// STC extrapolated to `now`. The 32-bit counter wraps.
    pub fn stc_at(&self, now: Instant) -> Option<u32> {
        let last = *self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.map(|obs| {
            let elapsed = now.saturating_duration_since(obs.received_at);
            let ticks = elapsed.as_micros() * u128::from(STC_HZ) / 1_000_000;
            obs.stc.wrapping_add(ticks as u32)
        })
    }

    /// External timestamp of the most recent observation.
    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).map(|obs| obs.timestamp_ms)
    }

    /// Forget the current observation.
    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
