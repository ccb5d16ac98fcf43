//! # depot-gate
//!
//! Counting admission gates bounding concurrent operations per category.
//!
//! A [`Gate`] is a fixed-capacity counter: `try_acquire` either reserves a
//! unit immediately or fails with [`GateError::Exhausted`] — it never queues
//! or parks a caller. The reservation is a [`GateGuard`] that releases on
//! drop, so every exit path of the wrapped call returns the unit.
//!
//! Depot runs two independent gates: one for upload/download transfers, one
//! for listing. Saturation of one never blocks the other.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GateError {
    /// All units are in use. Retriable at the caller's discretion.
    #[error("{0} limit exceeded")]
    Exhausted(&'static str),

    /// The caller's cancellation signal fired before a unit was reserved.
    #[error("cancelled while acquiring {0} slot")]
    Cancelled(&'static str),
}

/// Caller-supplied cancellation signal, checked ahead of reservation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A capacity-bounded counter guarding one operation category.
#[derive(Debug)]
pub struct Gate {
    name: &'static str,
    capacity: usize,
    in_use: AtomicUsize,
}

impl Gate {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            in_use: AtomicUsize::new(0),
        }
    }

    /// Non-blocking reservation. Cancellation wins over exhaustion: a
    /// triggered flag yields `Cancelled` even when capacity is free.
    pub fn try_acquire(&self, cancel: &CancelFlag) -> Result<GateGuard<'_>, GateError> {
        if cancel.is_cancelled() {
            return Err(GateError::Cancelled(self.name));
        }

        // Test-and-increment as one atomic step; losers are rejected, not
        // parked.
        let mut current = self.in_use.load(Ordering::Relaxed);
        loop {
            if current >= self.capacity {
                return Err(GateError::Exhausted(self.name));
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    trace!(gate = self.name, in_use = current + 1, "slot acquired");
                    return Ok(GateGuard { gate: self });
                }
                Err(observed) => current = observed,
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

/// Scoped reservation: returns its unit when dropped.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a Gate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let prev = self.gate.in_use.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "gate released more units than acquired");
        trace!(gate = self.gate.name, in_use = prev - 1, "slot released");
    }
}

/// The two gates of the service, built from configured capacities.
#[derive(Debug)]
pub struct Admission {
    pub transfer: Gate,
    pub list: Gate,
}

impl Admission {
    pub fn new(transfer_capacity: usize, list_capacity: usize) -> Self {
        Self {
            transfer: Gate::new("upload/download", transfer_capacity),
            list: Gate::new("list", list_capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn acquire_up_to_capacity_then_exhausted() {
        let gate = Gate::new("test", 2);
        let cancel = CancelFlag::new();

        let a = gate.try_acquire(&cancel).unwrap();
        let b = gate.try_acquire(&cancel).unwrap();
        assert_eq!(gate.in_use(), 2);

        let err = gate.try_acquire(&cancel).unwrap_err();
        assert_eq!(err, GateError::Exhausted("test"));

        drop(a);
        drop(b);
        assert_eq!(gate.in_use(), 0);
        assert!(gate.try_acquire(&cancel).is_ok());
    }

    #[test]
    fn guard_releases_on_every_exit_path() {
        let gate = Gate::new("test", 1);
        let cancel = CancelFlag::new();

        {
            let _guard = gate.try_acquire(&cancel).unwrap();
            assert_eq!(gate.in_use(), 1);
        }
        assert_eq!(gate.in_use(), 0);

        // Release also happens when the holding scope unwinds.
        let result = std::panic::catch_unwind(|| {
            let _guard = gate.try_acquire(&cancel).unwrap();
            panic!("handler failed");
        });
        assert!(result.is_err());
        assert_eq!(gate.in_use(), 0);
    }

    #[test]
    fn cancellation_wins_over_free_capacity() {
        let gate = Gate::new("test", 4);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = gate.try_acquire(&cancel).unwrap_err();
        assert_eq!(err, GateError::Cancelled("test"));
        assert_eq!(gate.in_use(), 0);
    }

    #[test]
    fn racing_acquires_admit_exactly_capacity() {
        const CAPACITY: usize = 4;
        const RACERS: usize = 16;

        let gate = Arc::new(Gate::new("test", CAPACITY));
        let barrier = Arc::new(Barrier::new(RACERS));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..RACERS)
            .map(|_| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                let admitted = admitted.clone();
                thread::spawn(move || {
                    let cancel = CancelFlag::new();
                    barrier.wait();
                    if let Ok(guard) = gate.try_acquire(&cancel) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                        // Hold the slot until every racer has attempted.
                        thread::sleep(std::time::Duration::from_millis(50));
                        drop(guard);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), CAPACITY);
        assert_eq!(gate.in_use(), 0);

        // Capacity is fully available again after the releases.
        let cancel = CancelFlag::new();
        let guards: Vec<_> = (0..CAPACITY)
            .map(|_| gate.try_acquire(&cancel).unwrap())
            .collect();
        assert_eq!(guards.len(), CAPACITY);
    }

    #[test]
    fn gates_are_independent() {
        let admission = Admission::new(1, 1);
        let cancel = CancelFlag::new();

        let _transfer = admission.transfer.try_acquire(&cancel).unwrap();
        assert!(admission.transfer.try_acquire(&cancel).is_err());
        // Saturating the transfer gate leaves the list gate untouched.
        assert!(admission.list.try_acquire(&cancel).is_ok());
    }
}
