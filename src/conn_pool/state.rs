//! Connection pool lifecycle state machine.
//!
//! # State Transitions
//! ```text
//! Uninitialized → Ready         first successful check_and_init
//! Ready → Uninitialized         transport lost, pool may be re-initialised
//! Uninitialized → Closed        shutdown before any connection existed
//! Ready → Draining              shutdown with streams in flight
//! Ready|Draining → Closed       shutdown once the last stream is released
//! any → Closed                  close
//! ```
//!
//! # Design Decisions
//! - State and in-flight count are atomics; no lock on the stream path
//! - Stream admission increments first and re-checks the state, so a
//!   concurrent shutdown never misses a stream nor strands a drain

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Lifecycle state of a connection pool.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolState {
    Uninitialized = 0,
    Ready = 1,
    Draining = 2,
    Closed = 3,
}

impl From<u8> for PoolState {
    fn from(val: u8) -> Self {
        match val {
            1 => PoolState::Ready,
            2 => PoolState::Draining,
            3 => PoolState::Closed,
            _ => PoolState::Uninitialized,
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolState::Uninitialized => "uninitialized",
            PoolState::Ready => "ready",
            PoolState::Draining => "draining",
            PoolState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Atomic state plus in-flight stream count shared by pool implementations.
#[derive(Debug, Default)]
pub struct PoolLifecycle {
    state: AtomicU8,
    active_streams: AtomicUsize,
}

impl PoolLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PoolState {
        PoolState::from(self.state.load(Ordering::Acquire))
    }

    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::Acquire)
    }

    fn transition(&self, from: PoolState, to: PoolState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Uninitialized → Ready. Fails if the pool was shut down meanwhile.
    pub fn mark_ready(&self) -> bool {
        self.transition(PoolState::Uninitialized, PoolState::Ready)
    }

    /// Ready → Uninitialized after the transport went away.
    pub fn reset(&self) -> bool {
        self.transition(PoolState::Ready, PoolState::Uninitialized)
    }

    /// Admit one stream. Returns the blocking state if the pool is not `Ready`.
    pub fn try_acquire_stream(&self) -> Result<(), PoolState> {
        let state = self.state();
        if state != PoolState::Ready {
            return Err(state);
        }
        self.active_streams.fetch_add(1, Ordering::AcqRel);
        let state = self.state();
        if state != PoolState::Ready {
            self.release_stream();
            return Err(state);
        }
        Ok(())
    }

    /// Release one stream. Returns `true` if this completed a drain.
    pub fn release_stream(&self) -> bool {
        let prev = self.active_streams.fetch_sub(1, Ordering::AcqRel);
        prev == 1 && self.transition(PoolState::Draining, PoolState::Closed)
    }

    /// Graceful shutdown. Returns the state after the call.
    pub fn shutdown(&self) -> PoolState {
        loop {
            match self.state() {
                PoolState::Uninitialized => {
                    if self.transition(PoolState::Uninitialized, PoolState::Closed) {
                        return PoolState::Closed;
                    }
                }
                PoolState::Ready => {
                    if self.transition(PoolState::Ready, PoolState::Draining) {
                        if self.active_streams() == 0
                            && self.transition(PoolState::Draining, PoolState::Closed)
                        {
                            return PoolState::Closed;
                        }
                        return self.state();
                    }
                }
                other => return other,
            }
        }
    }

    /// Forceful close. Returns the previous state.
    pub fn close(&self) -> PoolState {
        PoolState::from(self.state.swap(PoolState::Closed as u8, Ordering::AcqRel))
    }
}
