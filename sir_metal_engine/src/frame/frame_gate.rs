//! Frame admission gate
//!
//! A counting semaphore sized to the number of frames in flight. The frame
//! loop `acquire`s a ticket before recording a frame and the GPU-completion
//! path hands it back with `complete`. While N tickets are outstanding,
//! `acquire` blocks, so per-slot resources (buffered constant buffers) are
//! never written while the GPU may still read them.

use std::sync::{Condvar, Mutex, MutexGuard};
use crate::error::Result;
use crate::{engine_bail, engine_err, engine_warn};

/// Upper bound on frames in flight
pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;

/// Permission to record one frame
///
/// Not `Clone`: a ticket is handed back exactly once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a frame ticket must be handed back with FrameGate::complete"]
pub struct FrameTicket {
    frame_index: u64,
    slot: u32,
}

impl FrameTicket {
    /// Monotonic frame counter, starting at 0
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// `frame_index % frames_in_flight`
    pub fn slot(&self) -> u32 {
        self.slot
    }
}

struct GateState {
    in_flight: u32,
    next_frame_index: u64,
}

pub struct FrameGate {
    state: Mutex<GateState>,
    retired: Condvar,
    max_in_flight: u32,
}

impl FrameGate {
    /// Create a gate admitting `max_in_flight` frames (clamped to `1..=MAX_FRAMES_IN_FLIGHT`)
    pub fn new(max_in_flight: u32) -> Self {
        let clamped = max_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
        if clamped != max_in_flight {
            engine_warn!("sirmetal::FrameGate",
                "{} frames in flight requested, using {}", max_in_flight, clamped);
        }
        Self {
            state: Mutex::new(GateState { in_flight: 0, next_frame_index: 0 }),
            retired: Condvar::new(),
            max_in_flight: clamped,
        }
    }

    /// Block until a frame slot is free, then admit the next frame
    pub fn acquire(&self) -> Result<FrameTicket> {
        let mut state = self.lock_state()?;
        while state.in_flight >= self.max_in_flight {
            state = self.retired
                .wait(state)
                .map_err(|_| engine_err!("sirmetal::FrameGate", "Frame gate mutex poisoned"))?;
        }
        Ok(self.admit(&mut state))
    }

    /// Admit the next frame if a slot is free, without blocking
    pub fn try_acquire(&self) -> Result<Option<FrameTicket>> {
        let mut state = self.lock_state()?;
        if state.in_flight >= self.max_in_flight {
            return Ok(None);
        }
        Ok(Some(self.admit(&mut state)))
    }

    /// Hand back a ticket once the GPU has retired its frame
    pub fn complete(&self, ticket: FrameTicket) -> Result<()> {
        let mut state = self.lock_state()?;
        if state.in_flight == 0 || ticket.frame_index >= state.next_frame_index {
            engine_bail!(InvalidOperation => "sirmetal::FrameGate",
                "Frame {} was not admitted by this gate", ticket.frame_index);
        }
        state.in_flight -= 1;
        drop(state);
        self.retired.notify_one();
        Ok(())
    }

    pub fn max_frames_in_flight(&self) -> u32 {
        self.max_in_flight
    }

    /// Frames admitted and not yet completed
    pub fn in_flight_count(&self) -> u32 {
        self.state.lock().map(|state| state.in_flight).unwrap_or(self.max_in_flight)
    }

    fn admit(&self, state: &mut GateState) -> FrameTicket {
        let frame_index = state.next_frame_index;
        state.next_frame_index += 1;
        state.in_flight += 1;
        FrameTicket {
            frame_index,
            slot: (frame_index % self.max_in_flight as u64) as u32,
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, GateState>> {
        self.state
            .lock()
            .map_err(|_| engine_err!("sirmetal::FrameGate", "Frame gate mutex poisoned"))
    }
}

#[cfg(test)]
#[path = "frame_gate_tests.rs"]
mod tests;
