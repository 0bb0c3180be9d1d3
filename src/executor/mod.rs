//! Tick execution for compiled systems.
//!
//! A tick has two halves. First every execution step runs in its compiled
//! order: net steps resolve drivers into a value and fan it out to readers,
//! phase steps invoke a component phase. Then every latch step runs, in
//! declaration order, committing new state that later phases only see from
//! the next tick on.
//!
//! Both halves are observable. [`ExeSystem::step`](crate::system::ExeSystem::step)
//! runs a single execution step, and
//! [`ExeSystem::settle`](crate::system::ExeSystem::settle) stops right before
//! the latch steps, so a debugger can inspect settled combinational values
//! before the clock edge is applied.
//!
//! # Nets
//!
//! A net's value comes from its enabled drivers:
//!
//! - none enabled: the net floats and reads [`FLOATING`](crate::types::FLOATING);
//! - one enabled: the net carries that driver's value, masked to the net width;
//! - several enabled: the net floats for this tick and a `BusContention`
//!   runtime diagnostic names every enabled driver.
//!
//! Each reader receives the net value masked to its own width.

mod step;
mod tick;

use serde::{Deserialize, Serialize};

use crate::system::ExeStep;
use crate::types::Tick;

/// Position within the current tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Index of the next execution step
    pub(crate) next: usize,
    /// Set once the first step of a tick has begun
    pub(crate) started: bool,
}

impl Cursor {
    pub fn next_step(&self) -> usize {
        self.next
    }

    /// True once any part of the current tick has run.
    pub fn in_tick(&self) -> bool {
        self.started
    }
}

/// Result of a single-step request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The given execution step ran
    Stepped(ExeStep),
    /// Every execution step of the tick has run; only latching remains
    Settled,
}

/// What a free run did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Ticks completed by this run
    pub ticks: u64,
    /// True if the run stopped on the halt flag rather than the tick limit
    pub halted: bool,
    pub final_tick: Tick,
}
