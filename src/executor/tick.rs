//! Tick-level control of an execution system.

use tracing::debug;

use super::{Cursor, RunSummary, StepOutcome};
use crate::component::{CompData, RunArgs};
use crate::library::{LibraryError, ResetOptions};
use crate::stats::ExecStats;
use crate::system::{ExeStep, ExeSystem};
use crate::types::FLOATING;

impl ExeSystem {
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// The execution step the next [`step`](Self::step) call will run.
    pub fn next_step(&self) -> Option<ExeStep> {
        self.execution_steps.get(self.cursor.next).copied()
    }

    /// True when every execution step of the current tick has run and only
    /// the latch steps remain.
    pub fn is_settled(&self) -> bool {
        self.cursor.next >= self.execution_steps.len()
    }

    pub fn is_halted(&self) -> bool {
        self.run_args.halt
    }

    /// Runs the next execution step of the current tick.
    ///
    /// Honoured even while halted. Latch steps are never run from here;
    /// once the tick has settled this returns [`StepOutcome::Settled`] until
    /// [`latch`](Self::latch) is called.
    pub fn step(&mut self) -> StepOutcome {
        if !self.cursor.started {
            self.begin_tick();
        }
        let Some(step) = self.next_step() else {
            return StepOutcome::Settled;
        };
        self.cursor.next += 1;
        self.execute_step(step);
        StepOutcome::Stepped(step)
    }

    /// Runs the remaining execution steps of the tick and returns how many ran.
    pub fn settle(&mut self) -> usize {
        let mut ran = 0;
        while let StepOutcome::Stepped(_) = self.step() {
            ran += 1;
        }
        ran
    }

    /// Applies the clock edge: settles if needed, runs every latch step and
    /// starts the next tick.
    pub fn latch(&mut self) {
        self.settle();
        self.run_latch_steps();
        self.end_tick();
    }

    /// Runs one complete tick. Honoured even while halted.
    pub fn tick(&mut self) {
        self.latch();
    }

    /// Runs ticks until `max_ticks` complete or the halt flag is raised.
    ///
    /// A halt raised during a tick lets that tick finish; the run stops
    /// before the next one. A system that is already halted runs nothing.
    pub fn run(&mut self, max_ticks: u64) -> RunSummary {
        let mut ticks = 0;
        while ticks < max_ticks && !self.run_args.halt {
            self.tick();
            ticks += 1;
        }
        let summary = RunSummary {
            ticks,
            halted: self.run_args.halt,
            final_tick: self.tick,
        };
        debug!(
            ticks = summary.ticks,
            halted = summary.halted,
            final_tick = summary.final_tick,
            "Run finished"
        );
        summary
    }

    pub fn halt(&mut self) {
        self.run_args.halt = true;
    }

    /// Clears the halt flag so free running may continue.
    pub fn resume(&mut self) {
        self.run_args.halt = false;
    }

    /// Discards progress through the current tick so the next step starts it
    /// afresh. Latched state is untouched, so changed inputs can be
    /// re-evaluated without applying a clock edge.
    pub fn rewind(&mut self) {
        self.cursor = Cursor::default();
    }

    pub(crate) fn end_tick(&mut self) {
        self.tick += 1;
        self.stats.ticks += 1;
        self.cursor = Cursor::default();
    }

    /// Restores power-on state.
    ///
    /// Component payloads are rebuilt through the library and `options`
    /// applied to them; ports and nets float; the tick counter, halt flag,
    /// runtime diagnostics and counters are cleared. Compile diagnostics and
    /// the step lists are kept.
    ///
    /// Every payload, sub-systems included, is rebuilt before anything is
    /// replaced, so an `Err` leaves the system exactly as it was.
    pub fn reset(&mut self, options: &ResetOptions) -> Result<(), LibraryError> {
        let fresh = self.fresh_payloads(options)?;
        self.apply_reset(fresh);
        debug!("System reset");
        Ok(())
    }

    fn fresh_payloads(&self, options: &ResetOptions) -> Result<Vec<Fresh>, LibraryError> {
        self.comps
            .iter()
            .map(|comp| {
                if let Some(sub) = comp.sub_system.as_deref() {
                    return sub.fresh_payloads(options).map(Fresh::Sub);
                }
                match self.library.reset(comp, options) {
                    Ok(data) => Ok(Fresh::Data(data)),
                    Err(LibraryError::UnknownDefinition(_)) => Ok(Fresh::Keep),
                    Err(e) => Err(e),
                }
            })
            .collect()
    }

    fn apply_reset(&mut self, fresh: Vec<Fresh>) {
        for (comp, fresh) in self.comps.iter_mut().zip(fresh) {
            for port in &mut comp.ports {
                port.reset();
            }
            if !comp.valid {
                comp.invalidate();
            }
            match fresh {
                Fresh::Keep => {}
                Fresh::Data(data) => comp.data = data,
                Fresh::Sub(inner) => {
                    if let Some(sub) = comp.sub_system.as_deref_mut() {
                        sub.apply_reset(inner);
                    }
                }
            }
        }
        for net in &mut self.nets {
            net.value = FLOATING;
            net.enabled_count = 0;
        }

        self.run_args = RunArgs::default();
        self.tick = 0;
        self.cursor = Cursor::default();
        self.runtime_diagnostics.clear();
        self.stats = ExecStats::default();
    }
}

/// Replacement state for one component during a reset.
enum Fresh {
    /// Unknown definition; the placeholder payload stays
    Keep,
    Data(CompData),
    Sub(Vec<Fresh>),
}
