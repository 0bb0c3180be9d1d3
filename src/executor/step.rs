//! Execution of individual steps: net resolution and phase invocation.

use tracing::{trace, warn};

use crate::component::{
    CompData, ExeComp, ExePhase, ExePort, PhaseCtx, PhaseFault, PhaseKind, RunArgs,
};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Location};
use crate::layout::Comp;
use crate::system::{ExeStep, ExeSystem};
use crate::types::{mask, CompIdx, NetIdx, PhaseIdx, Tick, Word, FLOATING};

fn record(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    warn!(%diagnostic, "Runtime diagnostic");
    diagnostics.push(diagnostic);
}

impl ExeSystem {
    pub(crate) fn begin_tick(&mut self) {
        self.runtime_diagnostics.clear();
        self.cursor.started = true;
    }

    pub(crate) fn execute_step(&mut self, step: ExeStep) {
        trace!(?step, tick = self.tick, "Execute step");
        self.stats.steps_executed += 1;
        match step {
            ExeStep::Net(ni) => self.propagate_net(ni),
            ExeStep::Phase { comp, phase } => self.run_phase(comp, phase),
        }
    }

    pub(crate) fn run_latch_steps(&mut self) {
        for i in 0..self.latch_steps.len() {
            if let ExeStep::Phase { comp, phase } = self.latch_steps[i] {
                self.run_phase(comp, phase);
            }
        }
    }

    /// Resolves a net's enabled drivers and fans the value out to its readers.
    fn propagate_net(&mut self, ni: NetIdx) {
        let ExeSystem {
            comps,
            nets,
            runtime_diagnostics,
            stats,
            tick,
            ..
        } = self;
        let net = &mut nets[ni];
        stats.net_propagations += 1;

        let mut enabled = 0;
        let mut value = FLOATING;
        for r in &net.inputs {
            let comp = &comps[r.comp_idx];
            let port = &comp.ports[r.port_idx];
            if comp.valid && port.io_enabled {
                enabled += 1;
                value = port.value;
            }
        }

        if enabled > 1 {
            value = FLOATING;
            stats.contentions += 1;
            let drivers: Vec<String> = net
                .inputs
                .iter()
                .filter(|r| comps[r.comp_idx].valid && comps[r.comp_idx].ports[r.port_idx].io_enabled)
                .map(|r| {
                    let comp = &comps[r.comp_idx];
                    format!("{}.{}", comp.comp.id, comp.ports[r.port_idx].name)
                })
                .collect();
            record(
                runtime_diagnostics,
                Diagnostic::new(
                    DiagnosticKind::BusContention,
                    Location::Net {
                        wire_ids: net.wire_ids.clone(),
                    },
                    format!("{enabled} drivers enabled at once: {}", drivers.join(", ")),
                )
                .at_tick(*tick),
            );
        }

        net.enabled_count = enabled;
        net.value = value & mask(net.width);
        for r in net.outputs.iter().filter(|r| r.valid) {
            let port = &mut comps[r.comp_idx].ports[r.port_idx];
            port.value = net.value & mask(port.width);
        }
    }

    /// Invokes one phase. A fault becomes a runtime diagnostic, and the
    /// phase's outputs float for the rest of the tick.
    fn run_phase(&mut self, ci: CompIdx, pi: PhaseIdx) {
        let ExeSystem {
            comps,
            run_args,
            runtime_diagnostics,
            stats,
            tick,
            ..
        } = self;
        let ExeComp {
            comp,
            ports,
            data,
            phases,
            sub_system,
            valid,
        } = &mut comps[ci];
        if !*valid {
            return;
        }
        let phase = &phases[pi];
        if phase.is_latch() {
            stats.latch_invocations += 1;
        } else {
            stats.phase_invocations += 1;
        }

        let result = match phase.kind {
            PhaseKind::Simple { func, .. } => {
                let before: Option<Vec<(Word, bool)>> = cfg!(debug_assertions)
                    .then(|| ports.iter().map(|p| (p.value, p.io_enabled)).collect());
                let result = func(&mut PhaseCtx {
                    ports: &mut ports[..],
                    data: &mut *data,
                    args: &mut *run_args,
                });
                if let Some(before) = before {
                    check_declared_writes(comp, ports, phase, &before, runtime_diagnostics, *tick);
                }
                result
            }
            PhaseKind::SubSystem => {
                if let Some(sub) = sub_system.as_deref_mut() {
                    settle_sub_system(&comp.id, ports, sub, run_args, runtime_diagnostics, *tick);
                }
                Ok(())
            }
            PhaseKind::SubSystemLatch => {
                if let Some(sub) = sub_system.as_deref_mut() {
                    latch_sub_system(&comp.id, sub, run_args, runtime_diagnostics, *tick);
                }
                Ok(())
            }
        };

        if let Err(fault) = result {
            stats.faults += 1;
            let kind = match fault {
                PhaseFault::Memory(_) => DiagnosticKind::MemoryFault,
                _ => DiagnosticKind::PhaseFault,
            };
            record(
                runtime_diagnostics,
                Diagnostic::new(kind, Location::comp(&comp.id), fault.to_string()).at_tick(*tick),
            );
            for &w in &phase.write_ports {
                if let Some(port) = ports.get_mut(w) {
                    port.value = FLOATING;
                    if port.ty.is_tristate() {
                        port.io_enabled = false;
                    }
                }
            }
        }
    }
}

/// Flags ports a phase changed without listing them as writes.
fn check_declared_writes(
    comp: &Comp,
    ports: &[ExePort],
    phase: &ExePhase,
    before: &[(Word, bool)],
    diagnostics: &mut Vec<Diagnostic>,
    tick: Tick,
) {
    for (pi, (port, &(value, enabled))) in ports.iter().zip(before).enumerate() {
        let changed = port.value != value || port.io_enabled != enabled;
        if changed && !phase.write_ports.contains(&pi) {
            record(
                diagnostics,
                Diagnostic::new(
                    DiagnosticKind::UndeclaredWrite,
                    Location::port(&comp.id, &port.name),
                    format!("phase wrote '{}' without declaring it", port.name),
                )
                .at_tick(tick),
            );
        }
    }
}

/// Copies boundary inputs in, settles the sub-system, copies outputs back.
///
/// Diagnostics raised inside are scoped under `parent_id` and stamped with
/// the parent's `tick`.
fn settle_sub_system(
    parent_id: &str,
    ports: &mut [ExePort],
    sub: &mut ExeSystem,
    run_args: &mut RunArgs,
    diagnostics: &mut Vec<Diagnostic>,
    tick: Tick,
) {
    for (port, boundary) in ports.iter().zip(&sub.boundary) {
        if !boundary.dir.is_input() {
            continue;
        }
        if let CompData::Value(v) = &mut sub.comps[boundary.comp_idx].data {
            *v = port.value & mask(boundary.width);
        }
    }

    sub.run_args.halt = false;
    sub.rewind();
    sub.settle();

    for (port, boundary) in ports.iter_mut().zip(&sub.boundary) {
        if !boundary.dir.is_output() {
            continue;
        }
        let value = sub.comps[boundary.comp_idx]
            .ports
            .first()
            .map_or(FLOATING, |p| p.value);
        port.value = value & mask(port.width);
    }

    if sub.run_args.halt {
        run_args.halt = true;
    }
    diagnostics.extend(
        sub.runtime_diagnostics
            .iter()
            .map(|d| d.clone().nested_in(parent_id).at_tick(tick)),
    );
}

/// Runs the sub-system's latch steps and closes its tick.
fn latch_sub_system(
    parent_id: &str,
    sub: &mut ExeSystem,
    run_args: &mut RunArgs,
    diagnostics: &mut Vec<Diagnostic>,
    tick: Tick,
) {
    let seen = sub.runtime_diagnostics.len();
    sub.run_latch_steps();
    sub.end_tick();

    if sub.run_args.halt {
        run_args.halt = true;
    }
    diagnostics.extend(
        sub.runtime_diagnostics[seen..]
            .iter()
            .map(|d| d.clone().nested_in(parent_id).at_tick(tick)),
    );
}
