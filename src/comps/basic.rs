//! Sources, sinks and sub-circuit boundary components.

use crate::component::{CompData, ExePhase, PhaseCtx, PhaseFault, ProbeData};
use crate::layout::{CompArgs, CompPort, PortDir};
use crate::library::{CompBuild, CompLibrary};
use crate::types::{mask, DEFAULT_WIDTH};

use super::defs;

/// Port index of the single output of `const`, `input` and `io.in`.
pub const OUT: usize = 0;
/// Port index of the single input of `probe`, `halt` and `io.out`.
pub const IN: usize = 0;

pub(crate) fn register(library: &mut CompLibrary) {
    library.register(defs::CONST, build_source);
    library.register(defs::INPUT, build_source);
    library.register(defs::IO_IN, build_source);
    library.register(defs::PROBE, build_probe);
    library.register(defs::HALT, build_halt);
    library.register(defs::IO_OUT, build_io_out);
}

/// `const`, `input`, `io.in`: drives the stored value onto `out`.
///
/// Args: `width` (default 32), `value` (default 0).
fn build_source(args: &CompArgs) -> CompBuild {
    let width = args.width_or("width", DEFAULT_WIDTH);
    let value = args.u64_or("value", 0) & mask(width);
    CompBuild {
        ports: vec![CompPort::new("out", PortDir::OUT).with_width(width)],
        phases: vec![ExePhase::new(vec![], vec![OUT], drive_value)],
        errors: Vec::new(),
        data: CompData::Value(value),
    }
}

fn drive_value(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let value = *ctx.data.as_value_mut()?;
    ctx.set(OUT, value);
    Ok(())
}

/// `probe`: records the value on `in`.
fn build_probe(args: &CompArgs) -> CompBuild {
    let mut port = CompPort::new("in", PortDir::IN);
    port.width = args.get_u64("width").map(|w| w as u32);
    CompBuild {
        ports: vec![port],
        phases: vec![ExePhase::new(vec![IN], vec![], observe)],
        errors: Vec::new(),
        data: CompData::Probe(ProbeData::default()),
    }
}

fn observe(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let value = ctx.get(IN);
    let probe = ctx.data.as_probe_mut()?;
    if probe.value != value {
        probe.value = value;
        probe.changes += 1;
    }
    Ok(())
}

/// `halt`: sets the halt flag while `in` is non-zero.
fn build_halt(_args: &CompArgs) -> CompBuild {
    CompBuild {
        ports: vec![CompPort::new("in", PortDir::IN | PortDir::CTRL).with_width(1)],
        phases: vec![ExePhase::new(vec![IN], vec![], raise_halt)],
        errors: Vec::new(),
        data: CompData::None,
    }
}

fn raise_halt(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    if ctx.get(IN) != 0 {
        ctx.args.halt = true;
    }
    Ok(())
}

/// `io.out`: a reader the enclosing component copies out of. No phases.
fn build_io_out(args: &CompArgs) -> CompBuild {
    let mut port = CompPort::new("in", PortDir::IN);
    port.width = args.get_u64("width").map(|w| w as u32);
    CompBuild {
        ports: vec![port],
        phases: Vec::new(),
        errors: Vec::new(),
        data: CompData::None,
    }
}
