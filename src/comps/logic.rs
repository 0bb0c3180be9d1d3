//! Bitwise gates, multiplexers and tristate buffers.

use crate::component::{CompData, ExePhase, PhaseCtx, PhaseFault, PhaseFn};
use crate::layout::{CompArgs, CompPort, PortDir};
use crate::library::{CompBuild, CompLibrary};
use crate::types::{Word, DEFAULT_WIDTH, FLOATING};

use super::{defs, select_width};

pub(crate) fn register(library: &mut CompLibrary) {
    library.register(defs::AND, |args: &CompArgs| build_gate(args, and_gate));
    library.register(defs::OR, |args: &CompArgs| build_gate(args, or_gate));
    library.register(defs::XOR, |args: &CompArgs| build_gate(args, xor_gate));
    library.register(defs::NOT, build_not);
    library.register(defs::MUX, build_mux);
    library.register(defs::TRIBUF, build_tribuf);
}

/// N-input gate: ports `in0..inN`, then `out`.
///
/// Args: `inputs` (default 2, at least 1), `width` (default 32).
fn build_gate(args: &CompArgs, func: PhaseFn) -> CompBuild {
    let inputs = args.u64_or("inputs", 2).max(1) as usize;
    let width = args.width_or("width", DEFAULT_WIDTH);
    let mut ports: Vec<CompPort> = (0..inputs)
        .map(|i| CompPort::new(format!("in{i}"), PortDir::IN).with_width(width))
        .collect();
    ports.push(CompPort::new("out", PortDir::OUT).with_width(width));
    CompBuild {
        ports,
        phases: vec![ExePhase::new((0..inputs).collect(), vec![inputs], func)],
        errors: Vec::new(),
        data: CompData::None,
    }
}

fn fold_inputs(ctx: &mut PhaseCtx<'_>, init: Word, op: fn(Word, Word) -> Word) {
    let out = ctx.ports.len() - 1;
    let value = ctx.ports[..out].iter().fold(init, |acc, p| op(acc, p.value));
    ctx.set(out, value);
}

fn and_gate(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    fold_inputs(ctx, Word::MAX, |a, b| a & b);
    Ok(())
}

fn or_gate(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    fold_inputs(ctx, 0, |a, b| a | b);
    Ok(())
}

fn xor_gate(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    fold_inputs(ctx, 0, |a, b| a ^ b);
    Ok(())
}

fn build_not(args: &CompArgs) -> CompBuild {
    let width = args.width_or("width", DEFAULT_WIDTH);
    CompBuild {
        ports: vec![
            CompPort::new("in", PortDir::IN).with_width(width),
            CompPort::new("out", PortDir::OUT).with_width(width),
        ],
        phases: vec![ExePhase::new(vec![0], vec![1], not_gate)],
        errors: Vec::new(),
        data: CompData::None,
    }
}

fn not_gate(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let value = !ctx.get(0);
    ctx.set(1, value);
    Ok(())
}

/// Mux port layout: `sel`, `in0..inN`, `out`.
pub const MUX_SEL: usize = 0;

/// N-way multiplexer.
///
/// Args: `inputs` (default 2, at least 2), `width` (default 32). A selector
/// past the last input floats the output.
fn build_mux(args: &CompArgs) -> CompBuild {
    let inputs = args.u64_or("inputs", 2).max(2) as usize;
    let width = args.width_or("width", DEFAULT_WIDTH);
    let mut ports = vec![CompPort::new("sel", PortDir::IN | PortDir::CTRL)
        .with_width(select_width(inputs))];
    ports.extend((0..inputs).map(|i| CompPort::new(format!("in{i}"), PortDir::IN).with_width(width)));
    ports.push(CompPort::new("out", PortDir::OUT).with_width(width));
    CompBuild {
        ports,
        phases: vec![ExePhase::new((0..=inputs).collect(), vec![inputs + 1], mux)],
        errors: Vec::new(),
        data: CompData::None,
    }
}

fn mux(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let out = ctx.ports.len() - 1;
    let sel = ctx.get(MUX_SEL) as usize;
    for (leg, port) in ctx.ports[1..out].iter_mut().enumerate() {
        port.io_enabled = leg == sel;
    }
    let value = if sel + 1 < out { ctx.get(sel + 1) } else { FLOATING };
    ctx.set(out, value);
    Ok(())
}

/// Tristate buffer port layout.
pub const TRIBUF_IN: usize = 0;
pub const TRIBUF_EN: usize = 1;
pub const TRIBUF_OUT: usize = 2;

/// Drives `in` onto `out` while `en` is non-zero; releases the net otherwise.
fn build_tribuf(args: &CompArgs) -> CompBuild {
    let width = args.width_or("width", DEFAULT_WIDTH);
    CompBuild {
        ports: vec![
            CompPort::new("in", PortDir::IN).with_width(width),
            CompPort::new("en", PortDir::IN | PortDir::CTRL).with_width(1),
            CompPort::new("out", PortDir::OUT_TRI).with_width(width),
        ],
        phases: vec![ExePhase::new(
            vec![TRIBUF_IN, TRIBUF_EN],
            vec![TRIBUF_OUT],
            tribuf,
        )],
        errors: Vec::new(),
        data: CompData::None,
    }
}

fn tribuf(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let enabled = ctx.get(TRIBUF_EN) != 0;
    let value = ctx.get(TRIBUF_IN);
    ctx.set_enabled(TRIBUF_OUT, enabled);
    ctx.set(TRIBUF_OUT, value);
    Ok(())
}
