//! Built-in components exercised inside compiled circuits, plus a custom
//! definition registered alongside them.

use std::sync::Arc;

use gatework::comps::{defs, AluOp};
use gatework::library::CompBuild;
use gatework::{
    compile, create_default_library, Comp, CompArgs, CompData, CompLibrary, CompPort, CpuLayout,
    DiagnosticKind, ExePhase, ExeSystem, Location, PhaseCtx, PhaseFault, PortDir, WireGraph,
};

fn width(w: u64) -> CompArgs {
    CompArgs::new().with("width", w)
}

fn build(layout: &CpuLayout) -> ExeSystem {
    compile(layout, Arc::new(create_default_library())).unwrap()
}

/// Drives each `(port, width)` of `target` from an input `i0..iN` and probes
/// `out_port` as `p`.
fn harness(target: Comp, inputs: &[(&str, u64)], out_port: &str) -> CpuLayout {
    let target_id = target.id.clone();
    let mut layout = CpuLayout::new()
        .with_comp(target)
        .with_comp(Comp::new("p", defs::PROBE))
        .with_wire(WireGraph::connecting(
            "wout",
            [(target_id.as_str(), out_port), ("p", "in")],
        ));
    for (i, &(port, bits)) in inputs.iter().enumerate() {
        let id = format!("i{i}");
        layout = layout
            .with_comp(Comp::new(id.clone(), defs::INPUT).with_args(width(bits)))
            .with_wire(WireGraph::connecting(
                format!("w{i}"),
                [(id.as_str(), "out"), (target_id.as_str(), port)],
            ));
    }
    layout
}

// ============================================================================
// Combinational
// ============================================================================

#[test]
fn test_three_input_gates() {
    let cases = [
        (defs::AND, 0b0100),
        (defs::OR, 0b1111),
        (defs::XOR, 0b0101),
    ];
    for (def, expected) in cases {
        let gate = Comp::new("g", def).with_args(width(4).with("inputs", 3));
        let layout = harness(gate, &[("in0", 4), ("in1", 4), ("in2", 4)], "out");
        let mut sys = build(&layout);
        assert!(sys.diagnostics.is_empty(), "{def}: {:?}", sys.diagnostics);

        sys.set_input("i0", 0b1110);
        sys.set_input("i1", 0b0111);
        sys.set_input("i2", 0b1100);
        sys.settle();
        assert_eq!(sys.port_value("p", "in"), Some(expected), "{def}");
    }
}

#[test]
fn test_alu_ops_through_circuit() {
    let alu = Comp::new("alu", defs::ALU).with_args(width(8));
    let layout = harness(alu, &[("a", 8), ("b", 8), ("op", 4)], "out");
    let mut sys = build(&layout);
    sys.set_input("i0", 12);
    sys.set_input("i1", 5);

    for (op, expected) in [
        (AluOp::Add, 17),
        (AluOp::Sub, 7),
        (AluOp::And, 4),
        (AluOp::Or, 13),
        (AluOp::Xor, 9),
        (AluOp::Shl, 12 << 5),
        (AluOp::PassA, 12),
        (AluOp::PassB, 5),
    ] {
        sys.set_input("i2", op.code());
        sys.tick();
        assert_eq!(sys.port_value("p", "in"), Some(expected & 0xff), "{op:?}");
    }

    sys.set_input("i1", 12);
    sys.set_input("i2", AluOp::Sub.code());
    sys.tick();
    assert_eq!(sys.port_value("alu", "zero"), Some(1));
}

#[test]
fn test_const_masked_to_width() {
    let layout = CpuLayout::new()
        .with_comp(Comp::new("k", defs::CONST).with_args(width(4).with("value", 0x1f)))
        .with_comp(Comp::new("p", defs::PROBE))
        .with_wire(WireGraph::connecting("w0", [("k", "out"), ("p", "in")]));
    let mut sys = build(&layout);
    sys.settle();
    assert_eq!(sys.port_value("p", "in"), Some(0xf));
    assert_eq!(sys.port("p", "in").map(|p| p.width), Some(4));
}

// ============================================================================
// State
// ============================================================================

#[test]
fn test_register_write_enable() {
    let reg = Comp::new("r", defs::REG).with_args(width(8).with("enable", true));
    let layout = harness(reg, &[("in", 8), ("we", 1)], "out");
    let mut sys = build(&layout);
    assert!(sys.diagnostics.is_empty(), "{:?}", sys.diagnostics);

    sys.set_input("i0", 0x5a);
    sys.tick();
    assert_eq!(sys.data("r").and_then(|d| d.value()), Some(0));

    sys.set_input("i1", 1);
    sys.tick();
    assert_eq!(sys.data("r").and_then(|d| d.value()), Some(0x5a));

    sys.set_input("i0", 0x11);
    sys.set_input("i1", 0);
    sys.tick();
    sys.settle();
    assert_eq!(sys.port_value("p", "in"), Some(0x5a));
}

#[test]
fn test_program_counter_jump() {
    let pc = Comp::new("pc", defs::PC).with_args(width(8).with("step", 1));
    let layout = harness(pc, &[("jmp", 8), ("jmp_en", 1)], "next");
    let mut sys = build(&layout);

    sys.tick();
    assert_eq!(sys.data("pc").and_then(|d| d.value()), Some(1));

    sys.set_input("i0", 0x40);
    sys.set_input("i1", 1);
    sys.tick();
    assert_eq!(sys.data("pc").and_then(|d| d.value()), Some(0x40));

    sys.set_input("i1", 0);
    sys.tick();
    sys.settle();
    assert_eq!(sys.port_value("pc", "out"), Some(0x41));
    assert_eq!(sys.port_value("p", "in"), Some(0x42));
}

#[test]
fn test_register_file_read_write() {
    let layout = CpuLayout::new()
        .with_comp(
            Comp::new("rf", defs::REGFILE)
                .with_args(width(8).with("count", 8).with("zero_reg", true)),
        )
        .with_comp(Comp::new("ra", defs::INPUT).with_args(width(3)))
        .with_comp(Comp::new("rb", defs::INPUT).with_args(width(3)))
        .with_comp(Comp::new("wa", defs::INPUT).with_args(width(3)))
        .with_comp(Comp::new("wd", defs::INPUT).with_args(width(8)))
        .with_comp(Comp::new("we", defs::INPUT).with_args(width(1)))
        .with_comp(Comp::new("pa", defs::PROBE))
        .with_comp(Comp::new("pb", defs::PROBE))
        .with_wire(WireGraph::connecting("w0", [("ra", "out"), ("rf", "ra")]))
        .with_wire(WireGraph::connecting("w1", [("rb", "out"), ("rf", "rb")]))
        .with_wire(WireGraph::connecting("w2", [("wa", "out"), ("rf", "wa")]))
        .with_wire(WireGraph::connecting("w3", [("wd", "out"), ("rf", "wd")]))
        .with_wire(WireGraph::connecting("w4", [("we", "out"), ("rf", "we")]))
        .with_wire(WireGraph::connecting("w5", [("rf", "a"), ("pa", "in")]))
        .with_wire(WireGraph::connecting("w6", [("rf", "b"), ("pb", "in")]));
    let mut sys = build(&layout);
    assert!(sys.diagnostics.is_empty(), "{:?}", sys.diagnostics);

    sys.set_input("we", 1);
    sys.set_input("wa", 5);
    sys.set_input("wd", 0x55);
    sys.tick();
    sys.set_input("wa", 0);
    sys.set_input("wd", 0x77);
    sys.tick();

    sys.set_input("we", 0);
    sys.set_input("ra", 5);
    sys.set_input("rb", 0);
    sys.settle();
    assert_eq!(sys.port_value("pa", "in"), Some(0x55));
    assert_eq!(sys.port_value("pb", "in"), Some(0));

    let regs = &sys.data("rf").and_then(|d| d.as_regfile()).unwrap().regs;
    assert_eq!(regs[5], 0x55);
    assert_eq!(regs[0], 0);
}

#[test]
fn test_probe_counts_changes() {
    let layout = CpuLayout::new()
        .with_comp(Comp::new("d", defs::INPUT).with_args(width(8)))
        .with_comp(Comp::new("p", defs::PROBE))
        .with_wire(WireGraph::connecting("w0", [("d", "out"), ("p", "in")]));
    let mut sys = build(&layout);

    for v in [1, 1, 2, 2, 3] {
        sys.set_input("d", v);
        sys.tick();
    }
    let probe = sys.data("p").and_then(|d| d.as_probe()).unwrap();
    assert_eq!(probe.value, 3);
    assert_eq!(probe.changes, 3);
}

// ============================================================================
// Custom definitions
// ============================================================================

fn increment(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let value = ctx.get(0).wrapping_add(1);
    ctx.set(1, value);
    Ok(())
}

fn build_increment(args: &CompArgs) -> CompBuild {
    let width = args.get_u64("width").unwrap_or(8) as u32;
    CompBuild {
        ports: vec![
            CompPort::new("in", PortDir::IN).with_width(width),
            CompPort::new("out", PortDir::OUT).with_width(width),
        ],
        phases: vec![ExePhase::new(vec![0], vec![1], increment)],
        errors: Vec::new(),
        data: CompData::None,
    }
}

#[test]
fn test_custom_definition_chains_with_builtins() {
    let mut library = create_default_library();
    library.register("inc", build_increment);

    let layout = CpuLayout::new()
        .with_comp(Comp::new("d", defs::INPUT).with_args(width(4)))
        .with_comp(Comp::new("a", "inc").with_args(width(4)))
        .with_comp(Comp::new("b", "inc").with_args(width(4)))
        .with_comp(Comp::new("p", defs::PROBE))
        .with_wire(WireGraph::connecting("w0", [("d", "out"), ("a", "in")]))
        .with_wire(WireGraph::connecting("w1", [("a", "out"), ("b", "in")]))
        .with_wire(WireGraph::connecting("w2", [("b", "out"), ("p", "in")]));
    let mut sys = compile(&layout, Arc::new(library)).unwrap();
    assert!(sys.diagnostics.is_empty(), "{:?}", sys.diagnostics);

    sys.set_input("d", 14);
    sys.settle();
    // 14 + 1 + 1 wraps at four bits
    assert_eq!(sys.port_value("p", "in"), Some(0));
}

/// Enables its tristate output without listing it as a write.
fn enable_silently(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    ctx.set_enabled(1, ctx.get(0) != 0);
    Ok(())
}

fn build_silent_driver(_: &CompArgs) -> CompBuild {
    CompBuild {
        ports: vec![
            CompPort::new("en", PortDir::IN).with_width(1),
            CompPort::new("out", PortDir::OUT_TRI).with_width(8),
        ],
        phases: vec![ExePhase::new(vec![0], vec![], enable_silently)],
        errors: Vec::new(),
        data: CompData::None,
    }
}

#[cfg(debug_assertions)]
#[test]
fn test_undeclared_enable_change_is_flagged() {
    let mut library = create_default_library();
    library.register("silent", build_silent_driver);

    let layout = CpuLayout::new()
        .with_comp(Comp::new("e", defs::INPUT).with_args(width(1)))
        .with_comp(Comp::new("s", "silent"))
        .with_wire(WireGraph::connecting("w0", [("e", "out"), ("s", "en")]));
    let mut sys = compile(&layout, Arc::new(library)).unwrap();

    sys.settle();
    assert!(sys.runtime_diagnostics.is_empty(), "{:?}", sys.runtime_diagnostics);
    sys.latch();

    sys.set_input("e", 1);
    sys.settle();
    let flagged: Vec<_> = sys
        .runtime_diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::UndeclaredWrite)
        .collect();
    assert_eq!(flagged.len(), 1, "{:?}", sys.runtime_diagnostics);
    assert_eq!(flagged[0].location, Location::port("s", "out"));
}

#[test]
fn test_empty_library_reports_every_builtin_as_unknown() {
    let layout = CpuLayout::new()
        .with_comp(Comp::new("k", defs::CONST))
        .with_comp(Comp::new("p", defs::PROBE));
    let sys = compile(&layout, Arc::new(CompLibrary::new())).unwrap();
    assert_eq!(sys.diagnostics.len(), 2);
    assert!(sys.comps.iter().all(|c| !c.valid));
}
