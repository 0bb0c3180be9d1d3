//! Register file datapath example.
//!
//! A register file feeds an ALU whose result is written back on every tick.
//! The second operand comes either from the register file or from an
//! immediate, chosen by a multiplexer. A short program is applied one
//! instruction per tick by driving the control inputs, and the register
//! contents are printed after each instruction.

use std::sync::Arc;

use gatework::comps::{defs, AluOp};
use gatework::{compile, create_default_library, Comp, CompArgs, CpuLayout, ExeSystem, WireGraph};

const WIDTH: u64 = 16;
const REGISTERS: u64 = 8;

/// One instruction: `rd = ra <op> (imm or rb)`.
#[derive(Clone, Copy, Debug)]
struct Instr {
    op: AluOp,
    rd: u64,
    ra: u64,
    rb: u64,
    imm: Option<u64>,
}

impl Instr {
    const fn reg(op: AluOp, rd: u64, ra: u64, rb: u64) -> Self {
        Self { op, rd, ra, rb, imm: None }
    }

    const fn imm(op: AluOp, rd: u64, ra: u64, imm: u64) -> Self {
        Self { op, rd, ra, rb: 0, imm: Some(imm) }
    }
}

const PROGRAM: [Instr; 6] = [
    Instr::imm(AluOp::Add, 1, 0, 5),
    Instr::imm(AluOp::Add, 2, 0, 7),
    Instr::reg(AluOp::Add, 3, 1, 2),
    Instr::imm(AluOp::Shl, 4, 3, 2),
    Instr::reg(AluOp::Sub, 5, 4, 1),
    // discarded: r0 ignores writes
    Instr::reg(AluOp::Add, 0, 5, 5),
];

fn datapath() -> CpuLayout {
    let w = |bits: u64| CompArgs::new().with("width", bits);
    CpuLayout::new()
        .with_comp(
            Comp::new("rf", defs::REGFILE)
                .with_args(w(WIDTH).with("count", REGISTERS).with("zero_reg", true)),
        )
        .with_comp(Comp::new("alu", defs::ALU).with_args(w(WIDTH)))
        .with_comp(Comp::new("bsel", defs::MUX).with_args(w(WIDTH)))
        .with_comp(Comp::new("we", defs::CONST).with_args(w(1).with("value", 1)))
        .with_comp(Comp::new("ra", defs::INPUT).with_args(w(3)))
        .with_comp(Comp::new("rb", defs::INPUT).with_args(w(3)))
        .with_comp(Comp::new("rd", defs::INPUT).with_args(w(3)))
        .with_comp(Comp::new("op", defs::INPUT).with_args(w(4)))
        .with_comp(Comp::new("imm", defs::INPUT).with_args(w(WIDTH)))
        .with_comp(Comp::new("use_imm", defs::INPUT).with_args(w(1)))
        .with_wire(WireGraph::connecting("w_ra", [("ra", "out"), ("rf", "ra")]))
        .with_wire(WireGraph::connecting("w_rb", [("rb", "out"), ("rf", "rb")]))
        .with_wire(WireGraph::connecting("w_rd", [("rd", "out"), ("rf", "wa")]))
        .with_wire(WireGraph::connecting("w_we", [("we", "out"), ("rf", "we")]))
        .with_wire(WireGraph::connecting("w_op", [("op", "out"), ("alu", "op")]))
        .with_wire(WireGraph::connecting("w_sel", [("use_imm", "out"), ("bsel", "sel")]))
        .with_wire(WireGraph::connecting("w_imm", [("imm", "out"), ("bsel", "in1")]))
        .with_wire(WireGraph::connecting("w_a", [("rf", "a"), ("alu", "a")]))
        .with_wire(WireGraph::connecting("w_b", [("rf", "b"), ("bsel", "in0")]))
        .with_wire(WireGraph::connecting("w_bsel", [("bsel", "out"), ("alu", "b")]))
        .with_wire(WireGraph::connecting("w_result", [("alu", "out"), ("rf", "wd")]))
}

fn apply(sys: &mut ExeSystem, instr: &Instr) {
    sys.set_input("ra", instr.ra);
    sys.set_input("rb", instr.rb);
    sys.set_input("rd", instr.rd);
    sys.set_input("op", instr.op.code());
    sys.set_input("imm", instr.imm.unwrap_or(0));
    sys.set_input("use_imm", u64::from(instr.imm.is_some()));
    sys.tick();
}

fn registers(sys: &ExeSystem) -> Vec<u64> {
    sys.data("rf")
        .and_then(|d| d.as_regfile())
        .map(|rf| rf.regs.clone())
        .unwrap_or_default()
}

fn main() {
    println!("==== Register file example ====");
    println!("rd = ra <op> (rb | imm), one instruction per tick.\n");

    let mut sys = match compile(&datapath(), Arc::new(create_default_library())) {
        Ok(sys) => sys,
        Err(e) => {
            eprintln!("failed to compile datapath: {e}");
            return;
        }
    };
    for diagnostic in &sys.diagnostics {
        println!("diagnostic: {diagnostic}");
    }

    for instr in &PROGRAM {
        apply(&mut sys, instr);
        let operand = match instr.imm {
            Some(imm) => format!("#{imm}"),
            None => format!("r{}", instr.rb),
        };
        println!(
            "tick {:>2}: r{} = r{} {:?} {:<4} -> {:?}",
            sys.tick, instr.rd, instr.ra, instr.op, operand,
            registers(&sys)
        );
    }

    println!("\nFinal register file: {:?}", registers(&sys));
    println!("Execution counters: {}", sys.export_stats()["exec"]);
}
