//! Clocked state: registers, program counter and register file.
//!
//! Each definition has one combinational phase that presents the stored
//! state on its outputs, and one latch phase that commits new state from its
//! inputs at the clock edge.

use crate::component::{
    CompData, ExePhase, PcData, PhaseCtx, PhaseFault, RegFileData, RegisterData,
};
use crate::layout::{CompArgs, CompPort, PortDir};
use crate::library::{CompBuild, CompLibrary};
use crate::types::{mask, DEFAULT_WIDTH, FLOATING};

use super::{defs, select_width};

pub(crate) fn register(library: &mut CompLibrary) {
    library.register(defs::REG, build_reg);
    library.register(defs::PC, build_pc);
    library.register(defs::REGFILE, build_regfile);
}

pub const REG_IN: usize = 0;
pub const REG_OUT: usize = 1;
pub const REG_WE: usize = 2;

/// `reg`: ports `in`, `out`, and `we` when `enable` is set.
///
/// Args: `width` (default 32), `init` (default 0), `enable` (default false).
/// Without a `we` port the register loads every tick.
fn build_reg(args: &CompArgs) -> CompBuild {
    let width = args.width_or("width", DEFAULT_WIDTH);
    let mut ports = vec![
        CompPort::new("in", PortDir::IN).with_width(width),
        CompPort::new("out", PortDir::OUT).with_width(width),
    ];
    let mut reads = vec![REG_IN];
    if args.u64_or("enable", 0) != 0 {
        ports.push(CompPort::new("we", PortDir::IN | PortDir::CTRL).with_width(1));
        reads.push(REG_WE);
    }
    CompBuild {
        ports,
        phases: vec![
            ExePhase::new(vec![], vec![REG_OUT], present_reg),
            ExePhase::latch(reads, latch_reg),
        ],
        errors: Vec::new(),
        data: CompData::Register(RegisterData {
            value: args.u64_or("init", 0) & mask(width),
            width,
        }),
    }
}

fn present_reg(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let value = ctx.data.as_register_mut()?.value;
    ctx.set(REG_OUT, value);
    Ok(())
}

fn latch_reg(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    if ctx.get_or(REG_WE, 1) == 0 {
        return Ok(());
    }
    let value = ctx.get(REG_IN);
    let reg = ctx.data.as_register_mut()?;
    reg.value = value & mask(reg.width);
    Ok(())
}

pub const PC_JMP: usize = 0;
pub const PC_JMP_EN: usize = 1;
pub const PC_OUT: usize = 2;
pub const PC_NEXT: usize = 3;

/// `pc`: presents the current address on `out` and `out + step` on `next`;
/// at the clock edge loads `jmp` when `jmp_en` is set, else advances.
///
/// Args: `width` (default 32), `step` (default 4), `init` (default 0).
fn build_pc(args: &CompArgs) -> CompBuild {
    let width = args.width_or("width", DEFAULT_WIDTH);
    CompBuild {
        ports: vec![
            CompPort::new("jmp", PortDir::IN | PortDir::ADDR).with_width(width),
            CompPort::new("jmp_en", PortDir::IN | PortDir::CTRL).with_width(1),
            CompPort::new("out", PortDir::OUT | PortDir::ADDR).with_width(width),
            CompPort::new("next", PortDir::OUT | PortDir::ADDR).with_width(width),
        ],
        phases: vec![
            ExePhase::new(vec![], vec![PC_OUT, PC_NEXT], present_pc),
            ExePhase::latch(vec![PC_JMP, PC_JMP_EN], latch_pc),
        ],
        errors: Vec::new(),
        data: CompData::Pc(PcData {
            value: args.u64_or("init", 0) & mask(width),
            width,
            step: args.u64_or("step", 4),
        }),
    }
}

fn present_pc(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let pc = ctx.data.as_pc_mut()?;
    let (value, next) = (pc.value, pc.next());
    ctx.set(PC_OUT, value);
    ctx.set(PC_NEXT, next);
    Ok(())
}

fn latch_pc(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let jump = ctx.get(PC_JMP_EN) != 0;
    let target = ctx.get(PC_JMP);
    let pc = ctx.data.as_pc_mut()?;
    pc.value = if jump { target & mask(pc.width) } else { pc.next() };
    Ok(())
}

pub const RF_RA: usize = 0;
pub const RF_RB: usize = 1;
pub const RF_WA: usize = 2;
pub const RF_WD: usize = 3;
pub const RF_WE: usize = 4;
pub const RF_A: usize = 5;
pub const RF_B: usize = 6;

/// `regfile`: two combinational read ports, one write port latched at the clock edge.
///
/// Args: `count` (default 8), `width` (default 32), `zero_reg` (default false).
fn build_regfile(args: &CompArgs) -> CompBuild {
    let count = args.u64_or("count", 8).max(1) as usize;
    let width = args.width_or("width", DEFAULT_WIDTH);
    let addr_width = select_width(count);
    CompBuild {
        ports: vec![
            CompPort::new("ra", PortDir::IN | PortDir::ADDR).with_width(addr_width),
            CompPort::new("rb", PortDir::IN | PortDir::ADDR).with_width(addr_width),
            CompPort::new("wa", PortDir::IN | PortDir::ADDR).with_width(addr_width),
            CompPort::new("wd", PortDir::IN | PortDir::DATA).with_width(width),
            CompPort::new("we", PortDir::IN | PortDir::CTRL).with_width(1),
            CompPort::new("a", PortDir::OUT | PortDir::DATA).with_width(width),
            CompPort::new("b", PortDir::OUT | PortDir::DATA).with_width(width),
        ],
        phases: vec![
            ExePhase::new(vec![RF_RA, RF_RB], vec![RF_A, RF_B], read_regfile),
            ExePhase::latch(vec![RF_WA, RF_WD, RF_WE], write_regfile),
        ],
        errors: Vec::new(),
        data: CompData::RegFile(RegFileData {
            regs: vec![0; count],
            width,
            zero_reg: args.u64_or("zero_reg", 0) != 0,
        }),
    }
}

fn read_regfile(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let (ra, rb) = (ctx.get(RF_RA) as usize, ctx.get(RF_RB) as usize);
    let rf = ctx.data.as_regfile_mut()?;
    let a = rf.regs.get(ra).copied().unwrap_or(FLOATING);
    let b = rf.regs.get(rb).copied().unwrap_or(FLOATING);
    ctx.set(RF_A, a);
    ctx.set(RF_B, b);
    Ok(())
}

fn write_regfile(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    if ctx.get(RF_WE) == 0 {
        return Ok(());
    }
    let (wa, wd) = (ctx.get(RF_WA) as usize, ctx.get(RF_WD));
    let rf = ctx.data.as_regfile_mut()?;
    if rf.zero_reg && wa == 0 {
        return Ok(());
    }
    let m = mask(rf.width);
    if let Some(reg) = rf.regs.get_mut(wa) {
        *reg = wd & m;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ExePort, RunArgs};
    use crate::types::Word;

    struct Harness {
        ports: Vec<ExePort>,
        data: CompData,
        args: RunArgs,
        build: CompBuild,
    }

    impl Harness {
        fn new(build: CompBuild) -> Self {
            let ports = build
                .ports
                .iter()
                .map(|p| ExePort::new(p.name.clone(), p.ty, p.width.unwrap_or(DEFAULT_WIDTH)))
                .collect();
            let data = build.data.clone();
            Self { ports, data, args: RunArgs::default(), build }
        }

        fn set(&mut self, port: usize, value: Word) {
            self.ports[port].value = value;
        }

        fn run_phase(&mut self, idx: usize) {
            if let crate::component::PhaseKind::Simple { func, .. } = self.build.phases[idx].kind {
                let mut ctx = PhaseCtx {
                    ports: &mut self.ports,
                    data: &mut self.data,
                    args: &mut self.args,
                };
                func(&mut ctx).unwrap();
            }
        }
    }

    #[test]
    fn test_reg_latches_only_on_edge() {
        let mut h = Harness::new(build_reg(&CompArgs::new().with("width", 8).with("init", 7)));
        h.set(REG_IN, 0x1ff);
        h.run_phase(0);
        assert_eq!(h.ports[REG_OUT].value, 7);
        h.run_phase(1);
        h.run_phase(0);
        assert_eq!(h.ports[REG_OUT].value, 0xff);
    }

    #[test]
    fn test_reg_write_enable() {
        let mut h = Harness::new(build_reg(&CompArgs::new().with("enable", true)));
        assert_eq!(h.ports.len(), 3);
        h.set(REG_IN, 5);
        h.run_phase(1);
        assert_eq!(h.data.value(), Some(0));
        h.set(REG_WE, 1);
        h.run_phase(1);
        assert_eq!(h.data.value(), Some(5));
    }

    #[test]
    fn test_pc_advances_and_jumps() {
        let mut h = Harness::new(build_pc(&CompArgs::new().with("init", 0x100)));
        h.run_phase(0);
        assert_eq!(h.ports[PC_OUT].value, 0x100);
        assert_eq!(h.ports[PC_NEXT].value, 0x104);
        h.run_phase(1);
        assert_eq!(h.data.value(), Some(0x104));
        h.set(PC_JMP, 0x40);
        h.set(PC_JMP_EN, 1);
        h.run_phase(1);
        assert_eq!(h.data.value(), Some(0x40));
    }

    #[test]
    fn test_regfile_read_write() {
        let mut h = Harness::new(build_regfile(
            &CompArgs::new().with("count", 4).with("width", 8).with("zero_reg", true),
        ));
        assert_eq!(h.ports[RF_RA].width, 2);
        h.set(RF_WA, 2);
        h.set(RF_WD, 0x155);
        h.set(RF_WE, 1);
        h.run_phase(1);
        h.set(RF_WA, 0);
        h.run_phase(1);
        h.set(RF_RA, 2);
        h.set(RF_RB, 0);
        h.run_phase(0);
        assert_eq!(h.ports[RF_A].value, 0x55);
        assert_eq!(h.ports[RF_B].value, 0);
    }
}
