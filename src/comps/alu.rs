//! Arithmetic/logic unit.
//!
//! Ports: `a`, `b`, `op` (4 bits), `out`, `zero` (1 bit). Signed operations
//! interpret operands at the configured width.

use crate::component::{CompData, ExePhase, PhaseCtx, PhaseFault};
use crate::layout::{CompArgs, CompPort, PortDir};
use crate::library::{CompBuild, CompLibrary};
use crate::types::{mask, Word, DEFAULT_WIDTH};

use super::defs;

pub const A: usize = 0;
pub const B: usize = 1;
pub const OP: usize = 2;
pub const OUT: usize = 3;
pub const ZERO: usize = 4;

/// Operation codes presented on the `op` port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Sub = 1,
    And = 2,
    Or = 3,
    Xor = 4,
    Shl = 5,
    Shr = 6,
    Sra = 7,
    Slt = 8,
    Sltu = 9,
    PassA = 10,
    PassB = 11,
}

impl AluOp {
    pub fn from_code(code: Word) -> Option<Self> {
        use AluOp::*;
        Some(match code {
            0 => Add,
            1 => Sub,
            2 => And,
            3 => Or,
            4 => Xor,
            5 => Shl,
            6 => Shr,
            7 => Sra,
            8 => Slt,
            9 => Sltu,
            10 => PassA,
            11 => PassB,
            _ => return None,
        })
    }

    pub fn code(self) -> Word {
        self as Word
    }

    /// Evaluates the operation on `width`-bit operands.
    pub fn eval(self, a: Word, b: Word, width: u32) -> Word {
        let m = mask(width);
        let (a, b) = (a & m, b & m);
        let shamt = (b % Word::from(width.max(1))) as u32;
        let result = match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Shl => a << shamt,
            AluOp::Shr => a >> shamt,
            AluOp::Sra => (sign_extend(a, width) >> shamt) as Word,
            AluOp::Slt => Word::from(sign_extend(a, width) < sign_extend(b, width)),
            AluOp::Sltu => Word::from(a < b),
            AluOp::PassA => a,
            AluOp::PassB => b,
        };
        result & m
    }
}

fn sign_extend(value: Word, width: u32) -> i64 {
    if width >= 64 {
        return value as i64;
    }
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

pub(crate) fn register(library: &mut CompLibrary) {
    library.register(defs::ALU, build_alu);
}

fn build_alu(args: &CompArgs) -> CompBuild {
    let width = args.width_or("width", DEFAULT_WIDTH);
    CompBuild {
        ports: vec![
            CompPort::new("a", PortDir::IN | PortDir::DATA).with_width(width),
            CompPort::new("b", PortDir::IN | PortDir::DATA).with_width(width),
            CompPort::new("op", PortDir::IN | PortDir::CTRL).with_width(4),
            CompPort::new("out", PortDir::OUT | PortDir::DATA).with_width(width),
            CompPort::new("zero", PortDir::OUT | PortDir::CTRL).with_width(1),
        ],
        phases: vec![ExePhase::new(vec![A, B, OP], vec![OUT, ZERO], alu)],
        errors: Vec::new(),
        data: CompData::None,
    }
}

fn alu(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    let code = ctx.get(OP);
    let op = AluOp::from_code(code).ok_or(PhaseFault::InvalidOp(code))?;
    let result = op.eval(ctx.get(A), ctx.get(B), ctx.width(OUT));
    ctx.set(OUT, result);
    ctx.set(ZERO, Word::from(result == 0));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_wraps_at_width() {
        assert_eq!(AluOp::Add.eval(0xff, 1, 8), 0);
        assert_eq!(AluOp::Sub.eval(0, 1, 8), 0xff);
        assert_eq!(AluOp::Add.eval(u64::MAX, 1, 64), 0);
    }

    #[test]
    fn test_shifts() {
        assert_eq!(AluOp::Shl.eval(1, 3, 8), 8);
        assert_eq!(AluOp::Shr.eval(0x80, 7, 8), 1);
        assert_eq!(AluOp::Sra.eval(0x80, 7, 8), 0xff);
        // shift amount wraps at the width
        assert_eq!(AluOp::Shl.eval(1, 9, 8), 2);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(AluOp::Slt.eval(0xff, 1, 8), 1); // -1 < 1
        assert_eq!(AluOp::Sltu.eval(0xff, 1, 8), 0);
        assert_eq!(AluOp::Slt.eval(1, 0xff, 8), 0);
    }

    #[test]
    fn test_op_codes() {
        for code in 0..12 {
            assert_eq!(AluOp::from_code(code).unwrap().code(), code);
        }
        assert_eq!(AluOp::from_code(12), None);
    }
}
