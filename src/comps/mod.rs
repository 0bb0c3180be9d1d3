//! Built-in component definitions.
//!
//! # Available Components
//!
//! ## Sources and sinks (basic)
//! - `const` - fixed value
//! - `input` - externally driven value
//! - `probe` - records what it sees
//! - `halt` - raises the halt flag when its input is non-zero
//! - `io.in` / `io.out` - sub-circuit boundary ports
//!
//! ## Combinational logic (logic, alu)
//! - `and`, `or`, `xor`, `not` - bitwise gates
//! - `mux` - selects one of N inputs
//! - `tribuf` - tristate buffer
//! - `alu` - arithmetic/logic unit
//!
//! ## State (state, mem)
//! - `reg` - register latched on the clock edge
//! - `pc` - program counter
//! - `regfile` - register file with two read ports
//! - `mem` - memory-mapped ROM/RAM/IO

pub mod alu;
pub mod basic;
pub mod logic;
pub mod mem;
pub mod state;

pub use alu::AluOp;
pub use mem::MemoryDefaults;

use crate::library::CompLibrary;

/// Built-in definition ids.
pub mod defs {
    pub const CONST: &str = "const";
    pub const INPUT: &str = "input";
    pub const PROBE: &str = "probe";
    pub const HALT: &str = "halt";
    pub const IO_IN: &str = "io.in";
    pub const IO_OUT: &str = "io.out";
    pub const AND: &str = "and";
    pub const OR: &str = "or";
    pub const XOR: &str = "xor";
    pub const NOT: &str = "not";
    pub const MUX: &str = "mux";
    pub const TRIBUF: &str = "tribuf";
    pub const ALU: &str = "alu";
    pub const REG: &str = "reg";
    pub const PC: &str = "pc";
    pub const REGFILE: &str = "regfile";
    pub const MEM: &str = "mem";
}

/// Registers every built-in definition with default memory geometry.
pub fn register_builtins(library: &mut CompLibrary) {
    register_builtins_with(library, MemoryDefaults::default());
}

/// Registers every built-in definition, using `memory` for `mem`
/// components that leave their geometry unspecified.
pub fn register_builtins_with(library: &mut CompLibrary, memory: MemoryDefaults) {
    basic::register(library);
    logic::register(library);
    alu::register(library);
    state::register(library);
    mem::register(library, memory);
}

/// Width of a selector able to address `count` items.
pub(crate) fn select_width(count: usize) -> u32 {
    let mut width = 1;
    while (1usize << width) < count {
        width += 1;
    }
    width
}
