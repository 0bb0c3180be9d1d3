//! Runtime components, ports and phases.
//!
//! An [`ExeComp`] is the executable counterpart of a layout component. Its
//! behaviour is split into [`ExePhase`]s, each declaring exactly which ports
//! it reads and which it writes. Those declarations are what the compiler
//! orders; a phase must stay inside them.
//!
//! Combinational and sequential behaviour fall out of the same shape:
//!
//! - a combinational phase reads input ports and writes output ports;
//! - a sequential component has a combinational phase that writes its stored
//!   state to its outputs, and a *latch* phase that reads its inputs into that
//!   state once every combinational phase of the tick has run.

use thiserror::Error;

use crate::layout::{Comp, PortDir};
use crate::memory::{MemoryError, MemoryMap};
use crate::system::ExeSystem;
use crate::types::{mask, PortIdx, Word, FLOATING};

/// Global arguments of a simulation run, handed to every phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// When set, free-running stops before the next tick
    pub halt: bool,
}

/// A runtime port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExePort {
    /// Port name, as declared by the component definition
    pub name: String,
    /// Index into the layout component's `ports`, if the layout declares it
    pub layout_port: Option<usize>,
    /// Net this port is attached to
    pub net_idx: Option<usize>,
    pub width: u32,
    pub ty: PortDir,
    /// For drivers, whether the port currently drives its net. Always-on
    /// outputs keep this set. For inputs, false marks the input as ignored
    /// (an unselected mux leg); only the display layer reads that.
    pub io_enabled: bool,
    pub value: Word,
}

impl ExePort {
    pub fn new(name: impl Into<String>, ty: PortDir, width: u32) -> Self {
        Self {
            name: name.into(),
            layout_port: None,
            net_idx: None,
            width,
            ty,
            io_enabled: !ty.is_tristate(),
            value: FLOATING,
        }
    }

    /// Restores the power-on value and enable flag.
    pub fn reset(&mut self) {
        self.value = FLOATING;
        self.io_enabled = !self.ty.is_tristate();
    }
}

/// Failures a phase function can report.
///
/// The executor turns these into runtime diagnostics and floats the phase's
/// write ports for the rest of the tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseFault {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("invalid operation code {0}")]
    InvalidOp(Word),

    #[error("component payload is not a {0}")]
    DataMismatch(&'static str),
}

/// What a phase function sees: its component's ports and payload, and the run arguments.
#[derive(Debug)]
pub struct PhaseCtx<'a> {
    pub ports: &'a mut [ExePort],
    pub data: &'a mut CompData,
    pub args: &'a mut RunArgs,
}

impl PhaseCtx<'_> {
    /// Reads a port value; missing ports read as floating.
    #[inline]
    pub fn get(&self, port: PortIdx) -> Word {
        self.ports.get(port).map_or(FLOATING, |p| p.value)
    }

    /// Reads a port value, or `default` when the component has no such port.
    #[inline]
    pub fn get_or(&self, port: PortIdx, default: Word) -> Word {
        self.ports.get(port).map_or(default, |p| p.value)
    }

    /// Writes a port value, masked to the port's width.
    #[inline]
    pub fn set(&mut self, port: PortIdx, value: Word) {
        if let Some(p) = self.ports.get_mut(port) {
            p.value = value & mask(p.width);
        }
    }

    /// Sets whether a port takes part in its net.
    #[inline]
    pub fn set_enabled(&mut self, port: PortIdx, enabled: bool) {
        if let Some(p) = self.ports.get_mut(port) {
            p.io_enabled = enabled;
        }
    }

    #[inline]
    pub fn width(&self, port: PortIdx) -> u32 {
        self.ports.get(port).map_or(0, |p| p.width)
    }
}

/// Signature of a phase's evaluation function.
pub type PhaseFn = fn(&mut PhaseCtx<'_>) -> Result<(), PhaseFault>;

/// How a phase is evaluated.
#[derive(Clone, Copy)]
pub enum PhaseKind {
    /// A plain function over the component's ports and payload
    Simple { func: PhaseFn, is_latch: bool },
    /// Settle the owned sub-system: copy boundary inputs in, run its
    /// execution steps, copy boundary outputs back
    SubSystem,
    /// Run the owned sub-system's latch steps
    SubSystemLatch,
}

impl std::fmt::Debug for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseKind::Simple { is_latch, .. } => f
                .debug_struct("Simple")
                .field("is_latch", is_latch)
                .finish_non_exhaustive(),
            PhaseKind::SubSystem => f.write_str("SubSystem"),
            PhaseKind::SubSystemLatch => f.write_str("SubSystemLatch"),
        }
    }
}

/// A unit of evaluation with declared reads and writes.
#[derive(Clone, Debug)]
pub struct ExePhase {
    pub read_ports: Vec<PortIdx>,
    pub write_ports: Vec<PortIdx>,
    pub kind: PhaseKind,
}

impl ExePhase {
    /// A combinational phase.
    pub fn new(read_ports: Vec<PortIdx>, write_ports: Vec<PortIdx>, func: PhaseFn) -> Self {
        Self {
            read_ports,
            write_ports,
            kind: PhaseKind::Simple { func, is_latch: false },
        }
    }

    /// A latch phase: reads ports at the clock edge and commits into the payload.
    pub fn latch(read_ports: Vec<PortIdx>, func: PhaseFn) -> Self {
        Self {
            read_ports,
            write_ports: Vec::new(),
            kind: PhaseKind::Simple { func, is_latch: true },
        }
    }

    pub fn is_latch(&self) -> bool {
        matches!(
            self.kind,
            PhaseKind::Simple { is_latch: true, .. } | PhaseKind::SubSystemLatch
        )
    }
}

/// State of a register-like component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterData {
    pub value: Word,
    pub width: u32,
}

/// State of a program counter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PcData {
    pub value: Word,
    pub width: u32,
    /// Increment applied when no jump is taken
    pub step: Word,
}

impl PcData {
    /// The address after a sequential advance.
    pub fn next(&self) -> Word {
        self.value.wrapping_add(self.step) & mask(self.width)
    }
}

/// State of a register file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegFileData {
    pub regs: Vec<Word>,
    pub width: u32,
    /// Register 0 always reads zero and ignores writes
    pub zero_reg: bool,
}

/// What a probe last saw.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeData {
    pub value: Word,
    /// Number of times the observed value changed
    pub changes: u64,
}

/// Per-component payload, one variant per kind of state a definition keeps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CompData {
    #[default]
    None,
    /// A single stored word (constants, external inputs, sub-circuit inputs)
    Value(Word),
    Register(RegisterData),
    Pc(PcData),
    RegFile(RegFileData),
    Memory(MemoryMap),
    Probe(ProbeData),
}

impl CompData {
    pub fn value(&self) -> Option<Word> {
        match self {
            CompData::Value(v) => Some(*v),
            CompData::Register(r) => Some(r.value),
            CompData::Pc(pc) => Some(pc.value),
            CompData::Probe(p) => Some(p.value),
            _ => None,
        }
    }

    pub fn as_register(&self) -> Option<&RegisterData> {
        match self {
            CompData::Register(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_register_mut(&mut self) -> Result<&mut RegisterData, PhaseFault> {
        match self {
            CompData::Register(r) => Ok(r),
            _ => Err(PhaseFault::DataMismatch("register")),
        }
    }

    pub fn as_pc_mut(&mut self) -> Result<&mut PcData, PhaseFault> {
        match self {
            CompData::Pc(pc) => Ok(pc),
            _ => Err(PhaseFault::DataMismatch("program counter")),
        }
    }

    pub fn as_regfile(&self) -> Option<&RegFileData> {
        match self {
            CompData::RegFile(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_regfile_mut(&mut self) -> Result<&mut RegFileData, PhaseFault> {
        match self {
            CompData::RegFile(r) => Ok(r),
            _ => Err(PhaseFault::DataMismatch("register file")),
        }
    }

    pub fn as_memory(&self) -> Option<&MemoryMap> {
        match self {
            CompData::Memory(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_memory_mut(&mut self) -> Result<&mut MemoryMap, PhaseFault> {
        match self {
            CompData::Memory(m) => Ok(m),
            _ => Err(PhaseFault::DataMismatch("memory map")),
        }
    }

    pub fn as_probe(&self) -> Option<&ProbeData> {
        match self {
            CompData::Probe(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_probe_mut(&mut self) -> Result<&mut ProbeData, PhaseFault> {
        match self {
            CompData::Probe(p) => Ok(p),
            _ => Err(PhaseFault::DataMismatch("probe")),
        }
    }

    pub fn as_value_mut(&mut self) -> Result<&mut Word, PhaseFault> {
        match self {
            CompData::Value(v) => Ok(v),
            _ => Err(PhaseFault::DataMismatch("value")),
        }
    }
}

/// An executable component.
#[derive(Debug)]
pub struct ExeComp {
    /// The layout component this was built from
    pub comp: Comp,
    pub ports: Vec<ExePort>,
    pub data: CompData,
    pub phases: Vec<ExePhase>,
    /// False when the component could not be built or scheduled; an invalid
    /// component runs no phases and drives nothing
    pub valid: bool,
    /// The compiled circuit of a sub-circuit component
    pub sub_system: Option<Box<ExeSystem>>,
}

impl ExeComp {
    /// Finds a port by definition name.
    pub fn port_idx(&self, name: &str) -> Option<PortIdx> {
        self.ports.iter().position(|p| p.name == name)
    }

    pub fn port(&self, name: &str) -> Option<&ExePort> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// Marks the component invalid and stops it driving any net.
    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
        for port in &mut self.ports {
            if port.ty.is_output() {
                port.io_enabled = false;
            }
        }
    }
}
