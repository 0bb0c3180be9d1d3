//! The compiled, executable form of a layout.
//!
//! An [`ExeSystem`] owns flat arrays of components and nets, two ordered step
//! lists, and the id lookup built when it was compiled. Every index a step or
//! port reference holds is valid for the life of the system; nothing here is
//! patched in place after compilation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::{CompData, ExeComp, ExePort, RunArgs};
use crate::diagnostics::Diagnostic;
use crate::executor::Cursor;
use crate::layout::PortDir;
use crate::library::CompLibrary;
use crate::stats::ExecStats;
use crate::types::{mask, CompIdx, NetIdx, PhaseIdx, PortIdx, Tick, Word};

/// A reference from a net to one component port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExePortRef {
    pub comp_idx: CompIdx,
    pub port_idx: PortIdx,
    /// False when the wire endpoint could not be resolved; the indices are
    /// then meaningless
    pub valid: bool,
}

impl ExePortRef {
    pub fn new(comp_idx: CompIdx, port_idx: PortIdx) -> Self {
        Self {
            comp_idx,
            port_idx,
            valid: true,
        }
    }

    /// A placeholder for an endpoint that names nothing.
    pub fn dangling() -> Self {
        Self {
            comp_idx: 0,
            port_idx: 0,
            valid: false,
        }
    }
}

/// Structural shape of a net's drivers and readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetShape {
    /// At least one driver and one reader, with multiple drivers only when
    /// all of them are tristate
    Directed,
    /// Readers but no driver; the readers see the floating value
    Undriven,
    /// Drivers but nobody reads the net
    Unread,
    /// More than one always-on driver
    Ambiguous,
    /// No resolvable endpoint at all
    Empty,
}

/// An electrical net.
#[derive(Clone, Debug)]
pub struct ExeNet {
    /// Wires joined into this net, in layout order
    pub wire_ids: Vec<String>,
    /// Driver ports
    pub inputs: Vec<ExePortRef>,
    /// Reader ports, plus dangling endpoints
    pub outputs: Vec<ExePortRef>,
    /// Set when any driver is a tristate port
    pub tristate: bool,
    pub width: u32,
    /// Union of the data/address/control roles of attached ports
    pub roles: PortDir,
    pub value: Word,
    /// Drivers enabled at the last resolution
    pub enabled_count: usize,
    pub shape: NetShape,
}

impl ExeNet {
    pub fn new(wire_ids: Vec<String>) -> Self {
        Self {
            wire_ids,
            inputs: Vec::new(),
            outputs: Vec::new(),
            tristate: false,
            width: 0,
            roles: PortDir::default(),
            value: crate::types::FLOATING,
            enabled_count: 0,
            shape: NetShape::Empty,
        }
    }

    /// Ports attached to this net that resolved, drivers first.
    pub fn valid_refs(&self) -> impl Iterator<Item = &ExePortRef> {
        self.inputs.iter().chain(&self.outputs).filter(|r| r.valid)
    }
}

/// One scheduled unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExeStep {
    /// Resolve a net's drivers and fan the value out to its readers
    Net(NetIdx),
    /// Invoke one phase of one component
    Phase { comp: CompIdx, phase: PhaseIdx },
}

/// Stable layout ids mapped to array indices.
#[derive(Clone, Debug, Default)]
pub struct ExeSystemLookup {
    pub comp_id_to_idx: HashMap<String, CompIdx>,
    pub wire_id_to_net_idx: HashMap<String, NetIdx>,
}

impl ExeSystemLookup {
    pub fn comp_idx(&self, comp_id: &str) -> Option<CompIdx> {
        self.comp_id_to_idx.get(comp_id).copied()
    }

    pub fn net_idx(&self, wire_id: &str) -> Option<NetIdx> {
        self.wire_id_to_net_idx.get(wire_id).copied()
    }
}

/// A port of a compiled circuit as seen by its parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundaryPort {
    pub name: String,
    pub dir: PortDir,
    pub width: u32,
    /// The `io.in` or `io.out` component backing the port
    pub comp_idx: CompIdx,
}

/// An executable circuit.
#[derive(Debug)]
pub struct ExeSystem {
    pub comps: Vec<ExeComp>,
    pub nets: Vec<ExeNet>,
    /// Combinational work for one tick, in dependency order
    pub execution_steps: Vec<ExeStep>,
    /// Clock-edge commits, in declaration order
    pub latch_steps: Vec<ExeStep>,
    pub lookup: ExeSystemLookup,
    pub run_args: RunArgs,
    /// The library the system was built from; used again on reset
    pub library: Arc<CompLibrary>,
    /// Structural and topological problems found when compiling
    pub diagnostics: Vec<Diagnostic>,
    /// Problems raised while running the current tick
    pub runtime_diagnostics: Vec<Diagnostic>,
    /// Ports exposed to an enclosing circuit
    pub boundary: Vec<BoundaryPort>,
    pub stats: ExecStats,
    /// Completed ticks since compile or reset
    pub tick: Tick,
    pub(crate) cursor: Cursor,
}

impl ExeSystem {
    pub(crate) fn empty(library: Arc<CompLibrary>) -> Self {
        Self {
            comps: Vec::new(),
            nets: Vec::new(),
            execution_steps: Vec::new(),
            latch_steps: Vec::new(),
            lookup: ExeSystemLookup::default(),
            run_args: RunArgs::default(),
            library,
            diagnostics: Vec::new(),
            runtime_diagnostics: Vec::new(),
            boundary: Vec::new(),
            stats: ExecStats::default(),
            tick: 0,
            cursor: Cursor::default(),
        }
    }

    pub fn comp_by_id(&self, comp_id: &str) -> Option<&ExeComp> {
        self.comps.get(self.lookup.comp_idx(comp_id)?)
    }

    pub fn comp_by_id_mut(&mut self, comp_id: &str) -> Option<&mut ExeComp> {
        let idx = self.lookup.comp_idx(comp_id)?;
        self.comps.get_mut(idx)
    }

    /// The runtime port `port_name` of component `comp_id`.
    pub fn port(&self, comp_id: &str, port_name: &str) -> Option<&ExePort> {
        self.comp_by_id(comp_id)?.port(port_name)
    }

    /// Current value of a port.
    pub fn port_value(&self, comp_id: &str, port_name: &str) -> Option<Word> {
        self.port(comp_id, port_name).map(|p| p.value)
    }

    /// The net a wire belongs to.
    pub fn net_by_wire(&self, wire_id: &str) -> Option<&ExeNet> {
        self.nets.get(self.lookup.net_idx(wire_id)?)
    }

    /// Current value of the net a wire belongs to.
    pub fn net_value(&self, wire_id: &str) -> Option<Word> {
        self.net_by_wire(wire_id).map(|n| n.value)
    }

    /// The data payload of a component.
    pub fn data(&self, comp_id: &str) -> Option<&CompData> {
        self.comp_by_id(comp_id).map(|c| &c.data)
    }

    /// Sets the value an `input` or `const` component drives from the next
    /// step on. Returns false if the component holds no settable value.
    pub fn set_input(&mut self, comp_id: &str, value: Word) -> bool {
        let Some(comp) = self.comp_by_id_mut(comp_id) else {
            return false;
        };
        let width = comp.ports.first().map_or(crate::types::MAX_WIDTH, |p| p.width);
        match &mut comp.data {
            CompData::Value(v) => {
                *v = value & mask(width);
                true
            }
            _ => false,
        }
    }

    /// Sets whether an output port drives its net.
    ///
    /// Phases that manage their own enables overwrite this when they run.
    pub fn set_port_enabled(&mut self, comp_id: &str, port_name: &str, enabled: bool) -> bool {
        let Some(comp) = self.comp_by_id_mut(comp_id) else {
            return false;
        };
        match comp.ports.iter_mut().find(|p| p.name == port_name) {
            Some(port) => {
                port.io_enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// True if compilation found an error-severity problem.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Structural, topological and current runtime diagnostics together.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().chain(&self.runtime_diagnostics)
    }

    /// Number of components owning a sub-system, at any depth.
    pub fn sub_system_count(&self) -> usize {
        self.comps
            .iter()
            .filter_map(|c| c.sub_system.as_deref())
            .map(|sub| 1 + sub.sub_system_count())
            .sum()
    }

    /// Execution counters including those of nested sub-systems.
    pub fn total_stats(&self) -> ExecStats {
        let mut total = self.stats.clone();
        for sub in self.comps.iter().filter_map(|c| c.sub_system.as_deref()) {
            total.merge(&sub.total_stats());
        }
        total
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "tick": self.tick,
            "comp_count": self.comps.len(),
            "net_count": self.nets.len(),
            "execution_steps": self.execution_steps.len(),
            "latch_steps": self.latch_steps.len(),
            "sub_systems": self.sub_system_count(),
            "diagnostics": self.diagnostics.len(),
            "runtime_diagnostics": self.runtime_diagnostics.len(),
            "exec": self.total_stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_ref() {
        let r = ExePortRef::dangling();
        assert!(!r.valid);
        assert!(ExePortRef::new(2, 1).valid);
    }

    #[test]
    fn test_valid_refs_skip_dangling() {
        let mut net = ExeNet::new(vec!["w0".into()]);
        net.inputs.push(ExePortRef::new(0, 0));
        net.outputs.push(ExePortRef::dangling());
        net.outputs.push(ExePortRef::new(1, 0));
        let refs: Vec<_> = net.valid_refs().map(|r| r.comp_idx).collect();
        assert_eq!(refs, vec![0, 1]);
    }

    #[test]
    fn test_empty_system_stats() {
        let sys = ExeSystem::empty(Arc::new(CompLibrary::new()));
        let stats = sys.export_stats();
        assert_eq!(stats["comp_count"], 0);
        assert_eq!(stats["exec"]["ticks"], 0);
        assert!(!sys.has_errors());
    }
}
