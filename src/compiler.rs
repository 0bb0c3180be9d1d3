//! Compilation of a layout into an execution system.
//!
//! Compiling resolves every string id to an array index, groups wires into
//! electrical nets, settles port and net widths, and orders the phases of
//! all components so that no phase reads a net before every driver of that
//! net has run.
//!
//! Ordering is a topological sort over a bipartite graph of nets and
//! combinational phases:
//!
//! - net → phase when the phase reads a port attached to the net;
//! - phase → net when the phase writes a port that drives the net.
//!
//! Latch phases take no part in the graph. They run after every execution
//! step of a tick, in declaration order, so feedback through them is never a
//! cycle. Ties between ready nodes go to nets before phases, then to the
//! lowest component and phase index, which makes the order reproducible.
//!
//! Local problems become diagnostics on the returned system; only a layout
//! with duplicate ids fails outright.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::comps::defs;
use crate::component::{CompData, ExeComp, ExePhase, ExePort, PhaseKind};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Location};
use crate::layout::{Comp, CompPort, CpuLayout, LayoutError, PortDir, RefType};
use crate::library::{circuit_ports, CompBuild, CompDef, CompLibrary};
use crate::system::{BoundaryPort, ExeNet, ExePortRef, ExeStep, ExeSystem, NetShape};
use crate::types::{CompIdx, PhaseIdx, PortIdx, DEFAULT_WIDTH};

/// Errors that prevent building an execution system at all.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("invalid layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("circuit rejected with {} error(s)", .0.iter().filter(|d| d.is_error()).count())]
    Rejected(Vec<Diagnostic>),
}

/// Compiles a layout, collecting local problems as diagnostics.
pub fn compile(layout: &CpuLayout, library: Arc<CompLibrary>) -> Result<ExeSystem, CompileError> {
    let mut circuits = Vec::new();
    let system = compile_layout(layout, &library, &mut circuits)?;

    info!(
        comps = system.comps.len(),
        nets = system.nets.len(),
        execution_steps = system.execution_steps.len(),
        latch_steps = system.latch_steps.len(),
        diagnostics = system.diagnostics.len(),
        "Compiled layout"
    );
    for diagnostic in &system.diagnostics {
        warn!(%diagnostic, "Circuit diagnostic");
    }
    Ok(system)
}

/// Compiles a layout and refuses it if any error-severity diagnostic was raised.
pub fn compile_strict(
    layout: &CpuLayout,
    library: Arc<CompLibrary>,
) -> Result<ExeSystem, CompileError> {
    let system = compile(layout, library)?;
    if system.has_errors() {
        return Err(CompileError::Rejected(system.diagnostics));
    }
    Ok(system)
}

/// `circuits` holds the definition ids of the sub-circuits being compiled,
/// outermost first.
fn compile_layout(
    layout: &CpuLayout,
    library: &Arc<CompLibrary>,
    circuits: &mut Vec<String>,
) -> Result<ExeSystem, CompileError> {
    layout.validate()?;

    let mut builder = Builder {
        layout,
        library,
        system: ExeSystem::empty(Arc::clone(library)),
        declared: Vec::with_capacity(layout.comps.len()),
    };
    builder.build_comps(circuits)?;
    builder.build_nets();
    builder.resolve_widths();
    builder.build_boundary();
    builder.order_steps();
    Ok(builder.system)
}

struct Builder<'a> {
    layout: &'a CpuLayout,
    library: &'a Arc<CompLibrary>,
    system: ExeSystem,
    /// Width each port declares, per component; `None` inherits the net's
    declared: Vec<Vec<Option<u32>>>,
}

impl Builder<'_> {
    fn report(&mut self, kind: DiagnosticKind, location: Location, message: String) {
        self.system
            .diagnostics
            .push(Diagnostic::new(kind, location, message));
    }

    fn build_comps(&mut self, circuits: &mut Vec<String>) -> Result<(), CompileError> {
        let layout = self.layout;
        let library = self.library;
        for (ci, comp) in layout.comps.iter().enumerate() {
            self.system.lookup.comp_id_to_idx.insert(comp.id.clone(), ci);

            let exe = match library.get(&comp.def_id) {
                Some(CompDef::Native(factory)) => {
                    let build = factory(&comp.args_or_default());
                    self.instantiate(comp, build)
                }
                Some(CompDef::Circuit(sub_layout)) => {
                    self.instantiate_circuit(comp, sub_layout, circuits)?
                }
                None => {
                    self.report(
                        DiagnosticKind::UnknownDefinition,
                        Location::comp(&comp.id),
                        format!("no component definition named '{}'", comp.def_id),
                    );
                    let ports = comp.ports.iter().map(|p| CompPort::new(p.name.clone(), p.ty)).collect();
                    let mut exe = self.instantiate(comp, placeholder(ports));
                    exe.invalidate();
                    exe
                }
            };
            self.system.comps.push(exe);
        }
        Ok(())
    }

    /// Turns a build into an executable component, matching layout ports to
    /// the definition's ports by name.
    fn instantiate(&mut self, comp: &Comp, build: CompBuild) -> ExeComp {
        let mut declared: Vec<Option<u32>> = build.ports.iter().map(|p| p.width).collect();
        let mut ports: Vec<ExePort> = build
            .ports
            .iter()
            .map(|p| ExePort::new(p.name.clone(), p.ty, p.width.unwrap_or(DEFAULT_WIDTH)))
            .collect();

        for (li, layout_port) in comp.ports.iter().enumerate() {
            match ports.iter().position(|p| p.name == layout_port.name) {
                Some(pi) => {
                    ports[pi].layout_port = Some(li);
                    if declared[pi].is_none() {
                        declared[pi] = layout_port.width;
                    }
                }
                None => self.report(
                    DiagnosticKind::UnknownPort,
                    Location::port(&comp.id, &layout_port.id),
                    format!("'{}' has no port named '{}'", comp.def_id, layout_port.name),
                ),
            }
        }

        for error in build.errors {
            self.report(DiagnosticKind::InvalidArgs, Location::comp(&comp.id), error);
        }

        self.declared.push(declared);
        ExeComp {
            comp: comp.clone(),
            ports,
            data: build.data,
            phases: build.phases,
            valid: true,
            sub_system: None,
        }
    }

    fn instantiate_circuit(
        &mut self,
        comp: &Comp,
        sub_layout: &CpuLayout,
        circuits: &mut Vec<String>,
    ) -> Result<ExeComp, CompileError> {
        if circuits.contains(&comp.def_id) {
            self.report(
                DiagnosticKind::CircuitRecursion,
                Location::comp(&comp.id),
                format!(
                    "circuit '{}' contains itself via {}",
                    comp.def_id,
                    circuits.join(" -> ")
                ),
            );
            let mut exe = self.instantiate(comp, placeholder(circuit_ports(sub_layout)));
            exe.invalidate();
            return Ok(exe);
        }

        circuits.push(comp.def_id.clone());
        let sub = compile_layout(sub_layout, self.library, circuits);
        circuits.pop();
        let sub = sub?;

        debug!(
            comp = %comp.id,
            circuit = %comp.def_id,
            execution_steps = sub.execution_steps.len(),
            latch_steps = sub.latch_steps.len(),
            "Compiled sub-circuit"
        );
        for diagnostic in &sub.diagnostics {
            self.system
                .diagnostics
                .push(diagnostic.clone().nested_in(&comp.id));
        }

        let ports: Vec<CompPort> = sub
            .boundary
            .iter()
            .map(|b| CompPort::new(b.name.clone(), b.dir).with_width(b.width))
            .collect();
        let side = |input: bool| -> Vec<PortIdx> {
            sub.boundary
                .iter()
                .enumerate()
                .filter(|(_, b)| b.dir.is_input() == input)
                .map(|(i, _)| i)
                .collect()
        };
        let mut phases = vec![ExePhase {
            read_ports: side(true),
            write_ports: side(false),
            kind: PhaseKind::SubSystem,
        }];
        if !sub.latch_steps.is_empty() {
            phases.push(ExePhase {
                read_ports: Vec::new(),
                write_ports: Vec::new(),
                kind: PhaseKind::SubSystemLatch,
            });
        }

        let mut exe = self.instantiate(
            comp,
            CompBuild {
                ports,
                phases,
                errors: Vec::new(),
                data: CompData::None,
            },
        );
        exe.sub_system = Some(Box::new(sub));
        Ok(exe)
    }

    /// Resolves a wire endpoint to a port. The port id is looked up among the
    /// layout component's ports first, then taken as a definition port name.
    fn resolve_endpoint(&self, comp_id: &str, port_id: &str) -> Option<(CompIdx, PortIdx)> {
        let ci = self.system.lookup.comp_idx(comp_id)?;
        let comp = &self.system.comps[ci];
        let name = comp.comp.port(port_id).map_or(port_id, |p| p.name.as_str());
        Some((ci, comp.port_idx(name)?))
    }

    fn build_nets(&mut self) {
        let wires = &self.layout.wires;
        let wire_idx: HashMap<&str, usize> = wires
            .iter()
            .enumerate()
            .map(|(i, w)| (w.id.as_str(), i))
            .collect();

        // Wires joined by a junction, or touching the same port, share a net.
        let mut sets = DisjointSet::new(wires.len());
        let mut port_wire: HashMap<(CompIdx, PortIdx), usize> = HashMap::new();
        let mut endpoints: Vec<Vec<Option<(CompIdx, PortIdx)>>> = Vec::with_capacity(wires.len());

        for (wi, wire) in wires.iter().enumerate() {
            let mut ends = Vec::new();
            for terminal in wire.terminals() {
                if terminal.ty == RefType::Wire {
                    match wire_idx.get(terminal.id.as_str()) {
                        Some(&other) => sets.union(wi, other),
                        None => self.report(
                            DiagnosticKind::UnknownWire,
                            Location::Net {
                                wire_ids: vec![wire.id.clone()],
                            },
                            format!("junction to unknown wire '{}'", terminal.id),
                        ),
                    }
                    continue;
                }

                let port_id = terminal.comp_node_id.as_deref().unwrap_or_default();
                match self.resolve_endpoint(&terminal.id, port_id) {
                    Some(key) => {
                        match port_wire.get(&key) {
                            Some(&other) => sets.union(wi, other),
                            None => {
                                port_wire.insert(key, wi);
                            }
                        }
                        ends.push(Some(key));
                    }
                    None => {
                        self.report(
                            DiagnosticKind::DanglingEndpoint,
                            Location::port(&terminal.id, port_id),
                            format!("wire '{}' ends at a port that does not exist", wire.id),
                        );
                        ends.push(None);
                    }
                }
            }
            endpoints.push(ends);
        }

        let ExeSystem {
            comps,
            nets,
            lookup,
            ..
        } = &mut self.system;
        let mut root_net: HashMap<usize, usize> = HashMap::new();
        for (wi, wire) in wires.iter().enumerate() {
            let next = nets.len();
            let ni = *root_net.entry(sets.find(wi)).or_insert(next);
            if ni == next {
                nets.push(ExeNet::new(Vec::new()));
            }
            let net = &mut nets[ni];
            net.wire_ids.push(wire.id.clone());
            lookup.wire_id_to_net_idx.insert(wire.id.clone(), ni);

            for end in &endpoints[wi] {
                let Some((ci, pi)) = *end else {
                    net.outputs.push(ExePortRef::dangling());
                    continue;
                };
                let port_ref = ExePortRef::new(ci, pi);
                if net.inputs.contains(&port_ref) || net.outputs.contains(&port_ref) {
                    continue;
                }
                let port = &mut comps[ci].ports[pi];
                port.net_idx = Some(ni);
                if port.ty.is_output() {
                    net.inputs.push(port_ref);
                }
                if port.ty.is_input() || !port.ty.is_output() {
                    net.outputs.push(port_ref);
                }
            }
        }

        self.classify_nets();
    }

    /// Settles net widths and shapes, reporting mismatches and suspicious shapes.
    fn classify_nets(&mut self) {
        let declared = &self.declared;
        let ExeSystem {
            comps,
            nets,
            diagnostics,
            ..
        } = &mut self.system;
        let label = |r: &ExePortRef| {
            let comp = &comps[r.comp_idx];
            format!("{}.{}", comp.comp.id, comp.ports[r.port_idx].name)
        };

        for net in nets.iter_mut() {
            let location = || Location::Net {
                wire_ids: net.wire_ids.clone(),
            };

            let widths: BTreeSet<u32> = net
                .valid_refs()
                .filter_map(|r| declared[r.comp_idx][r.port_idx])
                .collect();
            net.width = widths.last().copied().unwrap_or(DEFAULT_WIDTH);
            if widths.len() > 1 {
                let listed: Vec<String> = widths.iter().map(u32::to_string).collect();
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::WidthMismatch,
                    location(),
                    format!("ports declare widths {}", listed.join(", ")),
                ));
            }

            net.roles = net.valid_refs().fold(PortDir::default(), |roles, r| {
                roles.with(comps[r.comp_idx].ports[r.port_idx].ty.roles())
            });
            net.tristate = net
                .inputs
                .iter()
                .any(|r| comps[r.comp_idx].ports[r.port_idx].ty.is_tristate());
            let all_tristate = net
                .inputs
                .iter()
                .all(|r| comps[r.comp_idx].ports[r.port_idx].ty.is_tristate());

            let drivers = net.inputs.len();
            let readers = net.outputs.iter().filter(|r| r.valid).count();
            net.shape = match (drivers, readers) {
                (0, 0) => NetShape::Empty,
                (0, _) => NetShape::Undriven,
                (d, _) if d > 1 && !all_tristate => NetShape::Ambiguous,
                (_, 0) => NetShape::Unread,
                _ => NetShape::Directed,
            };

            match net.shape {
                NetShape::Undriven => diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UndrivenNet,
                    location(),
                    "net has readers but no driver".to_string(),
                )),
                NetShape::Ambiguous => {
                    let listed: Vec<String> = net.inputs.iter().map(label).collect();
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::MultipleDrivers,
                        location(),
                        format!("always-on drivers {} share a net", listed.join(", ")),
                    ));
                }
                _ => {}
            }
        }
    }

    /// Gives every port without a declared width the width of its net.
    fn resolve_widths(&mut self) {
        let ExeSystem { comps, nets, .. } = &mut self.system;
        for (comp, declared) in comps.iter_mut().zip(&self.declared) {
            for (port, width) in comp.ports.iter_mut().zip(declared) {
                port.width = width
                    .or_else(|| port.net_idx.map(|ni| nets[ni].width))
                    .unwrap_or(DEFAULT_WIDTH);
            }
        }
    }

    fn build_boundary(&mut self) {
        let ExeSystem { comps, boundary, .. } = &mut self.system;
        for (ci, comp) in comps.iter().enumerate() {
            let dir = match comp.comp.def_id.as_str() {
                defs::IO_IN => PortDir::IN,
                defs::IO_OUT => PortDir::OUT,
                _ => continue,
            };
            boundary.push(BoundaryPort {
                name: comp.comp.name.clone(),
                dir,
                width: comp.ports.first().map_or(DEFAULT_WIDTH, |p| p.width),
                comp_idx: ci,
            });
        }
    }

    fn order_steps(&mut self) {
        let net_count = self.system.nets.len();
        let phase_nodes: Vec<(CompIdx, PhaseIdx)> = self
            .system
            .comps
            .iter()
            .enumerate()
            .filter(|(_, comp)| comp.valid)
            .flat_map(|(ci, comp)| {
                comp.phases
                    .iter()
                    .enumerate()
                    .filter(|(_, phase)| !phase.is_latch())
                    .map(move |(pi, _)| (ci, pi))
            })
            .collect();

        let graph = DependencyGraph::build(&self.system.comps, net_count, &phase_nodes);
        let mut sort = graph.sort();

        if !sort.is_complete() {
            let core = graph.cycle_core(&sort.done);
            let looped: BTreeSet<CompIdx> = core
                .iter()
                .filter(|&&n| n >= net_count)
                .map(|&n| phase_nodes[n - net_count].0)
                .collect();

            let members: Vec<&str> = looped
                .iter()
                .map(|&ci| self.system.comps[ci].comp.id.as_str())
                .collect();
            let message = format!("combinational loop through {}", members.join(", "));
            let mut found = Vec::with_capacity(looped.len());
            for &ci in &looped {
                found.push(Diagnostic::new(
                    DiagnosticKind::CombinationalLoop,
                    Location::comp(&self.system.comps[ci].comp.id),
                    message.clone(),
                ));
            }
            self.system.diagnostics.extend(found);

            for &ci in &looped {
                self.system.comps[ci].invalidate();
            }
            let removed: Vec<usize> = phase_nodes
                .iter()
                .enumerate()
                .filter(|(_, (ci, _))| looped.contains(ci))
                .map(|(k, _)| net_count + k)
                .collect();
            sort.remove_and_resume(&graph, &removed);
        }

        let comps = &self.system.comps;
        self.system.execution_steps = sort
            .order
            .iter()
            .map(|&n| {
                if n < net_count {
                    ExeStep::Net(n)
                } else {
                    let (comp, phase) = phase_nodes[n - net_count];
                    ExeStep::Phase { comp, phase }
                }
            })
            .filter(|step| match *step {
                ExeStep::Phase { comp, .. } => comps[comp].valid,
                ExeStep::Net(_) => true,
            })
            .collect();

        self.system.latch_steps = comps
            .iter()
            .enumerate()
            .filter(|(_, comp)| comp.valid)
            .flat_map(|(ci, comp)| {
                comp.phases
                    .iter()
                    .enumerate()
                    .filter(|(_, phase)| phase.is_latch())
                    .map(move |(pi, _)| ExeStep::Phase { comp: ci, phase: pi })
            })
            .collect();
    }
}

fn placeholder(ports: Vec<CompPort>) -> CompBuild {
    CompBuild {
        ports,
        phases: Vec::new(),
        errors: Vec::new(),
        data: CompData::None,
    }
}

/// Nets occupy node indices `0..net_count`; phase node `net_count + k` is
/// the k-th entry of the phase list.
struct DependencyGraph {
    adj: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl DependencyGraph {
    fn build(comps: &[ExeComp], net_count: usize, phase_nodes: &[(CompIdx, PhaseIdx)]) -> Self {
        let node_count = net_count + phase_nodes.len();
        let mut graph = Self {
            adj: vec![Vec::new(); node_count],
            in_degree: vec![0; node_count],
        };

        for (k, &(ci, pi)) in phase_nodes.iter().enumerate() {
            let node = net_count + k;
            let comp = &comps[ci];
            let phase = &comp.phases[pi];
            for &r in &phase.read_ports {
                if let Some(net) = comp.ports.get(r).and_then(|p| p.net_idx) {
                    graph.add_edge(net, node);
                }
            }
            for &w in &phase.write_ports {
                let Some(port) = comp.ports.get(w) else {
                    continue;
                };
                if let (true, Some(net)) = (port.ty.is_output(), port.net_idx) {
                    graph.add_edge(node, net);
                }
            }
        }
        graph
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        self.adj[from].push(to);
        self.in_degree[to] += 1;
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    /// Kahn's algorithm, always taking the lowest ready node.
    fn sort(&self) -> TopoSort {
        let mut sort = TopoSort {
            in_degree: self.in_degree.clone(),
            done: vec![false; self.len()],
            order: Vec::with_capacity(self.len()),
            ready: (0..self.len()).filter(|&n| self.in_degree[n] == 0).collect(),
            removed: 0,
        };
        sort.drain(self);
        sort
    }

    /// Nodes left unsorted that lie on a cycle, or between two cycles.
    ///
    /// Everything left after Kahn's algorithm is reachable from a cycle;
    /// peeling off nodes with no successor among the leftovers keeps only
    /// the ones that also lead back into one.
    fn cycle_core(&self, done: &[bool]) -> Vec<usize> {
        let mut in_core: Vec<bool> = done.iter().map(|d| !d).collect();
        let mut out_degree = vec![0usize; self.len()];
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); self.len()];
        for n in (0..self.len()).filter(|&n| in_core[n]) {
            for &m in self.adj[n].iter().filter(|&&m| in_core[m]) {
                out_degree[n] += 1;
                preds[m].push(n);
            }
        }

        let mut sinks: Vec<usize> = (0..self.len())
            .filter(|&n| in_core[n] && out_degree[n] == 0)
            .collect();
        while let Some(n) = sinks.pop() {
            if !in_core[n] {
                continue;
            }
            in_core[n] = false;
            for &p in &preds[n] {
                if in_core[p] {
                    out_degree[p] -= 1;
                    if out_degree[p] == 0 {
                        sinks.push(p);
                    }
                }
            }
        }
        (0..self.len()).filter(|&n| in_core[n]).collect()
    }
}

struct TopoSort {
    in_degree: Vec<usize>,
    /// Sorted or removed
    done: Vec<bool>,
    order: Vec<usize>,
    ready: BTreeSet<usize>,
    removed: usize,
}

impl TopoSort {
    fn drain(&mut self, graph: &DependencyGraph) {
        while let Some(node) = self.ready.pop_first() {
            if self.done[node] {
                continue;
            }
            self.done[node] = true;
            self.order.push(node);
            for &next in &graph.adj[node] {
                self.release(next);
            }
        }
    }

    fn release(&mut self, node: usize) {
        self.in_degree[node] -= 1;
        if self.in_degree[node] == 0 && !self.done[node] {
            self.ready.insert(node);
        }
    }

    fn is_complete(&self) -> bool {
        self.order.len() + self.removed == self.done.len()
    }

    /// Drops unsorted nodes from the graph and sorts whatever they were blocking.
    fn remove_and_resume(&mut self, graph: &DependencyGraph, nodes: &[usize]) {
        let fresh: Vec<usize> = nodes.iter().copied().filter(|&n| !self.done[n]).collect();
        for &n in &fresh {
            self.done[n] = true;
        }
        self.removed += fresh.len();
        for &n in &fresh {
            for &next in &graph.adj[n] {
                self.release(next);
            }
        }
        self.drain(graph);
        debug_assert!(self.is_complete(), "only removed phases can lie on a cycle");
    }
}

/// Union-find over wire indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Joins two sets; the lower root wins so net numbering follows wire order.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}
