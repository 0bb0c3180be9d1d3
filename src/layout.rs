//! The design-time layout model.
//!
//! A [`CpuLayout`] is the user-authored description of a circuit: components
//! with their ports, and wire graphs connecting those ports. It is plain data.
//! The simulator never mutates it; structural edits produce a new layout that
//! is compiled again.
//!
//! Layouts round-trip through JSON and YAML documents:
//!
//! ```yaml
//! next_comp_id: 3
//! next_wire_id: 1
//! comps:
//!   - id: "c0"
//!     def_id: input
//!     name: A
//!     ports:
//!       - { id: out, name: out, ty: 2, width: 8 }
//!   - id: "c1"
//!     def_id: probe
//!     name: Q
//!     ports:
//!       - { id: in, name: in, ty: 1 }
//! wires:
//!   - id: "w0"
//!     nodes:
//!       - { id: 0, edges: [1], ref: { ty: CompNode, id: "c0", comp_node_id: out } }
//!       - { id: 1, edges: [0], ref: { ty: CompNode, id: "c1", comp_node_id: in } }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading, saving or checking a layout document.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate component id: {0}")]
    DuplicateComp(String),

    #[error("Duplicate wire id: {0}")]
    DuplicateWire(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for layout operations.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// A position or size in model space. Only the rendering layer reads these.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Direction and role tags of a port, stored as bit flags.
///
/// The direction bits (`IN`, `OUT`, `TRISTATE`) decide how a port takes part
/// in a net. The role bits (`DATA`, `ADDR`, `CTRL`) only group nets for
/// display and diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortDir(pub u8);

impl PortDir {
    pub const IN: PortDir = PortDir(1 << 0);
    pub const OUT: PortDir = PortDir(1 << 1);
    pub const TRISTATE: PortDir = PortDir(1 << 2);
    pub const DATA: PortDir = PortDir(1 << 3);
    pub const ADDR: PortDir = PortDir(1 << 4);
    pub const CTRL: PortDir = PortDir(1 << 5);
    pub const OUT_TRI: PortDir = PortDir(Self::OUT.0 | Self::TRISTATE.0);

    const ROLE_BITS: u8 = Self::DATA.0 | Self::ADDR.0 | Self::CTRL.0;

    /// Returns true if every bit of `other` is set.
    pub fn contains(self, other: PortDir) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if this port reads from its net.
    pub fn is_input(self) -> bool {
        self.contains(Self::IN)
    }

    /// Returns true if this port drives its net.
    pub fn is_output(self) -> bool {
        self.contains(Self::OUT)
    }

    /// Returns true if this port may release its net.
    pub fn is_tristate(self) -> bool {
        self.contains(Self::TRISTATE)
    }

    /// Returns only the Data/Addr/Ctrl bits.
    pub fn roles(self) -> PortDir {
        PortDir(self.0 & Self::ROLE_BITS)
    }

    /// Adds role or direction bits.
    pub fn with(self, other: PortDir) -> PortDir {
        PortDir(self.0 | other.0)
    }
}

impl std::ops::BitOr for PortDir {
    type Output = PortDir;

    fn bitor(self, rhs: PortDir) -> PortDir {
        self.with(rhs)
    }
}

/// A design-time port on a component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompPort {
    /// Identifier, unique within the owning component
    pub id: String,
    /// Position relative to the owning component
    #[serde(default)]
    pub pos: Vec3,
    /// Port name as known to the component definition
    pub name: String,
    /// Direction and role tags
    pub ty: PortDir,
    /// Bit width; `None` inherits from the definition or the net
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

impl CompPort {
    /// Creates a port whose id equals its name.
    pub fn new(name: impl Into<String>, ty: PortDir) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            pos: Vec3::default(),
            name,
            ty,
            width: None,
        }
    }

    /// Sets an explicit width.
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    /// Sets the port id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Type-specific arguments of a component (word width, memory size, ...).
///
/// Stored as an ordered map so serialized layouts are stable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompArgs(pub BTreeMap<String, serde_json::Value>);

impl CompArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an argument.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Reads an unsigned integer argument, accepting numbers or numeric strings.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => parse_u64(s),
            serde_json::Value::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    /// Reads an unsigned argument with a fallback.
    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.get_u64(key).unwrap_or(default)
    }

    /// Reads a width argument with a fallback, clamped to 1..=64.
    pub fn width_or(&self, key: &str, default: u32) -> u32 {
        let width = self.get_u64(key).map_or(default, |w| w as u32);
        width.clamp(1, crate::types::MAX_WIDTH)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str()
    }

    /// Reads a byte array argument given either as a list of numbers or a hex string.
    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        match self.0.get(key)? {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect(),
            serde_json::Value::String(s) => parse_hex_bytes(s),
            _ => None,
        }
    }
}

/// Parses decimal or `0x`-prefixed hexadecimal.
pub(crate) fn parse_u64(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => s.replace('_', "").parse().ok(),
    }
}

/// Parses a whitespace-tolerant hex string into bytes.
pub(crate) fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(text, 16).ok()
        })
        .collect()
}

/// A design-time component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comp {
    /// Stable identifier chosen by the editor
    pub id: String,
    /// Component definition identifier, resolved through the library
    pub def_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pos: Vec3,
    #[serde(default)]
    pub size: Vec3,
    /// Ports in declaration order
    #[serde(default)]
    pub ports: Vec<CompPort>,
    /// Type-specific arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<CompArgs>,
}

impl Comp {
    pub fn new(id: impl Into<String>, def_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            def_id: def_id.into(),
            pos: Vec3::default(),
            size: Vec3::default(),
            ports: Vec::new(),
            args: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_port(mut self, port: CompPort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_ports(mut self, ports: impl IntoIterator<Item = CompPort>) -> Self {
        self.ports.extend(ports);
        self
    }

    pub fn with_args(mut self, args: CompArgs) -> Self {
        self.args = Some(args);
        self
    }

    pub fn at(mut self, pos: Vec3) -> Self {
        self.pos = pos;
        self
    }

    /// Finds a port by its id.
    pub fn port(&self, port_id: &str) -> Option<&CompPort> {
        self.ports.iter().find(|p| p.id == port_id)
    }

    /// Returns the component arguments, or an empty set.
    pub fn args_or_default(&self) -> CompArgs {
        self.args.clone().unwrap_or_default()
    }
}

/// The kind of element an [`ElRef`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefType {
    Comp,
    Wire,
    CompNode,
}

/// A reference from the editor (or a wire endpoint) to a layout element.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElRef {
    pub ty: RefType,
    /// Component id or wire id, depending on `ty`
    pub id: String,
    /// Port id, for `CompNode` refs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire_node0_id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire_node1_id: Option<usize>,
}

impl ElRef {
    /// A reference to a component port.
    pub fn comp_node(comp_id: impl Into<String>, port_id: impl Into<String>) -> Self {
        Self {
            ty: RefType::CompNode,
            id: comp_id.into(),
            comp_node_id: Some(port_id.into()),
            wire_node0_id: None,
            wire_node1_id: None,
        }
    }

    /// A reference to another wire, optionally at one of its nodes.
    pub fn wire(wire_id: impl Into<String>, node: Option<usize>) -> Self {
        Self {
            ty: RefType::Wire,
            id: wire_id.into(),
            comp_node_id: None,
            wire_node0_id: node,
            wire_node1_id: None,
        }
    }

    /// A reference to a whole component.
    pub fn comp(comp_id: impl Into<String>) -> Self {
        Self {
            ty: RefType::Comp,
            id: comp_id.into(),
            comp_node_id: None,
            wire_node0_id: None,
            wire_node1_id: None,
        }
    }
}

/// A node in a wire's routing graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireGraphNode {
    pub id: usize,
    #[serde(default)]
    pub pos: Vec3,
    /// Indices into the owning graph's `nodes`; edges are bidirectional
    #[serde(default)]
    pub edges: Vec<usize>,
    /// What this node terminates at, if anything
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_: Option<ElRef>,
}

/// A wire: a routing graph whose terminal nodes reference ports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireGraph {
    pub id: String,
    #[serde(default)]
    pub nodes: Vec<WireGraphNode>,
}

impl WireGraph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
        }
    }

    /// Builds a wire that connects the given port endpoints.
    ///
    /// Each endpoint gets its own node, and every node is linked to the first
    /// one, forming a star.
    pub fn connecting<C, P>(id: impl Into<String>, endpoints: impl IntoIterator<Item = (C, P)>) -> Self
    where
        C: Into<String>,
        P: Into<String>,
    {
        let mut wire = Self::new(id);
        for (comp_id, port_id) in endpoints {
            wire.add_node(Some(ElRef::comp_node(comp_id, port_id)));
        }
        wire
    }

    /// Appends a node linked to node 0 (if any) and returns its index.
    pub fn add_node(&mut self, ref_: Option<ElRef>) -> usize {
        let idx = self.nodes.len();
        let mut node = WireGraphNode {
            id: idx,
            pos: Vec3::default(),
            edges: Vec::new(),
            ref_,
        };
        if idx > 0 {
            node.edges.push(0);
            self.nodes[0].edges.push(idx);
        }
        self.nodes.push(node);
        idx
    }

    /// Joins this wire to another wire.
    pub fn with_junction(mut self, other_wire: impl Into<String>) -> Self {
        self.add_node(Some(ElRef::wire(other_wire, None)));
        self
    }

    /// Iterates over node refs that terminate at something.
    pub fn terminals(&self) -> impl Iterator<Item = &ElRef> {
        self.nodes.iter().filter_map(|n| n.ref_.as_ref())
    }
}

/// The complete design-time circuit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuLayout {
    /// Editor selection, persisted with the document
    #[serde(default)]
    pub selected: Vec<ElRef>,
    #[serde(default)]
    pub next_comp_id: u64,
    #[serde(default)]
    pub next_wire_id: u64,
    #[serde(default)]
    pub comps: Vec<Comp>,
    #[serde(default)]
    pub wires: Vec<WireGraph>,
}

impl CpuLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh component id. Ids are never reused.
    pub fn alloc_comp_id(&mut self) -> String {
        let id = format!("c{}", self.next_comp_id);
        self.next_comp_id += 1;
        id
    }

    /// Returns a fresh wire id. Ids are never reused.
    pub fn alloc_wire_id(&mut self) -> String {
        let id = format!("w{}", self.next_wire_id);
        self.next_wire_id += 1;
        id
    }

    /// Adds a component, keeping the id counter ahead of numeric ids.
    pub fn add_comp(&mut self, comp: Comp) {
        if let Some(n) = comp.id.strip_prefix('c').and_then(|s| s.parse::<u64>().ok()) {
            self.next_comp_id = self.next_comp_id.max(n + 1);
        }
        self.comps.push(comp);
    }

    /// Adds a wire, keeping the id counter ahead of numeric ids.
    pub fn add_wire(&mut self, wire: WireGraph) {
        if let Some(n) = wire.id.strip_prefix('w').and_then(|s| s.parse::<u64>().ok()) {
            self.next_wire_id = self.next_wire_id.max(n + 1);
        }
        self.wires.push(wire);
    }

    /// Builder form of [`add_comp`](Self::add_comp).
    pub fn with_comp(mut self, comp: Comp) -> Self {
        self.add_comp(comp);
        self
    }

    /// Builder form of [`add_wire`](Self::add_wire).
    pub fn with_wire(mut self, wire: WireGraph) -> Self {
        self.add_wire(wire);
        self
    }

    pub fn find_comp(&self, id: &str) -> Option<&Comp> {
        self.comps.iter().find(|c| c.id == id)
    }

    pub fn find_comp_mut(&mut self, id: &str) -> Option<&mut Comp> {
        self.comps.iter_mut().find(|c| c.id == id)
    }

    pub fn find_wire(&self, id: &str) -> Option<&WireGraph> {
        self.wires.iter().find(|w| w.id == id)
    }

    /// Checks that component and wire ids are unique.
    pub fn validate(&self) -> LayoutResult<()> {
        let mut comp_ids = HashSet::new();
        for comp in &self.comps {
            if !comp_ids.insert(comp.id.as_str()) {
                return Err(LayoutError::DuplicateComp(comp.id.clone()));
            }
        }
        let mut wire_ids = HashSet::new();
        for wire in &self.wires {
            if !wire_ids.insert(wire.id.as_str()) {
                return Err(LayoutError::DuplicateWire(wire.id.clone()));
            }
        }
        Ok(())
    }

    /// Loads a layout from a JSON string.
    pub fn from_json(json: &str) -> LayoutResult<Self> {
        let layout: CpuLayout = serde_json::from_str(json)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Loads a layout from a YAML string.
    pub fn from_yaml(yaml: &str) -> LayoutResult<Self> {
        let layout: CpuLayout = serde_yaml::from_str(yaml)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Loads a layout from a file, choosing the format by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> LayoutResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content = std::fs::read_to_string(path)?;
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Err(LayoutError::UnknownFormat(ext.to_string())),
        }
    }

    pub fn to_json(&self) -> LayoutResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> LayoutResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Saves the layout to a file, choosing the format by extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> LayoutResult<()> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content = match ext.to_lowercase().as_str() {
            "yaml" | "yml" => self.to_yaml()?,
            "json" => self.to_json()?,
            _ => return Err(LayoutError::UnknownFormat(ext.to_string())),
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}
