//! Diagnostics attached to components and nets.
//!
//! Problems that are local to part of a circuit never abort compilation or a
//! tick. They are recorded as [`Diagnostic`]s on the execution system so the
//! editing layer can mark the affected elements: structural and topological
//! ones persist until the next compile, runtime ones are refreshed each tick.

use serde::{Deserialize, Serialize};

use crate::types::Tick;

/// How serious a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// When a diagnostic is detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    /// Detected while resolving references and widths
    Structural,
    /// Detected while ordering steps
    Topological,
    /// Detected while running a tick
    Runtime,
}

/// What went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// The component's definition id is not in the library
    UnknownDefinition,
    /// A layout port has no counterpart in the definition
    UnknownPort,
    /// A wire endpoint names a component or port that does not exist
    DanglingEndpoint,
    /// A wire junction names a wire that does not exist
    UnknownWire,
    /// Ports on one net declare different widths
    WidthMismatch,
    /// More than one always-on driver shares a net
    MultipleDrivers,
    /// A net has readers but nothing drives it
    UndrivenNet,
    /// A sub-circuit definition contains itself
    CircuitRecursion,
    /// The definition rejected one of the component's args
    InvalidArgs,
    /// A dependency cycle through combinational phases
    CombinationalLoop,
    /// More than one tristate driver enabled at once
    BusContention,
    /// A memory access outside the map or to ROM
    MemoryFault,
    /// A phase function reported a failure
    PhaseFault,
    /// A phase changed a port it did not declare as written
    UndeclaredWrite,
}

impl DiagnosticKind {
    pub fn category(self) -> Category {
        use DiagnosticKind::*;
        match self {
            UnknownDefinition | UnknownPort | DanglingEndpoint | UnknownWire | WidthMismatch
            | MultipleDrivers | UndrivenNet | CircuitRecursion | InvalidArgs => Category::Structural,
            CombinationalLoop => Category::Topological,
            BusContention | MemoryFault | PhaseFault | UndeclaredWrite => Category::Runtime,
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            DiagnosticKind::UndrivenNet => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// The element a diagnostic is attached to, by stable layout id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    Comp { id: String },
    Port { comp_id: String, port_id: String },
    Net { wire_ids: Vec<String> },
    System,
}

impl Location {
    pub fn comp(id: impl Into<String>) -> Self {
        Location::Comp { id: id.into() }
    }

    pub fn port(comp_id: impl Into<String>, port_id: impl Into<String>) -> Self {
        Location::Port {
            comp_id: comp_id.into(),
            port_id: port_id.into(),
        }
    }

    /// Prefixes component ids with the id of an enclosing sub-circuit.
    pub(crate) fn nested_in(self, parent: &str) -> Self {
        let scoped = |id: String| format!("{parent}/{id}");
        match self {
            Location::Comp { id } => Location::Comp { id: scoped(id) },
            Location::Port { comp_id, port_id } => Location::Port {
                comp_id: scoped(comp_id),
                port_id,
            },
            Location::Net { wire_ids } => Location::Net {
                wire_ids: wire_ids.into_iter().map(scoped).collect(),
            },
            Location::System => Location::Comp { id: parent.to_string() },
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Comp { id } => write!(f, "component {id}"),
            Location::Port { comp_id, port_id } => write!(f, "port {comp_id}.{port_id}"),
            Location::Net { wire_ids } => write!(f, "net [{}]", wire_ids.join(", ")),
            Location::System => f.write_str("system"),
        }
    }
}

/// A problem found in a circuit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub location: Location,
    pub message: String,
    /// Tick during which a runtime diagnostic was raised
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<Tick>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            location,
            message: message.into(),
            tick: None,
        }
    }

    pub fn at_tick(mut self, tick: Tick) -> Self {
        self.tick = Some(tick);
        self
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub(crate) fn nested_in(mut self, parent: &str) -> Self {
        self.location = self.location.nested_in(parent);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} at {}: {}", self.kind, self.location, self.message)?;
        if let Some(tick) = self.tick {
            write!(f, " (tick {tick})")?;
        }
        Ok(())
    }
}
