//! # Gatework
//!
//! A gate- and component-level digital circuit simulator.
//!
//! A design is a [`CpuLayout`]: components instantiated from a library of
//! definitions, connected by wires. The layout is compiled into an
//! [`ExeSystem`], a flat executable form where wires have become nets and
//! every piece of combinational work has a place in one deterministic,
//! dependency-respecting order. The system then runs tick by tick.
//!
//! ## Design Principles
//!
//! - **Layout is the source of truth**: the executable system is derived
//!   from it and rebuilt whenever it changes.
//! - **Problems are diagnostics**: unknown definitions, dangling wires,
//!   width mismatches and combinational loops are reported on the compiled
//!   system, and everything unaffected still runs.
//! - **Two-phase ticks**: combinational steps settle in topological order,
//!   then latch steps commit state at the clock edge. Both halves can be
//!   stepped and inspected.
//! - **Hierarchy**: a layout registered as a circuit definition becomes a
//!   component with its own nested execution system.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use gatework::comps::defs;
//! use gatework::{compile, create_default_library, Comp, CompArgs, CpuLayout, WireGraph};
//!
//! let w8 = CompArgs::new().with("width", 8);
//! let layout = CpuLayout::new()
//!     .with_comp(Comp::new("d", defs::INPUT).with_args(w8.clone()))
//!     .with_comp(Comp::new("r", defs::REG).with_args(w8))
//!     .with_wire(WireGraph::connecting("w0", [("d", "out"), ("r", "in")]));
//!
//! let mut system = compile(&layout, Arc::new(create_default_library())).unwrap();
//! system.set_input("d", 42);
//! system.tick();
//! system.settle();
//! assert_eq!(system.port_value("r", "out"), Some(42));
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use gatework::{Command, SimConfig, SimulationEngine};
//!
//! let config = SimConfig::from_file("sim.yaml")?;
//! let mut engine = SimulationEngine::from_config(&config)?;
//! engine.execute(Command::RunConfigured)?;
//! ```

pub mod types;
pub mod layout;
pub mod memory;
pub mod component;
pub mod library;
pub mod comps;
pub mod diagnostics;
pub mod system;
pub mod compiler;
pub mod executor;
pub mod engine;
pub mod config;
pub mod stats;

// Re-export commonly used types
pub use types::{mask, CompIdx, NetIdx, PhaseIdx, PortIdx, Tick, Word, FLOATING};
pub use layout::{Comp, CompArgs, CompPort, CpuLayout, ElRef, LayoutError, PortDir, RefType, WireGraph};
pub use memory::{MemoryError, MemoryMap};
pub use component::{CompData, ExeComp, ExePhase, ExePort, PhaseCtx, PhaseFault, RunArgs};
pub use library::{create_default_library, CompLibrary, LibraryError, ResetOptions};
pub use diagnostics::{Category, Diagnostic, DiagnosticKind, Location, Severity};
pub use system::{ExeNet, ExeStep, ExeSystem, NetShape};
pub use compiler::{compile, compile_strict, CompileError};
pub use executor::{RunSummary, StepOutcome};
pub use engine::{Command, CommandOutcome, EngineError, SimulationEngine};
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use stats::{ExecStats, SimulationStats, StatsCollector, Timer};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// overrides `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// gatework::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
