//! Top-level simulation engine.
//!
//! The `SimulationEngine` owns a layout, the library it is resolved against,
//! and the execution system compiled from the two. Front ends drive it with
//! [`Command`]s; editing the layout goes through [`SimulationEngine::set_layout`],
//! which recompiles and swaps the system only if compilation succeeds.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::compiler::{compile, compile_strict, CompileError};
use crate::comps::register_builtins_with;
use crate::config::{ConfigError, SimConfig};
use crate::executor::{RunSummary, StepOutcome};
use crate::layout::{CpuLayout, LayoutError};
use crate::library::{CompLibrary, LibraryError, ResetOptions};
use crate::stats::{SimulationStats, StatsCollector};
use crate::system::ExeSystem;
use crate::types::Tick;

/// Errors raised by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("library error: {0}")]
    Library(#[from] LibraryError),
}

/// A request to the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Restore power-on state with the given options
    Reset(ResetOptions),
    /// Run one execution step
    Step,
    /// Run the remaining execution steps of the tick
    Settle,
    /// Apply the clock edge and start the next tick
    Latch,
    /// Run one full tick
    Tick,
    /// Free-run up to this many ticks or until halted
    Run(Tick),
    /// Free-run up to the configured tick limit
    RunConfigured,
    Halt,
    Resume,
}

/// What a command did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    Step(StepOutcome),
    Settled { steps: usize },
    Ran(RunSummary),
}

/// The simulation engine.
///
/// # Example
///
/// ```ignore
/// let mut engine = SimulationEngine::new(layout, Arc::new(create_default_library()))?;
/// engine.execute(Command::Reset(ResetOptions::new().with_rom(image)))?;
/// let summary = engine.run(1000);
/// ```
pub struct SimulationEngine {
    layout: CpuLayout,
    library: Arc<CompLibrary>,
    system: ExeSystem,
    /// Reject layouts with error diagnostics
    strict: bool,
    /// Tick limit for `Command::RunConfigured`
    max_ticks: Tick,
    /// Successful compilations since construction
    compiles: u64,
    collector: Option<StatsCollector>,
}

impl SimulationEngine {
    /// Compiles `layout` against `library` and wraps the result.
    pub fn new(layout: CpuLayout, library: Arc<CompLibrary>) -> Result<Self, EngineError> {
        Self::build(layout, library, false)
    }

    /// Like [`new`](Self::new) but refuses layouts with error diagnostics.
    pub fn new_strict(layout: CpuLayout, library: Arc<CompLibrary>) -> Result<Self, EngineError> {
        Self::build(layout, library, true)
    }

    fn build(layout: CpuLayout, library: Arc<CompLibrary>, strict: bool) -> Result<Self, EngineError> {
        let system = Self::compile_with(&layout, &library, strict)?;
        Ok(Self {
            layout,
            library,
            system,
            strict,
            max_ticks: 1000,
            compiles: 1,
            collector: None,
        })
    }

    /// Builds an engine from a configuration.
    ///
    /// The library holds the built-in definitions with the configured memory
    /// geometry. A configuration without a layout gives an empty circuit.
    pub fn from_config(config: &SimConfig) -> Result<Self, EngineError> {
        let mut library = CompLibrary::new();
        register_builtins_with(&mut library, config.memory.to_defaults()?);
        let layout = config.load_layout()?.unwrap_or_default();

        let mut engine = Self::build(layout, Arc::new(library), config.simulation.strict)?;
        engine.max_ticks = config.simulation.max_ticks;
        if config.simulation.collect_stats {
            let mut collector = StatsCollector::new();
            if let Some(path) = &config.source_path {
                collector.set_config_file(path.display().to_string());
            }
            engine.collector = Some(collector);
        }
        info!(
            strict = engine.strict,
            max_ticks = engine.max_ticks,
            collect_stats = config.simulation.collect_stats,
            "Engine configured"
        );
        Ok(engine)
    }

    fn compile_with(
        layout: &CpuLayout,
        library: &Arc<CompLibrary>,
        strict: bool,
    ) -> Result<ExeSystem, CompileError> {
        if strict {
            compile_strict(layout, Arc::clone(library))
        } else {
            compile(layout, Arc::clone(library))
        }
    }

    pub fn layout(&self) -> &CpuLayout {
        &self.layout
    }

    pub fn library(&self) -> &Arc<CompLibrary> {
        &self.library
    }

    pub fn system(&self) -> &ExeSystem {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut ExeSystem {
        &mut self.system
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Takes effect on the next compilation.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn max_ticks(&self) -> Tick {
        self.max_ticks
    }

    pub fn set_max_ticks(&mut self, max_ticks: Tick) {
        self.max_ticks = max_ticks;
    }

    /// Enables run statistics under the given name.
    pub fn collect_stats(&mut self, name: impl Into<String>) {
        let mut collector = StatsCollector::new();
        collector.set_name(name);
        self.collector = Some(collector);
    }

    /// Statistics of the last configured or explicit run, if collection is on.
    pub fn run_stats(&self) -> Option<&SimulationStats> {
        self.collector.as_ref().map(StatsCollector::stats)
    }

    /// Replaces the layout and recompiles.
    ///
    /// On failure the previous layout and system stay in place.
    pub fn set_layout(&mut self, layout: CpuLayout) -> Result<(), EngineError> {
        let system = Self::compile_with(&layout, &self.library, self.strict)?;
        self.layout = layout;
        self.system = system;
        self.compiles += 1;
        debug!(compiles = self.compiles, "Layout replaced");
        Ok(())
    }

    /// Edits the layout in place and recompiles.
    ///
    /// On failure the edit is rolled back.
    pub fn edit_layout<F>(&mut self, edit: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut CpuLayout),
    {
        let mut layout = self.layout.clone();
        edit(&mut layout);
        layout.validate()?;
        self.set_layout(layout)
    }

    /// Recompiles the current layout, for instance after the library changed.
    pub fn recompile(&mut self) -> Result<(), EngineError> {
        self.set_layout(self.layout.clone())
    }

    /// Replaces the library and recompiles against it.
    pub fn set_library(&mut self, library: Arc<CompLibrary>) -> Result<(), EngineError> {
        let system = Self::compile_with(&self.layout, &library, self.strict)?;
        self.library = library;
        self.system = system;
        self.compiles += 1;
        Ok(())
    }

    /// Executes one command.
    pub fn execute(&mut self, command: Command) -> Result<CommandOutcome, EngineError> {
        debug!(?command, tick = self.system.tick, "Execute command");
        let outcome = match command {
            Command::Reset(options) => {
                self.system.reset(&options)?;
                CommandOutcome::Done
            }
            Command::Step => CommandOutcome::Step(self.system.step()),
            Command::Settle => CommandOutcome::Settled {
                steps: self.system.settle(),
            },
            Command::Latch => {
                self.system.latch();
                CommandOutcome::Done
            }
            Command::Tick => {
                self.system.tick();
                CommandOutcome::Done
            }
            Command::Run(max_ticks) => CommandOutcome::Ran(self.run(max_ticks)),
            Command::RunConfigured => CommandOutcome::Ran(self.run(self.max_ticks)),
            Command::Halt => {
                self.system.halt();
                CommandOutcome::Done
            }
            Command::Resume => {
                self.system.resume();
                CommandOutcome::Done
            }
        };
        Ok(outcome)
    }

    /// Free-runs the system, timing it when statistics are collected.
    pub fn run(&mut self, max_ticks: Tick) -> RunSummary {
        if let Some(collector) = self.collector.as_mut() {
            collector.start();
        }
        let summary = self.system.run(max_ticks);
        if let Some(collector) = self.collector.as_mut() {
            collector.stop();
            collector.update_from_json(&self.system.export_stats());
        }
        summary
    }

    /// Exports statistics from the engine and its system.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "engine": {
                "compiles": self.compiles,
                "strict": self.strict,
                "max_ticks": self.max_ticks,
                "halted": self.system.is_halted(),
            },
            "system": self.system.export_stats(),
        })
    }
}
