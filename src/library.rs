//! Component library: definition ids mapped to component factories.
//!
//! The compiler asks the library how to build every layout component. A
//! definition is either native, a factory producing a port template, phases
//! and an initial payload, or a circuit, a whole layout that is compiled as a
//! nested sub-system.
//!
//! # Example
//!
//! ```
//! use gatework::library::{CompBuild, CompLibrary};
//! use gatework::component::{CompData, ExePhase};
//! use gatework::layout::{CompArgs, CompPort, PortDir};
//!
//! let mut library = CompLibrary::new();
//! library.register("zero", |_args: &CompArgs| CompBuild {
//!     ports: vec![CompPort::new("out", PortDir::OUT).with_width(8)],
//!     phases: vec![ExePhase::new(vec![], vec![0], |ctx| {
//!         ctx.set(0, 0);
//!         Ok(())
//!     })],
//!     errors: Vec::new(),
//!     data: CompData::None,
//! });
//!
//! let build = library.build("zero", &CompArgs::new()).unwrap();
//! assert_eq!(build.ports.len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::comps::defs;
use crate::component::{CompData, ExeComp, ExePhase};
use crate::layout::{CompArgs, CompPort, CpuLayout, PortDir};
use crate::memory::MemoryError;
use crate::types::Word;

/// Everything a native definition produces for one component.
#[derive(Debug)]
pub struct CompBuild {
    /// Ports in definition order; phases refer to them by index
    pub ports: Vec<CompPort>,
    pub phases: Vec<ExePhase>,
    /// Argument problems, reported against the component when compiled
    pub errors: Vec<String>,
    pub data: CompData,
}

/// Type alias for native component factories.
pub type CompFactory = Arc<dyn Fn(&CompArgs) -> CompBuild + Send + Sync>;

/// A registered definition.
#[derive(Clone)]
pub enum CompDef {
    Native(CompFactory),
    Circuit(Arc<CpuLayout>),
}

impl std::fmt::Debug for CompDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompDef::Native(_) => f.write_str("Native"),
            CompDef::Circuit(layout) => f
                .debug_struct("Circuit")
                .field("comps", &layout.comps.len())
                .field("wires", &layout.wires.len())
                .finish(),
        }
    }
}

/// Options recognised when resetting component payloads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Loaded at the start of every memory component's ROM
    pub rom_image: Option<Vec<u8>>,
    /// Loaded at the start of every memory component's RAM
    pub ram_image: Option<Vec<u8>>,
    /// Keep RAM and IO contents across the reset
    pub preserve_memory: bool,
    /// Zero RAM even when memory is otherwise preserved
    pub clear_ram: bool,
    /// Initial value of registers and program counters
    pub register_value: Option<Word>,
}

impl ResetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rom(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.rom_image = Some(image.into());
        self
    }

    pub fn with_ram(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.ram_image = Some(image.into());
        self
    }

    pub fn preserving_memory(mut self) -> Self {
        self.preserve_memory = true;
        self
    }

    pub fn clearing_ram(mut self) -> Self {
        self.clear_ram = true;
        self
    }

    pub fn with_register_value(mut self, value: Word) -> Self {
        self.register_value = Some(value);
        self
    }

    /// Applies the options to a freshly built payload.
    ///
    /// `previous` is the payload being replaced; it is only consulted when
    /// memory contents are preserved.
    pub fn apply(&self, data: &mut CompData, previous: &CompData) -> Result<(), MemoryError> {
        match data {
            CompData::Memory(map) => {
                if self.preserve_memory {
                    if let CompData::Memory(old) = previous {
                        if old.ram.len() == map.ram.len() {
                            map.ram.copy_from_slice(&old.ram);
                        }
                        if old.io.len() == map.io.len() {
                            map.io.copy_from_slice(&old.io);
                        }
                    }
                }
                if self.clear_ram {
                    map.ram.fill(0);
                }
                if let Some(image) = &self.rom_image {
                    map.load_rom(image)?;
                }
                if let Some(image) = &self.ram_image {
                    map.load_ram(image)?;
                }
            }
            CompData::Register(reg) => {
                if let Some(value) = self.register_value {
                    reg.value = value & crate::types::mask(reg.width);
                }
            }
            CompData::Pc(pc) => {
                if let Some(value) = self.register_value {
                    pc.value = value & crate::types::mask(pc.width);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Errors raised by library operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("unknown component definition: {0}")]
    UnknownDefinition(String),

    #[error("reset of {comp_id} failed: {source}")]
    Reset {
        comp_id: String,
        #[source]
        source: MemoryError,
    },
}

/// A registry of component definitions.
#[derive(Clone, Default)]
pub struct CompLibrary {
    defs: HashMap<String, CompDef>,
}

impl CompLibrary {
    /// Creates a new empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a native definition.
    pub fn register<F>(&mut self, def_id: impl Into<String>, factory: F)
    where
        F: Fn(&CompArgs) -> CompBuild + Send + Sync + 'static,
    {
        self.defs.insert(def_id.into(), CompDef::Native(Arc::new(factory)));
    }

    /// Registers a layout as a circuit definition.
    ///
    /// The circuit's boundary is given by its `io.in` and `io.out`
    /// components; each becomes a port named after the component.
    pub fn register_circuit(&mut self, def_id: impl Into<String>, layout: CpuLayout) {
        self.defs.insert(def_id.into(), CompDef::Circuit(Arc::new(layout)));
    }

    pub fn get(&self, def_id: &str) -> Option<&CompDef> {
        self.defs.get(def_id)
    }

    /// Builds a native definition. Circuits and unknown ids return `None`.
    pub fn build(&self, def_id: &str, args: &CompArgs) -> Option<CompBuild> {
        match self.defs.get(def_id)? {
            CompDef::Native(factory) => Some(factory(args)),
            CompDef::Circuit(_) => None,
        }
    }

    /// Returns the port template of a definition, for the editor.
    pub fn port_template(&self, def_id: &str, args: &CompArgs) -> Option<Vec<CompPort>> {
        match self.defs.get(def_id)? {
            CompDef::Native(factory) => Some(factory(args).ports),
            CompDef::Circuit(layout) => Some(circuit_ports(layout)),
        }
    }

    /// Produces a reset payload for a component, leaving its ports and phases alone.
    pub fn reset(&self, comp: &ExeComp, options: &ResetOptions) -> Result<CompData, LibraryError> {
        let def_id = &comp.comp.def_id;
        match self.defs.get(def_id) {
            Some(CompDef::Native(factory)) => {
                let mut data = factory(&comp.comp.args_or_default()).data;
                options
                    .apply(&mut data, &comp.data)
                    .map_err(|source| LibraryError::Reset {
                        comp_id: comp.comp.id.clone(),
                        source,
                    })?;
                Ok(data)
            }
            Some(CompDef::Circuit(_)) => Ok(CompData::None),
            None => Err(LibraryError::UnknownDefinition(def_id.clone())),
        }
    }

    /// Returns true if a definition is registered.
    pub fn contains(&self, def_id: &str) -> bool {
        self.defs.contains_key(def_id)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Registered definition ids, sorted.
    pub fn def_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.defs.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn unregister(&mut self, def_id: &str) -> bool {
        self.defs.remove(def_id).is_some()
    }

    pub fn clear(&mut self) {
        self.defs.clear();
    }
}

impl std::fmt::Debug for CompLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompLibrary")
            .field("registered_defs", &self.def_ids())
            .finish()
    }
}

/// Boundary ports of a circuit layout, in declaration order.
pub(crate) fn circuit_ports(layout: &CpuLayout) -> Vec<CompPort> {
    layout
        .comps
        .iter()
        .filter_map(|c| {
            let ty = match c.def_id.as_str() {
                defs::IO_IN => PortDir::IN,
                defs::IO_OUT => PortDir::OUT,
                _ => return None,
            };
            let args = c.args_or_default();
            let mut port = CompPort::new(c.name.clone(), ty);
            port.width = args.get_u64("width").map(|w| w as u32).or_else(|| {
                c.ports.first().and_then(|p| p.width)
            });
            Some(port)
        })
        .collect()
}

/// Creates a library with every built-in definition registered.
pub fn create_default_library() -> CompLibrary {
    let mut library = CompLibrary::new();
    crate::comps::register_builtins(&mut library);
    library
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Comp;

    fn counter_build(_: &CompArgs) -> CompBuild {
        CompBuild {
            ports: vec![CompPort::new("out", PortDir::OUT)],
            phases: Vec::new(),
            errors: Vec::new(),
            data: CompData::Register(crate::component::RegisterData { value: 0, width: 8 }),
        }
    }

    #[test]
    fn test_library_basic() {
        let mut library = CompLibrary::new();
        assert!(library.is_empty());

        library.register("counter", counter_build);
        assert_eq!(library.len(), 1);
        assert!(library.contains("counter"));
        assert!(library.build("counter", &CompArgs::new()).is_some());
        assert!(library.build("missing", &CompArgs::new()).is_none());
    }

    #[test]
    fn test_library_unregister() {
        let mut library = CompLibrary::new();
        library.register("counter", counter_build);
        assert!(library.unregister("counter"));
        assert!(!library.unregister("counter"));
    }

    #[test]
    fn test_circuit_template() {
        let layout = CpuLayout::new()
            .with_comp(
                Comp::new("c0", defs::IO_IN)
                    .with_name("a")
                    .with_args(CompArgs::new().with("width", 4)),
            )
            .with_comp(Comp::new("c1", defs::IO_OUT).with_name("y"));

        let mut library = CompLibrary::new();
        library.register_circuit("half", layout);
        assert!(library.build("half", &CompArgs::new()).is_none());

        let ports = library.port_template("half", &CompArgs::new()).unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].name, "a");
        assert_eq!(ports[0].width, Some(4));
        assert!(ports[1].ty.is_output());
    }

    #[test]
    fn test_reset_options_register_value() {
        let mut data = CompData::Register(crate::component::RegisterData { value: 0, width: 4 });
        ResetOptions::new()
            .with_register_value(0x1f)
            .apply(&mut data, &CompData::None)
            .unwrap();
        assert_eq!(data.value(), Some(0xf));
    }

    #[test]
    fn test_reset_options_preserve_memory() {
        let mut old = crate::memory::MemoryMap::new(0, 4, 0x10, 4);
        old.write_u8(0x11, 9).unwrap();
        let mut fresh = CompData::Memory(crate::memory::MemoryMap::new(0, 4, 0x10, 4));
        ResetOptions::new()
            .preserving_memory()
            .with_rom(vec![1, 2])
            .apply(&mut fresh, &CompData::Memory(old))
            .unwrap();
        let map = fresh.as_memory().unwrap();
        assert_eq!(map.read_u8(0x11).unwrap(), 9);
        assert_eq!(map.read_u8(0x1).unwrap(), 2);
    }

    #[test]
    fn test_default_library() {
        let library = create_default_library();
        for id in [
            defs::CONST,
            defs::INPUT,
            defs::PROBE,
            defs::AND,
            defs::MUX,
            defs::TRIBUF,
            defs::ALU,
            defs::REG,
            defs::PC,
            defs::REGFILE,
            defs::MEM,
            defs::HALT,
            defs::IO_IN,
            defs::IO_OUT,
        ] {
            assert!(library.contains(id), "missing {id}");
        }
    }
}
