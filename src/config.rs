//! Configuration system for simulation runs.
//!
//! This module provides YAML/JSON configuration file support for describing a
//! run declaratively: how long to run, how strict compilation is, the default
//! memory geometry and the layout to load.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   max_ticks: 1000
//!   log_level: debug
//!   strict: true
//!
//! memory:
//!   rom_offset: 0
//!   rom_size: 4096
//!   ram_offset: 4096
//!   ram_size: 4096
//!   rom_image: "3c00 0a00"
//!
//! # either a path, relative to this file...
//! layout: cpu.yaml
//! # ...or the layout document itself
//! # layout:
//! #   comps: [...]
//! #   wires: [...]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::comps::MemoryDefaults;
use crate::layout::{parse_hex_bytes, CpuLayout, LayoutError};
use crate::types::Tick;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Global simulation parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Tick limit for a free run
    #[serde(default = "default_max_ticks")]
    pub max_ticks: Tick,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to collect run statistics
    #[serde(default)]
    pub collect_stats: bool,

    /// Refuse layouts that compile with error diagnostics
    #[serde(default)]
    pub strict: bool,
}

fn default_max_ticks() -> Tick {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
            log_level: default_log_level(),
            collect_stats: false,
            strict: false,
        }
    }
}

/// A ROM image given either as a byte list or as a hex string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RomImage {
    Bytes(Vec<u8>),
    Hex(String),
}

impl RomImage {
    pub fn to_bytes(&self) -> ConfigResult<Vec<u8>> {
        match self {
            RomImage::Bytes(bytes) => Ok(bytes.clone()),
            RomImage::Hex(hex) => parse_hex_bytes(hex)
                .ok_or_else(|| ConfigError::Validation(format!("invalid hex ROM image: {hex:?}"))),
        }
    }
}

/// Default geometry for `mem` components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub rom_offset: u64,
    #[serde(default = "default_region_size")]
    pub rom_size: u64,
    #[serde(default = "default_ram_offset")]
    pub ram_offset: u64,
    #[serde(default = "default_region_size")]
    pub ram_size: u64,
    #[serde(default = "default_io_offset")]
    pub io_offset: u64,
    #[serde(default = "default_io_size")]
    pub io_size: u64,
    #[serde(default)]
    pub rom_image: Option<RomImage>,
}

fn default_region_size() -> u64 {
    0x1000
}

fn default_ram_offset() -> u64 {
    0x1000
}

fn default_io_offset() -> u64 {
    0xff00
}

fn default_io_size() -> u64 {
    0x100
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            rom_offset: 0,
            rom_size: default_region_size(),
            ram_offset: default_ram_offset(),
            ram_size: default_region_size(),
            io_offset: default_io_offset(),
            io_size: default_io_size(),
            rom_image: None,
        }
    }
}

impl MemoryConfig {
    /// Converts to the defaults the `mem` definition is registered with.
    pub fn to_defaults(&self) -> ConfigResult<MemoryDefaults> {
        let rom_image = self.rom_image.as_ref().map(RomImage::to_bytes).transpose()?;
        Ok(MemoryDefaults {
            rom_offset: self.rom_offset,
            rom_size: self.rom_size,
            ram_offset: self.ram_offset,
            ram_size: self.ram_size,
            io_offset: self.io_offset,
            io_size: self.io_size,
            rom_image,
        })
    }

    /// Validates region overlap and image size.
    pub fn validate(&self) -> ConfigResult<()> {
        let regions = [
            ("ROM", self.rom_offset, self.rom_size),
            ("RAM", self.ram_offset, self.ram_size),
            ("IO", self.io_offset, self.io_size),
        ];
        for (name, offset, size) in regions {
            if offset.checked_add(size).is_none() {
                return Err(ConfigError::Validation(format!(
                    "{name} region at {offset:#x} overflows the address space"
                )));
            }
        }
        for (i, &(a, a_off, a_size)) in regions.iter().enumerate() {
            for &(b, b_off, b_size) in &regions[i + 1..] {
                if a_size > 0 && b_size > 0 && a_off < b_off + b_size && b_off < a_off + a_size {
                    return Err(ConfigError::Validation(format!(
                        "{a} and {b} regions overlap"
                    )));
                }
            }
        }
        if let Some(image) = &self.rom_image {
            let len = image.to_bytes()?.len() as u64;
            if len > self.rom_size {
                return Err(ConfigError::Validation(format!(
                    "ROM image of {len} bytes exceeds the ROM size of {} bytes",
                    self.rom_size
                )));
            }
        }
        Ok(())
    }
}

/// Where the layout to simulate comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayoutSource {
    /// A layout file, relative paths resolved against the config file
    Path(PathBuf),
    /// The layout document itself
    Inline(Box<CpuLayout>),
}

/// Complete simulation configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Global simulation parameters
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Memory geometry defaults
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Layout to load
    #[serde(default)]
    pub layout: Option<LayoutSource>,

    /// File this was loaded from; relative layout paths resolve against
    /// its directory
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl SimConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_yaml(&content)?.located_at(path.as_ref()))
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_json(&content)?.located_at(path.as_ref()))
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    fn located_at(mut self, path: &Path) -> Self {
        self.source_path = Some(path.to_path_buf());
        self
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.simulation.max_ticks == 0 {
            return Err(ConfigError::Validation(
                "max_ticks must be greater than zero".to_string(),
            ));
        }
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.simulation.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown log level: {}",
                self.simulation.log_level
            )));
        }
        self.memory.validate()?;
        if let Some(LayoutSource::Inline(layout)) = &self.layout {
            layout.validate()?;
        }
        Ok(())
    }

    /// Loads the configured layout, if any.
    pub fn load_layout(&self) -> ConfigResult<Option<CpuLayout>> {
        match &self.layout {
            None => Ok(None),
            Some(LayoutSource::Inline(layout)) => Ok(Some(layout.as_ref().clone())),
            Some(LayoutSource::Path(path)) => {
                let dir = self.source_path.as_deref().and_then(Path::parent);
                let path = match dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                Ok(Some(CpuLayout::from_file(path)?))
            }
        }
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tick limit for free runs.
    pub fn max_ticks(mut self, ticks: Tick) -> Self {
        self.config.simulation.max_ticks = ticks;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Enables statistics collection.
    pub fn collect_stats(mut self, enable: bool) -> Self {
        self.config.simulation.collect_stats = enable;
        self
    }

    /// Enables strict compilation.
    pub fn strict(mut self, enable: bool) -> Self {
        self.config.simulation.strict = enable;
        self
    }

    /// Sets the memory geometry.
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    /// Sets the ROM image loaded into every `mem` component.
    pub fn rom_image(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.config.memory.rom_image = Some(RomImage::Bytes(image.into()));
        self
    }

    /// Embeds a layout.
    pub fn layout(mut self, layout: CpuLayout) -> Self {
        self.config.layout = Some(LayoutSource::Inline(Box::new(layout)));
        self
    }

    /// Points at a layout file.
    pub fn layout_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.layout = Some(LayoutSource::Path(path.into()));
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Comp;

    #[test]
    fn test_default_config() {
        let config = SimConfig::new();
        assert_eq!(config.simulation.max_ticks, 1000);
        assert_eq!(config.simulation.log_level, "info");
        assert!(!config.simulation.strict);
        assert_eq!(config.memory.ram_offset, 0x1000);
        assert!(config.layout.is_none());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
simulation:
  max_ticks: 64
  log_level: debug
  strict: true

memory:
  rom_size: 256
  ram_offset: 256
  ram_size: 256
  rom_image: "01 02 0a ff"

layout:
  comps:
    - id: c0
      def_id: const
"#;

        let config = SimConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.simulation.max_ticks, 64);
        assert!(config.simulation.strict);
        assert_eq!(config.memory.rom_size, 256);
        assert_eq!(
            config.memory.to_defaults().unwrap().rom_image,
            Some(vec![0x01, 0x02, 0x0a, 0xff])
        );
        let layout = config.load_layout().unwrap().unwrap();
        assert_eq!(layout.comps.len(), 1);
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "simulation": { "max_ticks": 10 },
            "memory": { "rom_image": [1, 2, 3] },
            "layout": "cpu.json"
        }"#;

        let config = SimConfig::from_json(json).unwrap();
        assert_eq!(config.simulation.max_ticks, 10);
        assert_eq!(config.memory.rom_image, Some(RomImage::Bytes(vec![1, 2, 3])));
        assert_eq!(config.layout, Some(LayoutSource::Path(PathBuf::from("cpu.json"))));
    }

    #[test]
    fn test_builder() {
        let config = SimConfigBuilder::new()
            .max_ticks(20)
            .strict(true)
            .rom_image(vec![0xaa; 4])
            .layout(CpuLayout::new().with_comp(Comp::new("c0", "const")))
            .build()
            .unwrap();

        assert_eq!(config.simulation.max_ticks, 20);
        assert!(config.simulation.strict);
        assert!(matches!(config.layout, Some(LayoutSource::Inline(_))));
    }

    #[test]
    fn test_validation_overlapping_regions() {
        let yaml = r#"
memory:
  rom_offset: 0
  rom_size: 4096
  ram_offset: 2048
  ram_size: 4096
"#;
        assert!(matches!(
            SimConfig::from_yaml(yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validation_oversized_image() {
        let result = SimConfigBuilder::new()
            .memory(MemoryConfig {
                rom_size: 2,
                ..MemoryConfig::default()
            })
            .rom_image(vec![0; 3])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_bad_hex_and_level() {
        assert!(SimConfig::from_yaml("memory:\n  rom_image: \"zz\"\n").is_err());
        assert!(SimConfig::from_yaml("simulation:\n  log_level: loud\n").is_err());
        assert!(SimConfig::from_yaml("simulation:\n  max_ticks: 0\n").is_err());
    }

    #[test]
    fn test_layout_path_relative_to_config() {
        let dir = std::env::temp_dir().join(format!("gatework_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        CpuLayout::new()
            .with_comp(Comp::new("c0", "const"))
            .to_file(dir.join("circuit.yaml"))
            .unwrap();
        let config_path = dir.join("sim.yaml");
        std::fs::write(&config_path, "layout: circuit.yaml\n").unwrap();

        let config = SimConfig::from_file(&config_path).unwrap();
        assert_eq!(config.source_path.as_deref(), Some(config_path.as_path()));
        let layout = config.load_layout().unwrap().unwrap();
        assert!(layout.find_comp("c0").is_some());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unknown_format() {
        assert!(matches!(
            SimConfig::from_file("sim.toml"),
            Err(ConfigError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = SimConfigBuilder::new()
            .max_ticks(7)
            .collect_stats(true)
            .build()
            .unwrap();

        let yaml = config.to_yaml().unwrap();
        let restored = SimConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config, restored);
    }
}
