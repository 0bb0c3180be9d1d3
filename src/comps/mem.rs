//! Memory-mapped ROM/RAM/IO component.
//!
//! Reads are combinational: while `re` is set the word at `addr` is driven on
//! `rdata`, otherwise `rdata` releases its net so several memories can share
//! a data bus. Writes commit at the clock edge.

use serde::{Deserialize, Serialize};

use crate::component::{CompData, ExePhase, PhaseCtx, PhaseFault};
use crate::layout::{CompArgs, CompPort, PortDir};
use crate::library::{CompBuild, CompLibrary};
use crate::memory::MemoryMap;
use crate::types::DEFAULT_WIDTH;

use super::defs;

pub const MEM_ADDR: usize = 0;
pub const MEM_WDATA: usize = 1;
pub const MEM_WE: usize = 2;
pub const MEM_RE: usize = 3;
pub const MEM_RDATA: usize = 4;

/// Geometry used by `mem` components that do not specify their own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDefaults {
    pub rom_offset: u64,
    pub rom_size: u64,
    pub ram_offset: u64,
    pub ram_size: u64,
    pub io_offset: u64,
    pub io_size: u64,
    /// Loaded into every ROM region at build and reset time
    pub rom_image: Option<Vec<u8>>,
}

impl Default for MemoryDefaults {
    fn default() -> Self {
        Self {
            rom_offset: 0,
            rom_size: 0x1000,
            ram_offset: 0x1000,
            ram_size: 0x1000,
            io_offset: 0xff00,
            io_size: 0x100,
            rom_image: None,
        }
    }
}

pub(crate) fn register(library: &mut CompLibrary, defaults: MemoryDefaults) {
    library.register(defs::MEM, move |args: &CompArgs| build_mem(args, &defaults));
}

/// Args: `width` (default 32, access size is `ceil(width / 8)` bytes),
/// `rom_offset`, `rom_size`, `ram_offset`, `ram_size`, `io_offset`,
/// `io_size`, and `rom` (byte list or hex string).
fn build_mem(args: &CompArgs, defaults: &MemoryDefaults) -> CompBuild {
    let width = args.width_or("width", DEFAULT_WIDTH);
    let addr_width = args.width_or("addr_width", DEFAULT_WIDTH);

    let mut map = MemoryMap::new(
        args.u64_or("rom_offset", defaults.rom_offset),
        args.u64_or("rom_size", defaults.rom_size) as usize,
        args.u64_or("ram_offset", defaults.ram_offset),
        args.u64_or("ram_size", defaults.ram_size) as usize,
    )
    .with_io(
        args.u64_or("io_offset", defaults.io_offset),
        args.u64_or("io_size", defaults.io_size),
    );

    // A rejected image leaves the ROM zeroed; the map is still usable.
    let mut errors = Vec::new();
    let image = args.get_bytes("rom").or_else(|| defaults.rom_image.clone());
    if let Some(image) = image {
        if let Err(e) = map.load_rom(&image) {
            errors.push(format!("rom image rejected: {e}"));
        }
    }

    CompBuild {
        ports: vec![
            CompPort::new("addr", PortDir::IN | PortDir::ADDR).with_width(addr_width),
            CompPort::new("wdata", PortDir::IN | PortDir::DATA).with_width(width),
            CompPort::new("we", PortDir::IN | PortDir::CTRL).with_width(1),
            CompPort::new("re", PortDir::IN | PortDir::CTRL).with_width(1),
            CompPort::new("rdata", PortDir::OUT_TRI | PortDir::DATA).with_width(width),
        ],
        phases: vec![
            ExePhase::new(vec![MEM_ADDR, MEM_RE], vec![MEM_RDATA], read_mem),
            ExePhase::latch(vec![MEM_ADDR, MEM_WDATA, MEM_WE], write_mem),
        ],
        errors,
        data: CompData::Memory(map),
    }
}

fn access_len(ctx: &PhaseCtx<'_>, port: usize) -> usize {
    ctx.width(port).div_ceil(8).clamp(1, 8) as usize
}

fn read_mem(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    if ctx.get(MEM_RE) == 0 {
        ctx.set_enabled(MEM_RDATA, false);
        return Ok(());
    }
    let addr = ctx.get(MEM_ADDR);
    let len = access_len(ctx, MEM_RDATA);
    let value = ctx.data.as_memory_mut()?.read(addr, len)?;
    ctx.set_enabled(MEM_RDATA, true);
    ctx.set(MEM_RDATA, value);
    Ok(())
}

fn write_mem(ctx: &mut PhaseCtx<'_>) -> Result<(), PhaseFault> {
    if ctx.get(MEM_WE) == 0 {
        return Ok(());
    }
    let (addr, value) = (ctx.get(MEM_ADDR), ctx.get(MEM_WDATA));
    let len = access_len(ctx, MEM_WDATA);
    ctx.data.as_memory_mut()?.write(addr, len, value)?;
    Ok(())
}
