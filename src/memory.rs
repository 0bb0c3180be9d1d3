//! Flat address-space view backing memory-mapped components.
//!
//! A [`MemoryMap`] splits the address space into ROM, RAM and IO regions,
//! each with an offset and a size. Accesses are translated into the owning
//! region's byte store; an access that falls outside every region, or that
//! straddles a region boundary, is an error rather than a silent wrap.
//!
//! The map is plain data. It is owned by the component that models memory and
//! is only touched from that component's phases.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Word;

/// Errors raised by memory accesses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {addr:#x} (+{len} bytes) is outside every mapped region")]
    OutOfRange { addr: u64, len: usize },

    #[error("write to read-only {region} region at {addr:#x}")]
    ReadOnly { region: Region, addr: u64 },

    #[error("unsupported access size of {0} bytes")]
    BadAccessSize(usize),

    #[error("image of {len} bytes does not fit the {region} region of {size} bytes")]
    ImageTooLarge { region: Region, len: usize, size: usize },
}

/// A mapped region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Rom,
    Ram,
    Io,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Region::Rom => "ROM",
            Region::Ram => "RAM",
            Region::Io => "IO",
        };
        f.write_str(name)
    }
}

/// ROM, RAM and IO regions with their backing bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMap {
    pub rom_offset: u64,
    pub ram_offset: u64,
    pub io_offset: u64,
    pub io_size: u64,

    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub io: Vec<u8>,
}

impl MemoryMap {
    /// Creates a zero-filled map.
    pub fn new(rom_offset: u64, rom_size: usize, ram_offset: u64, ram_size: usize) -> Self {
        Self {
            rom_offset,
            ram_offset,
            io_offset: 0,
            io_size: 0,
            rom: vec![0; rom_size],
            ram: vec![0; ram_size],
            io: Vec::new(),
        }
    }

    /// Adds an IO region.
    pub fn with_io(mut self, io_offset: u64, io_size: u64) -> Self {
        self.io_offset = io_offset;
        self.io_size = io_size;
        self.io = vec![0; io_size as usize];
        self
    }

    /// Copies `image` to the start of the ROM region.
    pub fn load_rom(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        load_into(&mut self.rom, image, Region::Rom)
    }

    /// Copies `image` to the start of the RAM region.
    pub fn load_ram(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        load_into(&mut self.ram, image, Region::Ram)
    }

    /// Zeroes RAM and IO. ROM is untouched.
    pub fn clear_volatile(&mut self) {
        self.ram.fill(0);
        self.io.fill(0);
    }

    fn regions(&self) -> [(Region, u64, usize); 3] {
        [
            (Region::Rom, self.rom_offset, self.rom.len()),
            (Region::Ram, self.ram_offset, self.ram.len()),
            (Region::Io, self.io_offset, self.io.len()),
        ]
    }

    /// Translates an access of `len` bytes at `addr` to a region and an offset into it.
    pub fn translate(&self, addr: u64, len: usize) -> Result<(Region, usize), MemoryError> {
        for (region, offset, size) in self.regions() {
            if size == 0 || addr < offset {
                continue;
            }
            let rel = addr - offset;
            if rel.checked_add(len as u64).is_some_and(|end| end <= size as u64) {
                return Ok((region, rel as usize));
            }
        }
        Err(MemoryError::OutOfRange { addr, len })
    }

    fn store(&self, region: Region) -> &[u8] {
        match region {
            Region::Rom => &self.rom,
            Region::Ram => &self.ram,
            Region::Io => &self.io,
        }
    }

    fn store_mut(&mut self, region: Region) -> &mut [u8] {
        match region {
            Region::Rom => &mut self.rom,
            Region::Ram => &mut self.ram,
            Region::Io => &mut self.io,
        }
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8, MemoryError> {
        let (region, rel) = self.translate(addr, 1)?;
        Ok(self.store(region)[rel])
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> Result<(), MemoryError> {
        self.write(addr, 1, Word::from(value))
    }

    /// Reads a little-endian value of `len` bytes (1 to 8).
    pub fn read(&self, addr: u64, len: usize) -> Result<Word, MemoryError> {
        check_len(len)?;
        let (region, rel) = self.translate(addr, len)?;
        let bytes = &self.store(region)[rel..rel + len];
        Ok(bytes
            .iter()
            .rev()
            .fold(0, |acc, &b| (acc << 8) | Word::from(b)))
    }

    /// Writes the low `len` bytes (1 to 8) of `value`, little-endian.
    pub fn write(&mut self, addr: u64, len: usize, value: Word) -> Result<(), MemoryError> {
        check_len(len)?;
        let (region, rel) = self.translate(addr, len)?;
        if region == Region::Rom {
            return Err(MemoryError::ReadOnly { region, addr });
        }
        let bytes = value.to_le_bytes();
        self.store_mut(region)[rel..rel + len].copy_from_slice(&bytes[..len]);
        Ok(())
    }
}

fn check_len(len: usize) -> Result<(), MemoryError> {
    if (1..=8).contains(&len) {
        Ok(())
    } else {
        Err(MemoryError::BadAccessSize(len))
    }
}

fn load_into(store: &mut [u8], image: &[u8], region: Region) -> Result<(), MemoryError> {
    if image.len() > store.len() {
        return Err(MemoryError::ImageTooLarge {
            region,
            len: image.len(),
            size: store.len(),
        });
    }
    store[..image.len()].copy_from_slice(image);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> MemoryMap {
        MemoryMap::new(0x0000, 0x100, 0x1000, 0x100).with_io(0x8000, 0x10)
    }

    #[test]
    fn test_translate_regions() {
        let m = map();
        assert_eq!(m.translate(0x10, 4), Ok((Region::Rom, 0x10)));
        assert_eq!(m.translate(0x1004, 4), Ok((Region::Ram, 4)));
        assert_eq!(m.translate(0x800f, 1), Ok((Region::Io, 0xf)));
    }

    #[test]
    fn test_out_of_range() {
        let m = map();
        assert_eq!(
            m.translate(0x500, 1),
            Err(MemoryError::OutOfRange { addr: 0x500, len: 1 })
        );
        // straddles the end of RAM
        assert!(m.read(0x10fe, 4).is_err());
    }

    #[test]
    fn test_word_access_little_endian() {
        let mut m = map();
        m.write(0x1000, 4, 0xdead_beef).unwrap();
        assert_eq!(m.read_u8(0x1000).unwrap(), 0xef);
        assert_eq!(m.read(0x1000, 2).unwrap(), 0xbeef);
        assert_eq!(m.read(0x1000, 4).unwrap(), 0xdead_beef);
    }

    #[test]
    fn test_rom_is_read_only() {
        let mut m = map();
        m.load_rom(&[1, 2, 3, 4]).unwrap();
        assert_eq!(m.read(0, 4).unwrap(), 0x0403_0201);
        assert_eq!(
            m.write_u8(0, 9),
            Err(MemoryError::ReadOnly { region: Region::Rom, addr: 0 })
        );
    }

    #[test]
    fn test_image_too_large() {
        let mut m = MemoryMap::new(0, 2, 0x10, 2);
        assert!(matches!(
            m.load_ram(&[0; 3]),
            Err(MemoryError::ImageTooLarge { region: Region::Ram, .. })
        ));
    }

    #[test]
    fn test_bad_access_size() {
        let m = map();
        assert_eq!(m.read(0, 0), Err(MemoryError::BadAccessSize(0)));
        assert_eq!(m.read(0, 9), Err(MemoryError::BadAccessSize(9)));
    }

    #[test]
    fn test_clear_volatile_keeps_rom() {
        let mut m = map();
        m.load_rom(&[7]).unwrap();
        m.write_u8(0x1000, 5).unwrap();
        m.clear_volatile();
        assert_eq!(m.read_u8(0).unwrap(), 7);
        assert_eq!(m.read_u8(0x1000).unwrap(), 0);
    }
}
