//! Byte-addressable memory subsystem.
//!
//! The interpreter core delegates every guest load, store and instruction
//! fetch to a [`Memory`] collaborator. The reference implementation,
//! [`VmMemory`], routes addresses to four regions:
//!
//! | Region      | Base           | Backing                     |
//! |-------------|----------------|-----------------------------|
//! | ROM         | `ROM_BEGIN`    | kernel image                |
//! | WRAM        | `WRAM_BEGIN`   | program image and data      |
//! | MMIO        | `MMIO_BEGIN`   | small device window         |
//! | Scratch-pad | `SPM_BEGIN`    | the core-owned buffer       |
//!
//! Region placement is memory-subsystem policy; the interpreter itself only
//! names `WRAM_BEGIN` (the program image it fetches from). The scratch-pad
//! bytes are owned by the core and passed into each access, so the routing
//! lives here while the storage lives there.
//!
//! All values are little-endian. PC is word-addressed: the byte address of
//! a PC is `pc * 4`, applied strictly at this boundary.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Start of the kernel ROM region.
pub const ROM_BEGIN: u64 = 0x0000_0000;

/// Start of working RAM; the program image the core fetches from.
pub const WRAM_BEGIN: u64 = 0x2000_0000;

/// Start of the MMIO window.
pub const MMIO_BEGIN: u64 = 0x4000_0000;

/// Start of the per-core scratch-pad region.
pub const SPM_BEGIN: u64 = 0x6000_0000;

/// Size of the MMIO window in bytes.
pub const MMIO_SIZE: usize = 0x1000;

/// Memory access failure, surfaced to the core as an error code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The address belongs to no region.
    #[error("address {0:#X} is not mapped")]
    Unmapped(u64),

    /// The access starts inside a region but runs past its end.
    #[error("access of {count} bytes at {address:#X} crosses the region end")]
    OutOfRange {
        /// Faulting byte address.
        address: u64,
        /// Requested byte count.
        count: usize,
    },
}

impl MemoryError {
    /// Error code stored on the core (non-zero stops the driver loop).
    pub fn code(&self) -> i32 {
        match self {
            MemoryError::Unmapped(_) => 1,
            MemoryError::OutOfRange { .. } => 2,
        }
    }
}

/// Offset of `addr` within the region at `base` of `len` bytes, if inside.
#[inline]
fn region_offset(addr: u64, base: u64, len: usize) -> Option<usize> {
    addr.checked_sub(base)
        .filter(|offset| *offset < len as u64)
        .map(|offset| offset as usize)
}

/// Byte-addressable memory collaborator contract.
///
/// `spm` is the calling core's scratch-pad; accesses that land in the
/// scratch-pad region are served from it.
pub trait Memory {
    /// Copy `dest.len()` bytes from `addr` into `dest`.
    fn load(&mut self, spm: &mut [u8], dest: &mut [u8], addr: u64) -> Result<(), MemoryError>;

    /// Copy `src` to `addr`.
    fn store(&mut self, spm: &mut [u8], src: &[u8], addr: u64) -> Result<(), MemoryError>;

    /// Map a byte address to the backing bytes from that address to the end
    /// of its region. Used for zero-copy program loading and for syscalls
    /// translating guest pointers.
    fn map(&mut self, addr: u64) -> Result<&mut [u8], MemoryError>;

    /// Fetch the two consecutive instruction words at a word-addressed PC.
    /// Fetches outside the program image read as zero (no-ops).
    fn fetch(&self, word_pc: u32) -> [u32; 2];
}

/// Reference memory subsystem: ROM + WRAM + a small MMIO window.
pub struct VmMemory {
    rom: Vec<u8>,
    wram: Vec<u8>,
    mmio: Vec<u8>,
}

impl VmMemory {
    /// Allocate zeroed memory with the given ROM and WRAM sizes in bytes.
    pub fn new(rom_size: usize, wram_size: usize) -> Self {
        log::debug!("memory: {rom_size} bytes ROM, {wram_size} bytes WRAM");
        Self {
            rom: vec![0; rom_size],
            wram: vec![0; wram_size],
            mmio: vec![0; MMIO_SIZE],
        }
    }

    /// WRAM capacity in bytes.
    pub fn wram_size(&self) -> usize {
        self.wram.len()
    }

    /// ROM capacity in bytes.
    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }

    /// Resolve an address to its backing region and the offset within it.
    fn locate<'a>(
        &'a mut self,
        spm: &'a mut [u8],
        addr: u64,
    ) -> Result<(&'a mut [u8], usize), MemoryError> {
        if let Some(offset) = region_offset(addr, ROM_BEGIN, self.rom.len()) {
            Ok((self.rom.as_mut_slice(), offset))
        } else if let Some(offset) = region_offset(addr, WRAM_BEGIN, self.wram.len()) {
            Ok((self.wram.as_mut_slice(), offset))
        } else if let Some(offset) = region_offset(addr, MMIO_BEGIN, self.mmio.len()) {
            Ok((self.mmio.as_mut_slice(), offset))
        } else if let Some(offset) = region_offset(addr, SPM_BEGIN, spm.len()) {
            Ok((spm, offset))
        } else {
            Err(MemoryError::Unmapped(addr))
        }
    }

    fn wram_word(&self, byte_offset: usize) -> u32 {
        if byte_offset + 4 <= self.wram.len() {
            LittleEndian::read_u32(&self.wram[byte_offset..])
        } else {
            0
        }
    }
}

impl Memory for VmMemory {
    fn load(&mut self, spm: &mut [u8], dest: &mut [u8], addr: u64) -> Result<(), MemoryError> {
        let count = dest.len();
        let (region, offset) = self.locate(spm, addr)?;
        let end = offset
            .checked_add(count)
            .filter(|end| *end <= region.len())
            .ok_or(MemoryError::OutOfRange { address: addr, count })?;
        dest.copy_from_slice(&region[offset..end]);
        Ok(())
    }

    fn store(&mut self, spm: &mut [u8], src: &[u8], addr: u64) -> Result<(), MemoryError> {
        let count = src.len();
        let (region, offset) = self.locate(spm, addr)?;
        let end = offset
            .checked_add(count)
            .filter(|end| *end <= region.len())
            .ok_or(MemoryError::OutOfRange { address: addr, count })?;
        region[offset..end].copy_from_slice(src);
        Ok(())
    }

    fn map(&mut self, addr: u64) -> Result<&mut [u8], MemoryError> {
        if let Some(offset) = region_offset(addr, ROM_BEGIN, self.rom.len()) {
            Ok(&mut self.rom[offset..])
        } else if let Some(offset) = region_offset(addr, WRAM_BEGIN, self.wram.len()) {
            Ok(&mut self.wram[offset..])
        } else if let Some(offset) = region_offset(addr, MMIO_BEGIN, self.mmio.len()) {
            Ok(&mut self.mmio[offset..])
        } else {
            Err(MemoryError::Unmapped(addr))
        }
    }

    fn fetch(&self, word_pc: u32) -> [u32; 2] {
        let base = word_pc as usize * 4;
        [self.wram_word(base), self.wram_word(base + 4)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_memory() -> VmMemory {
        VmMemory::new(0x100, 0x1000)
    }

    #[test]
    fn test_wram_round_trip() {
        let mut memory = make_memory();
        let mut spm = [0u8; 16];

        memory
            .store(&mut spm, &[1, 2, 3, 4], WRAM_BEGIN + 8)
            .expect("store in range");

        let mut out = [0u8; 4];
        memory
            .load(&mut spm, &mut out, WRAM_BEGIN + 8)
            .expect("load in range");
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_spm_routes_to_core_buffer() {
        let mut memory = make_memory();
        let mut spm = [0u8; 64];

        memory
            .store(&mut spm, &[0xAA, 0xBB], SPM_BEGIN + 2)
            .expect("store in range");
        assert_eq!(&spm[2..4], &[0xAA, 0xBB]);

        let mut out = [0u8; 2];
        memory
            .load(&mut spm, &mut out, SPM_BEGIN + 2)
            .expect("load in range");
        assert_eq!(out, [0xAA, 0xBB]);
    }

    #[test]
    fn test_mmio_window_is_backed() {
        let mut memory = make_memory();
        let mut spm = [0u8; 16];

        memory
            .store(&mut spm, &[0x42], MMIO_BEGIN)
            .expect("store in range");
        let mut out = [0u8; 1];
        memory.load(&mut spm, &mut out, MMIO_BEGIN).expect("load in range");
        assert_eq!(out, [0x42]);
    }

    #[test]
    fn test_unmapped_and_out_of_range() {
        let mut memory = make_memory();
        let mut spm = [0u8; 16];
        let mut out = [0u8; 4];

        let err = memory
            .load(&mut spm, &mut out, 0x7777_0000)
            .expect_err("no region there");
        assert!(matches!(err, MemoryError::Unmapped(0x7777_0000)));
        assert_ne!(err.code(), 0);

        // Starts inside WRAM, runs past its end
        let err = memory
            .load(&mut spm, &mut out, WRAM_BEGIN + 0xFFE)
            .expect_err("crosses the region end");
        assert!(matches!(err, MemoryError::OutOfRange { .. }));
    }

    #[test]
    fn test_map_returns_region_tail() {
        let mut memory = make_memory();

        let wram = memory.map(WRAM_BEGIN).expect("wram maps");
        assert_eq!(wram.len(), 0x1000);
        wram[0] = 0x99;

        let tail = memory.map(WRAM_BEGIN + 0x800).expect("offset maps");
        assert_eq!(tail.len(), 0x800);

        assert!(memory.map(SPM_BEGIN).is_err()); // scratch-pad is core-owned
    }

    #[test]
    fn test_fetch_reads_wram_words() {
        let mut memory = make_memory();
        let mut spm = [0u8; 16];

        memory
            .store(&mut spm, &0xDEAD_BEEFu32.to_le_bytes(), WRAM_BEGIN)
            .expect("store in range");
        memory
            .store(&mut spm, &0x1234_5678u32.to_le_bytes(), WRAM_BEGIN + 4)
            .expect("store in range");

        assert_eq!(memory.fetch(0), [0xDEAD_BEEF, 0x1234_5678]);
        assert_eq!(memory.fetch(1), [0x1234_5678, 0]);

        // Outside the image reads as no-ops
        assert_eq!(memory.fetch(0x10_0000), [0, 0]);
    }
}
