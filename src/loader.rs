//! Raw program image loading.
//!
//! Programs are flat little-endian word images copied into WRAM through the
//! memory collaborator's zero-copy mapping; kernels load the same way into
//! ROM. The entry point is a byte address, converted to the word-addressed
//! PC here at the boundary. ELF is handled by an external loader that
//! supplies the same byte image and entry point.

use std::path::Path;

use thiserror::Error;

use crate::device::memory::{Memory, MemoryError, ROM_BEGIN, WRAM_BEGIN};
use crate::interpreter::Core;

/// Program loading failure.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The image does not fit into the target region.
    #[error("image of {size} bytes does not fit into {capacity} bytes of memory")]
    TooBig {
        /// Image size in bytes.
        size: usize,
        /// Region capacity in bytes.
        capacity: usize,
    },

    /// The target region is not mapped.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Reading the image file failed.
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Copy a program image into WRAM and point PC at `entry_point` (a byte
/// address; PC is word-addressed).
pub fn load_raw_program<M: Memory>(
    core: &mut Core<M>,
    image: &[u8],
    entry_point: u64,
) -> Result<(), LoadError> {
    let wram = core.memory_mut().map(WRAM_BEGIN)?;
    if image.len() > wram.len() {
        return Err(LoadError::TooBig { size: image.len(), capacity: wram.len() });
    }

    wram[..image.len()].copy_from_slice(image);
    core.registers_mut().pc = (entry_point / 4) as u32;

    log::debug!(
        "loaded {} byte program image, entry at word {:#X}",
        image.len(),
        core.registers().pc
    );
    Ok(())
}

/// Load a program image from a file.
pub fn load_raw_program_file<M: Memory>(
    core: &mut Core<M>,
    path: impl AsRef<Path>,
    entry_point: u64,
) -> Result<(), LoadError> {
    let image = std::fs::read(path)?;
    load_raw_program(core, &image, entry_point)
}

/// Copy a kernel image into ROM.
pub fn load_kernel<M: Memory>(core: &mut Core<M>, image: &[u8]) -> Result<(), LoadError> {
    let rom = core.memory_mut().map(ROM_BEGIN)?;
    if image.len() > rom.len() {
        return Err(LoadError::TooBig { size: image.len(), capacity: rom.len() });
    }

    rom[..image.len()].copy_from_slice(image);
    log::debug!("loaded {} byte kernel image", image.len());
    Ok(())
}
