//! Physical Register Interface - 16-bit MMIO access for UART register blocks
//!
//! # Purpose
//! Abstracts the memory-mapped hardware surface of a register block behind
//! two traits:
//! - [`MmioBus`]: maps and unmaps a physical device range
//! - [`RegisterIo`]: reads and writes 16-bit values at byte offsets within a mapping
//!
//! # Integration Points
//! - Provides to: `uart-loop` (banked register translator, device facade)
//! - Test doubles: `uart-sim` implements both traits over a register model
//!
//! # Architecture
//! A mapping handle is owned by value. `MmioBus::unmap` consumes it, so no
//! register access can outlive the mapping it was issued through.

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

mod mapper;

pub use mapper::{align_down, align_up, pages_needed, MappedRegion, WindowMapper, PAGE_SIZE};

use thiserror::Error;

/// Error types for physical register access and mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MmioError {
    #[error("Physical range {paddr:#x}+{size:#x} is outside the device window")]
    OutOfWindow { paddr: usize, size: usize },

    #[error("Physical range at {paddr:#x} overlaps an existing mapping")]
    AlreadyMapped { paddr: usize },

    #[error("No mapping at {paddr:#x}")]
    NotMapped { paddr: usize },

    #[error("Register offset {offset:#x} outside mapping of {size:#x} bytes")]
    OutOfRange { offset: u32, size: usize },

    #[error("Register offset {offset:#x} is not 16-bit aligned")]
    Misaligned { offset: u32 },

    #[error("Bus fault at offset {offset:#x}")]
    BusFault { offset: u32 },
}

pub type Result<T> = core::result::Result<T, MmioError>;

/// 16-bit register access within one mapped region
///
/// Offsets are byte offsets from the start of the mapping. Reads take
/// `&mut self` because device reads have side effects (FIFO pops, status
/// clears).
pub trait RegisterIo {
    /// Read a 16-bit value at byte offset `offset`
    fn read_raw(&mut self, offset: u32) -> Result<u16>;

    /// Write a 16-bit value at byte offset `offset`
    fn write_raw(&mut self, offset: u32, value: u16) -> Result<()>;
}

impl<R: RegisterIo + ?Sized> RegisterIo for &mut R {
    fn read_raw(&mut self, offset: u32) -> Result<u16> {
        (**self).read_raw(offset)
    }

    fn write_raw(&mut self, offset: u32, value: u16) -> Result<()> {
        (**self).write_raw(offset, value)
    }
}

/// Device address mapper
///
/// # Errors
/// `map` fails when the range cannot be reached or is already mapped;
/// `unmap` fails when the handle was not produced by this mapper.
pub trait MmioBus {
    /// Handle through which the mapped registers are accessed
    type Mapping: RegisterIo;

    /// Map `size` bytes of device memory at physical address `paddr`
    fn map(&mut self, paddr: usize, size: usize) -> Result<Self::Mapping>;

    /// Release a mapping previously returned by [`MmioBus::map`]
    fn unmap(&mut self, mapping: Self::Mapping) -> Result<()>;
}

/// Check a 16-bit access at `offset` against a mapping of `size` bytes
pub fn check_access(offset: u32, size: usize) -> Result<()> {
    if offset % 2 != 0 {
        return Err(MmioError::Misaligned { offset });
    }
    if offset as usize + 2 > size {
        return Err(MmioError::OutOfRange { offset, size });
    }
    Ok(())
}
