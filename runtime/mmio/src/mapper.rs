//! MMIO Mapping - device window management
//!
//! This module hands out register mappings from a device window that the
//! platform has already mapped uncached into the current address space
//! (a linear physical-to-virtual window, as set up by the boot code or by
//! an `ioremap`-style call in the surrounding shell).
//!
//! Each mapping is tracked at page granularity so overlapping requests and
//! double releases are rejected.

use alloc::vec::Vec;
use core::ptr::{read_volatile, write_volatile};

use crate::{check_access, MmioBus, MmioError, RegisterIo, Result};

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Window mapper - resolves physical ranges inside a pre-mapped device window
pub struct WindowMapper {
    /// Physical address where the window starts
    phys_base: usize,

    /// Virtual address the window is mapped at
    virt_base: usize,

    /// Size of the window in bytes
    window_size: usize,

    /// Live mappings as page-aligned (paddr, size) pairs
    mapped: Vec<(usize, usize)>,
}

impl WindowMapper {
    /// Create a new window mapper
    ///
    /// # Arguments
    /// * `phys_base` - Physical base of the device window (page aligned)
    /// * `virt_base` - Virtual address where `phys_base` is mapped
    /// * `window_size` - Size of the window in bytes
    ///
    /// # Safety
    /// `virt_base..virt_base + window_size` must be mapped, device memory
    /// (or ordinary memory standing in for it) that stays valid for the
    /// lifetime of every mapping handed out by this mapper.
    pub unsafe fn new(phys_base: usize, virt_base: usize, window_size: usize) -> Self {
        Self {
            phys_base,
            virt_base,
            window_size,
            mapped: Vec::new(),
        }
    }

    /// Number of live mappings
    pub fn mapped_count(&self) -> usize {
        self.mapped.len()
    }

    /// Bytes of the window not covered by a live mapping
    pub fn available_space(&self) -> usize {
        self.window_size - self.mapped.iter().map(|&(_, size)| size).sum::<usize>()
    }
}

impl MmioBus for WindowMapper {
    type Mapping = MappedRegion;

    fn map(&mut self, paddr: usize, size: usize) -> Result<MappedRegion> {
        let out_of_window = MmioError::OutOfWindow { paddr, size };

        // Widen to whole pages; any overflow lies outside every window
        let start_offset = paddr % PAGE_SIZE;
        let aligned_paddr = align_down(paddr);
        let aligned_size = size
            .checked_add(start_offset)
            .and_then(align_up)
            .ok_or(out_of_window)?;
        let aligned_end = aligned_paddr.checked_add(aligned_size).ok_or(out_of_window)?;
        let window_end = self.phys_base.checked_add(self.window_size).ok_or(out_of_window)?;

        if size == 0 || aligned_paddr < self.phys_base || aligned_end > window_end {
            return Err(out_of_window);
        }

        let overlaps = self
            .mapped
            .iter()
            .any(|&(base, len)| aligned_paddr < base + len && base < aligned_end);
        if overlaps {
            return Err(MmioError::AlreadyMapped { paddr });
        }

        self.mapped.push((aligned_paddr, aligned_size));

        let vaddr = self.virt_base + (aligned_paddr - self.phys_base) + start_offset;
        log::debug!(
            "mmio: mapped {:#x}+{:#x} at {:#x} ({} pages)",
            paddr,
            size,
            vaddr,
            pages_needed(aligned_size)
        );

        Ok(MappedRegion { vaddr, paddr, size })
    }

    fn unmap(&mut self, region: MappedRegion) -> Result<()> {
        let aligned_paddr = align_down(region.paddr);
        let index = self
            .mapped
            .iter()
            .position(|&(base, _)| base == aligned_paddr)
            .ok_or(MmioError::NotMapped { paddr: region.paddr })?;

        self.mapped.swap_remove(index);
        log::debug!("mmio: unmapped {:#x}", region.paddr);
        Ok(())
    }
}

/// Memory-mapped register region
///
/// Accesses are 16-bit volatile loads and stores at `vaddr + offset`.
#[derive(Debug)]
pub struct MappedRegion {
    /// Virtual address where region is mapped
    vaddr: usize,

    /// Physical address of the region
    paddr: usize,

    /// Size in bytes
    size: usize,
}

impl MappedRegion {
    /// Virtual address of the first register
    pub fn vaddr(&self) -> usize {
        self.vaddr
    }

    /// Physical address of the first register
    pub fn paddr(&self) -> usize {
        self.paddr
    }

    /// Size of the region in bytes
    pub fn size(&self) -> usize {
        self.size
    }
}

impl RegisterIo for MappedRegion {
    fn read_raw(&mut self, offset: u32) -> Result<u16> {
        check_access(offset, self.size)?;
        // SAFETY: the window mapper's contract keeps the region mapped and the
        // access was bounds and alignment checked above.
        Ok(unsafe { read_volatile((self.vaddr + offset as usize) as *const u16) })
    }

    fn write_raw(&mut self, offset: u32, value: u16) -> Result<()> {
        check_access(offset, self.size)?;
        // SAFETY: see `read_raw`.
        unsafe { write_volatile((self.vaddr + offset as usize) as *mut u16, value) };
        Ok(())
    }
}

// The region is a plain address range; exclusive access is enforced by
// ownership of the handle.
unsafe impl Send for MappedRegion {}

/// Pages covering `size` bytes
pub fn pages_needed(size: usize) -> usize {
    size.div_ceil(PAGE_SIZE)
}

/// Round `addr` down to its page
pub fn align_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Round `addr` up to a page boundary, or `None` past the end of the address space
pub fn align_up(addr: usize) -> Option<usize> {
    addr.checked_add(PAGE_SIZE - 1).map(align_down)
}
