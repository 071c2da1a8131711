//! Simulated 16C750 UART block for host testing
//!
//! # WARNING: This is NOT hardware!
//!
//! A register-level model standing in for the memory-mapped UART so the
//! banked register translator, bring-up sequence, and stream device can be
//! exercised on the host. The model records every raw access so tests can
//! assert exact register traces.
//!
//! ## Pieces
//! - [`Uart16c750`]: the register file itself; implements `RegisterIo` directly
//! - [`SimUart`]: shared handle to one model, cloneable across threads
//! - [`SimBus`]: `MmioBus` that hands out [`SimMapping`]s over a [`SimUart`]

mod fifo;
mod model;

pub use fifo::{Fifo, Overrun};
pub use model::{Access, Echo, RegisterMode, ResetBehavior, Uart16c750, REGISTER_SPACE, RX_FIFO_DEPTH};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uart_mmio::{check_access, MmioBus, MmioError, RegisterIo, Result};

/// Shared handle to a simulated UART block
#[derive(Clone)]
pub struct SimUart {
    inner: Arc<Mutex<Uart16c750>>,
}

impl SimUart {
    pub fn new(model: Uart16c750) -> Self {
        Self {
            inner: Arc::new(Mutex::new(model)),
        }
    }

    /// Lock the model for inspection or fault setup
    pub fn lock(&self) -> MutexGuard<'_, Uart16c750> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimUart {
    fn default() -> Self {
        Self::new(Uart16c750::new())
    }
}

/// Each raw access takes the model lock on its own; sequences of accesses
/// from different handles may interleave.
impl RegisterIo for SimUart {
    fn read_raw(&mut self, offset: u32) -> Result<u16> {
        self.lock().read_raw(offset)
    }

    fn write_raw(&mut self, offset: u32, value: u16) -> Result<()> {
        self.lock().write_raw(offset, value)
    }
}

/// Mapper over a simulated block
///
/// Accepts one live mapping at a time covering `window_base..window_base + window_size`.
pub struct SimBus {
    uart: SimUart,
    window_base: usize,
    window_size: usize,
    refuse_map: bool,
}

impl SimBus {
    pub fn new(uart: SimUart, window_base: usize, window_size: usize) -> Self {
        Self {
            uart,
            window_base,
            window_size,
            refuse_map: false,
        }
    }

    /// Make every `map` call fail, as when the range cannot be remapped
    pub fn refuse_map(mut self) -> Self {
        self.refuse_map = true;
        self
    }

    pub fn uart(&self) -> &SimUart {
        &self.uart
    }
}

impl MmioBus for SimBus {
    type Mapping = SimMapping;

    fn map(&mut self, paddr: usize, size: usize) -> Result<SimMapping> {
        let window_end = self.window_base.checked_add(self.window_size);
        let in_window = match (paddr.checked_add(size), window_end) {
            (Some(end), Some(window_end)) => paddr >= self.window_base && end <= window_end && size > 0,
            _ => false,
        };
        if self.refuse_map || !in_window {
            return Err(MmioError::OutOfWindow { paddr, size });
        }

        let mut model = self.uart.lock();
        if model.is_mapped() {
            return Err(MmioError::AlreadyMapped { paddr });
        }
        model.set_mapped(true);
        drop(model);

        Ok(SimMapping {
            uart: self.uart.clone(),
            paddr,
            size: size.min(REGISTER_SPACE),
        })
    }

    fn unmap(&mut self, mapping: SimMapping) -> Result<()> {
        let mut model = mapping.uart.lock();
        if !model.is_mapped() {
            return Err(MmioError::NotMapped { paddr: mapping.paddr });
        }
        model.set_mapped(false);
        Ok(())
    }
}

/// Mapping handle produced by [`SimBus`]
pub struct SimMapping {
    uart: SimUart,
    paddr: usize,
    size: usize,
}

impl SimMapping {
    pub fn paddr(&self) -> usize {
        self.paddr
    }
}

impl RegisterIo for SimMapping {
    fn read_raw(&mut self, offset: u32) -> Result<u16> {
        check_access(offset, self.size)?;
        self.uart.read_raw(offset)
    }

    fn write_raw(&mut self, offset: u32, value: u16) -> Result<()> {
        check_access(offset, self.size)?;
        self.uart.write_raw(offset, value)
    }
}
