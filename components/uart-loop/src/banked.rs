//! Banked Register Translator
//!
//! Turns logical register accesses into physical ones. Banked registers are
//! bracketed by a selector write before the access and a restore after it:
//!
//! ```text
//! bank 1:  LCR <- shadow | 0x80,  access(offset),  LCR <- shadow
//! bank 2:  LCR <- 0xBF,           access(offset),  LCR <- shadow
//! bank 0:                         access(offset)
//! ```
//!
//! The translator keeps a shadow of the last value written to LCR. A write
//! that targets LCR itself updates the shadow before the restore, so the
//! restore always puts back the newest value. Reads never touch the shadow.
//!
//! After every call returns `Ok`, the hardware LCR equals the shadow. The
//! translator takes `&mut self`, so a single instance cannot be driven from
//! two threads at once; the device facade adds the lock for shared use.

use uart_mmio::{RegisterIo, Result};

use crate::registers::{Bank, LogicalRegister, DIVISOR_LATCH_ENABLE, ENHANCED_BANK_KEY, SELECTOR_OFFSET};

/// Logical register access over one mapped register block
pub struct BankedRegisters<R> {
    io: R,
    shadow: u16,
}

impl<R: RegisterIo> BankedRegisters<R> {
    /// Wrap a register mapping
    ///
    /// The shadow starts at zero and is only trusted once
    /// [`sync_selector`](Self::sync_selector) has forced hardware and shadow
    /// into agreement.
    pub fn new(io: R) -> Self {
        Self { io, shadow: 0 }
    }

    /// Load `value` into both the shadow and the hardware selector
    ///
    /// The shadow is left untouched if the write fails.
    pub fn sync_selector(&mut self, value: u16) -> Result<()> {
        log::trace!("uart: LCR <- {:#06x} (sync)", value);
        self.io.write_raw(SELECTOR_OFFSET, value)?;
        self.shadow = value;
        Ok(())
    }

    /// Write `value` to a logical register
    pub fn write(&mut self, reg: LogicalRegister, value: u16) -> Result<()> {
        let (bank, offset) = reg.decode();
        log::trace!("uart: {:?} <- {:#06x}", reg, value);

        self.bracket(bank, |this| {
            this.io.write_raw(offset, value)?;
            if offset == SELECTOR_OFFSET {
                this.shadow = value;
            }
            Ok(())
        })
    }

    /// Read a logical register
    pub fn read(&mut self, reg: LogicalRegister) -> Result<u16> {
        let (bank, offset) = reg.decode();
        let value = self.bracket(bank, |this| this.io.read_raw(offset))?;
        log::trace!("uart: {:?} -> {:#06x}", reg, value);
        Ok(value)
    }

    /// Last value the translator believes LCR holds
    pub fn selector_shadow(&self) -> u16 {
        self.shadow
    }

    pub fn io(&self) -> &R {
        &self.io
    }

    /// Give back the register mapping
    pub fn into_inner(self) -> R {
        self.io
    }

    fn bracket<T>(&mut self, bank: Bank, access: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let selected = match bank {
            Bank::Default => return access(self),
            Bank::DivisorLatch => self.io.write_raw(SELECTOR_OFFSET, self.shadow | DIVISOR_LATCH_ENABLE),
            Bank::Enhanced => self.io.write_raw(SELECTOR_OFFSET, ENHANCED_BANK_KEY),
        };

        let result = selected.and_then(|()| access(self));

        // Restore even when the access failed; the bank must not stay selected.
        let restored = self.io.write_raw(SELECTOR_OFFSET, self.shadow);
        match (result, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(restore_err)) => {
                log::warn!("uart: selector restore failed after {}: {}", err, restore_err);
                Err(err)
            }
        }
    }
}
