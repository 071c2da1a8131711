//! 16C750 logical register map
//!
//! The block exposes more registers than it has physical offsets. A logical
//! register address encodes both: `bank * 0x100 + offset`. Bank 0 registers
//! are reachable directly; bank 1 (divisor latches) needs LCR bit 7 set and
//! bank 2 (enhanced features) needs LCR loaded with 0xBF for the duration of
//! the access.

use bitflags::bitflags;
use core::fmt;
use static_assertions::{const_assert, const_assert_eq};

/// Byte offset of the line-control (selector) register
pub const SELECTOR_OFFSET: u32 = 0x00C;

/// LCR bit that exposes the divisor latches (bank 1)
pub const DIVISOR_LATCH_ENABLE: u16 = 0x0080;

/// LCR value that exposes the enhanced feature registers (bank 2)
pub const ENHANCED_BANK_KEY: u16 = 0x00BF;

/// MDR1 mode: UART 16x
pub const MDR1_MODE_UART16X: u16 = 0x0000;

/// Register bank selected through LCR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bank {
    /// No selection needed
    Default = 0,
    /// LCR | 0x80 while accessing
    DivisorLatch = 1,
    /// LCR = 0xBF while accessing
    Enhanced = 2,
}

/// A logical register address
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogicalRegister(u32);

impl LogicalRegister {
    pub const RHR: Self = Self(0x000); // Receive holding
    pub const THR: Self = Self(0x000); // Transmit holding
    pub const IER: Self = Self(0x004); // Interrupt enable
    pub const IIR: Self = Self(0x008); // Interrupt identification
    pub const FCR: Self = Self(0x008); // FIFO control
    pub const LCR: Self = Self(0x00C); // Line control (selector)
    pub const MCR: Self = Self(0x010); // Modem control
    pub const LSR: Self = Self(0x014); // Line status
    pub const MSR: Self = Self(0x018); // Modem status
    pub const SPR: Self = Self(0x01C); // Scratchpad
    pub const MDR1: Self = Self(0x020); // Mode definition 1
    pub const MDR2: Self = Self(0x024); // Mode definition 2
    pub const SYSC: Self = Self(0x054); // System configuration
    pub const SYSS: Self = Self(0x058); // System status
    pub const RXFIFO_LVL: Self = Self(0x064); // RX FIFO level
    pub const TXFIFO_LVL: Self = Self(0x068); // TX FIFO level
    pub const MDR3: Self = Self(0x080); // Mode definition 3
    pub const DLL: Self = Self(0x100); // Divisor latch low
    pub const DLH: Self = Self(0x104); // Divisor latch high
    pub const EFR: Self = Self(0x208); // Enhanced feature

    /// Wrap a raw logical address
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Bank the register lives in
    pub const fn bank(self) -> Bank {
        match (self.0 / 0x100) % 3 {
            0 => Bank::Default,
            1 => Bank::DivisorLatch,
            _ => Bank::Enhanced,
        }
    }

    /// Physical byte offset of the register
    pub const fn offset(self) -> u32 {
        self.0 % 0x100
    }

    pub const fn decode(self) -> (Bank, u32) {
        (self.bank(), self.offset())
    }

    /// Datasheet name, or `None` for addresses outside the map
    pub fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0x000 => "RHR/THR",
            0x004 => "IER",
            0x008 => "IIR/FCR",
            0x00C => "LCR",
            0x010 => "MCR",
            0x014 => "LSR",
            0x018 => "MSR",
            0x01C => "SPR",
            0x020 => "MDR1",
            0x024 => "MDR2",
            0x054 => "SYSC",
            0x058 => "SYSS",
            0x064 => "RXFIFO_LVL",
            0x068 => "TXFIFO_LVL",
            0x080 => "MDR3",
            0x100 => "DLL",
            0x104 => "DLH",
            0x208 => "EFR",
            _ => return None,
        })
    }
}

impl fmt::Debug for LogicalRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({:#05x})", name, self.0),
            None => write!(f, "LogicalRegister({:#05x})", self.0),
        }
    }
}

const_assert_eq!(LogicalRegister::LCR.offset(), SELECTOR_OFFSET);
const_assert_eq!(LogicalRegister::LCR.bank() as u8, Bank::Default as u8);
const_assert_eq!(LogicalRegister::DLL.bank() as u8, Bank::DivisorLatch as u8);
const_assert_eq!(LogicalRegister::DLH.offset(), 0x004);
const_assert_eq!(LogicalRegister::EFR.bank() as u8, Bank::Enhanced as u8);
const_assert_eq!(LogicalRegister::EFR.offset(), 0x008);
const_assert!(DIVISOR_LATCH_ENABLE & ENHANCED_BANK_KEY != 0);

bitflags! {
    /// SYSC: system configuration
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sysc: u16 {
        const AUTOIDLE = 0x0001;
        const SOFTRESET = 0x0002;
        const ENAWAKEUP = 0x0004;
    }

    /// SYSS: system status
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Syss: u16 {
        const RESETDONE = 0x0001;
    }

    /// MCR: modem control
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mcr: u16 {
        const DTR = 0x0001;
        const RTS = 0x0002;
        const OUT1 = 0x0004;
        const OUT2 = 0x0008;
        const LOOPBACK = 0x0010;
    }

    /// FCR: FIFO control
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Fcr: u16 {
        const FIFO_ENABLE = 0x0001;
        const RX_FIFO_CLEAR = 0x0002;
        const TX_FIFO_CLEAR = 0x0004;
    }

    /// LCR: line control
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lcr: u16 {
        const WORD_LENGTH_8 = 0x0003;
        const TWO_STOP_BITS = 0x0004;
        const PARITY_ENABLE = 0x0008;
        const BREAK = 0x0040;
        const DIVISOR_LATCH = DIVISOR_LATCH_ENABLE;
    }
}
