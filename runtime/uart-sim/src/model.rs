//! 16C750 register file model
//!
//! The model decodes every access against the live line-control value the
//! same way the hardware does:
//! - LCR == 0xBF: configuration mode B (DLL, DLH, EFR visible at 0x00/0x04/0x08)
//! - LCR bit 7 set: configuration mode A (DLL, DLH visible at 0x00/0x04)
//! - otherwise: operational mode (RHR/THR, IER, IIR/FCR)
//!
//! Offsets not covered by a mode-dependent register are decoded the same in
//! every mode. A soft reset clears the FIFOs and restarts the reset-done
//! handshake but leaves LCR and the divisor latches alone.

use std::collections::BTreeMap;

use uart_mmio::{check_access, MmioError, RegisterIo, Result};

use crate::fifo::Fifo;

/// Depth of the receive FIFO
pub const RX_FIFO_DEPTH: usize = 64;

/// Bytes of register space the model decodes
pub const REGISTER_SPACE: usize = 0x1000;

const RHR_THR: u32 = 0x000;
const IER_DLH: u32 = 0x004;
const IIR_FCR_EFR: u32 = 0x008;
const LCR: u32 = 0x00C;
const MCR: u32 = 0x010;
const LSR: u32 = 0x014;
const MSR: u32 = 0x018;
const SPR: u32 = 0x01C;
const MDR1: u32 = 0x020;
const MDR2: u32 = 0x024;
const SYSC: u32 = 0x054;
const SYSS: u32 = 0x058;
const RXFIFO_LVL: u32 = 0x064;
const TXFIFO_LVL: u32 = 0x068;
const MDR3: u32 = 0x080;

const LCR_DIVISOR_ACCESS: u16 = 0x80;
const LCR_CONFIG_MODE_B: u16 = 0xBF;
const MCR_LOOPBACK: u16 = 0x10;
const SYSC_SOFTRESET: u16 = 0x02;
const SYSS_RESETDONE: u16 = 0x01;
const FCR_CLEAR_RX: u16 = 0x02;
const IIR_NO_INTERRUPT: u16 = 0x01;
const LSR_RX_DATA: u16 = 0x01;
const LSR_OVERRUN: u16 = 0x02;
const LSR_TX_EMPTY: u16 = 0x60;

/// One successful raw register access, in issue order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read { offset: u32, value: u16 },
    Write { offset: u32, value: u16 },
}

impl Access {
    pub fn offset(&self) -> u32 {
        match *self {
            Access::Read { offset, .. } | Access::Write { offset, .. } => offset,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Access::Write { .. })
    }
}

/// Register decoding mode selected by LCR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterMode {
    Operational,
    ConfigA,
    ConfigB,
}

/// What the internal loopback path does with transmitted bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    /// Transmitted bytes arrive unchanged in the RX FIFO
    Loop,
    /// Transmitted bytes are lost
    Drop,
    /// Transmitted bytes arrive XORed with the mask
    Corrupt(u8),
}

/// How the block answers the soft-reset handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetBehavior {
    /// SYSS reads "not done" this many times before reporting done
    Polls(u32),
    /// SYSS never reports done
    Stuck,
}

/// Register-level model of one UART block
pub struct Uart16c750 {
    lcr: u16,
    dll: u16,
    dlh: u16,
    efr: u16,
    ier: u16,
    fcr: u16,
    mcr: u16,
    spr: u16,
    mdr1: u16,
    mdr2: u16,
    mdr3: u16,
    sysc: u16,
    overrun: bool,

    reset_behavior: ResetBehavior,
    reset_remaining: Option<u32>,
    echo: Echo,

    rx: Fifo<RX_FIFO_DEPTH>,
    line_out: Vec<u8>,
    other: BTreeMap<u32, u16>,

    trace: Vec<Access>,
    accesses: usize,
    fault_at: Option<usize>,
    mapped: bool,
}

impl Uart16c750 {
    /// Power-on state: reset already complete, loopback path echoes unchanged
    pub fn new() -> Self {
        Self {
            lcr: 0,
            dll: 0,
            dlh: 0,
            efr: 0,
            ier: 0,
            fcr: 0,
            mcr: 0,
            spr: 0,
            mdr1: 0x0007,
            mdr2: 0,
            mdr3: 0,
            sysc: 0,
            overrun: false,
            reset_behavior: ResetBehavior::Polls(0),
            reset_remaining: None,
            echo: Echo::Loop,
            rx: Fifo::new(),
            line_out: Vec::new(),
            other: BTreeMap::new(),
            trace: Vec::new(),
            accesses: 0,
            fault_at: None,
            mapped: false,
        }
    }

    pub fn with_reset(mut self, behavior: ResetBehavior) -> Self {
        self.reset_behavior = behavior;
        self
    }

    pub fn with_echo(mut self, echo: Echo) -> Self {
        self.echo = echo;
        self
    }

    /// Start with LCR holding `value`, as if firmware left it there
    pub fn with_selector(mut self, value: u16) -> Self {
        self.lcr = value;
        self
    }

    /// Make the `n`th raw access from now (0-based) fail with a bus fault
    pub fn fail_access_after(&mut self, n: usize) {
        self.fault_at = Some(self.accesses + n);
    }

    /// Queue bytes arriving on the receive line; returns how many fit
    pub fn inject_rx(&mut self, bytes: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in bytes {
            if self.rx.push(byte).is_err() {
                self.overrun = true;
                break;
            }
            accepted += 1;
        }
        accepted
    }

    /// Current selector (LCR) contents
    pub fn selector(&self) -> u16 {
        self.lcr
    }

    pub fn mode(&self) -> RegisterMode {
        if self.lcr == LCR_CONFIG_MODE_B {
            RegisterMode::ConfigB
        } else if self.lcr & LCR_DIVISOR_ACCESS != 0 {
            RegisterMode::ConfigA
        } else {
            RegisterMode::Operational
        }
    }

    /// Divisor latches as (DLL, DLH)
    pub fn divisor(&self) -> (u16, u16) {
        (self.dll, self.dlh)
    }

    pub fn efr(&self) -> u16 {
        self.efr
    }

    pub fn ier(&self) -> u16 {
        self.ier
    }

    pub fn mcr(&self) -> u16 {
        self.mcr
    }

    pub fn fcr(&self) -> u16 {
        self.fcr
    }

    pub fn mdr1(&self) -> u16 {
        self.mdr1
    }

    /// Bytes the RX FIFO currently holds
    pub fn rx_level(&self) -> usize {
        self.rx.len()
    }

    /// Bytes transmitted to the external line (loopback off)
    pub fn line_out(&self) -> &[u8] {
        &self.line_out
    }

    pub fn trace(&self) -> &[Access] {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<Access> {
        std::mem::take(&mut self.trace)
    }

    /// Whether a mapping of this block is currently live
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub(crate) fn set_mapped(&mut self, mapped: bool) {
        self.mapped = mapped;
    }

    fn begin_access(&mut self, offset: u32) -> Result<()> {
        check_access(offset, REGISTER_SPACE)?;

        let index = self.accesses;
        self.accesses += 1;
        if self.fault_at == Some(index) {
            self.fault_at = None;
            return Err(MmioError::BusFault { offset });
        }
        Ok(())
    }

    fn load(&mut self, offset: u32) -> u16 {
        let mode = self.mode();
        match (mode, offset) {
            (RegisterMode::ConfigA | RegisterMode::ConfigB, RHR_THR) => self.dll,
            (RegisterMode::ConfigA | RegisterMode::ConfigB, IER_DLH) => self.dlh,
            (RegisterMode::ConfigB, IIR_FCR_EFR) => self.efr,
            (_, RHR_THR) => self.rx.pop().map_or(0, u16::from),
            (_, IER_DLH) => self.ier,
            (_, IIR_FCR_EFR) => IIR_NO_INTERRUPT,
            (_, LCR) => self.lcr,
            (_, MCR) => self.mcr,
            (_, LSR) => self.line_status(),
            (_, MSR) => 0,
            (_, SPR) => self.spr,
            (_, MDR1) => self.mdr1,
            (_, MDR2) => self.mdr2,
            (_, MDR3) => self.mdr3,
            (_, SYSC) => self.sysc,
            (_, SYSS) => self.poll_reset(),
            (_, RXFIFO_LVL) => self.rx.len() as u16,
            (_, TXFIFO_LVL) => 0,
            (_, other) => self.other.get(&other).copied().unwrap_or(0),
        }
    }

    fn store(&mut self, offset: u32, value: u16) {
        let mode = self.mode();
        match (mode, offset) {
            (RegisterMode::ConfigA | RegisterMode::ConfigB, RHR_THR) => self.dll = value,
            (RegisterMode::ConfigA | RegisterMode::ConfigB, IER_DLH) => self.dlh = value,
            (RegisterMode::ConfigB, IIR_FCR_EFR) => self.efr = value,
            (_, RHR_THR) => self.transmit(value as u8),
            (_, IER_DLH) => self.ier = value,
            (_, IIR_FCR_EFR) => {
                self.fcr = value;
                if value & FCR_CLEAR_RX != 0 {
                    self.rx.clear();
                }
            }
            (_, LCR) => self.lcr = value,
            (_, MCR) => self.mcr = value,
            (_, SPR) => self.spr = value,
            (_, MDR1) => self.mdr1 = value,
            (_, MDR2) => self.mdr2 = value,
            (_, MDR3) => self.mdr3 = value,
            (_, SYSC) => {
                if value & SYSC_SOFTRESET != 0 {
                    self.soft_reset();
                }
                self.sysc = value & !SYSC_SOFTRESET;
            }
            (_, LSR | MSR | SYSS | RXFIFO_LVL | TXFIFO_LVL) => {}
            (_, other) => {
                self.other.insert(other, value);
            }
        }
    }

    fn transmit(&mut self, byte: u8) {
        if self.mcr & MCR_LOOPBACK == 0 {
            self.line_out.push(byte);
            return;
        }

        let echoed = match self.echo {
            Echo::Loop => Some(byte),
            Echo::Corrupt(mask) => Some(byte ^ mask),
            Echo::Drop => None,
        };
        if let Some(byte) = echoed {
            if self.rx.push(byte).is_err() {
                self.overrun = true;
            }
        }
    }

    fn line_status(&mut self) -> u16 {
        let mut lsr = LSR_TX_EMPTY;
        if !self.rx.is_empty() {
            lsr |= LSR_RX_DATA;
        }
        if core::mem::take(&mut self.overrun) {
            lsr |= LSR_OVERRUN;
        }
        lsr
    }

    fn soft_reset(&mut self) {
        log::debug!("uart-sim: soft reset ({:?})", self.reset_behavior);
        self.rx.clear();
        self.overrun = false;
        self.reset_remaining = Some(match self.reset_behavior {
            ResetBehavior::Polls(n) => n,
            ResetBehavior::Stuck => 1,
        });
    }

    fn poll_reset(&mut self) -> u16 {
        match self.reset_remaining {
            None => SYSS_RESETDONE,
            Some(0) => {
                self.reset_remaining = None;
                SYSS_RESETDONE
            }
            Some(n) => {
                if self.reset_behavior != ResetBehavior::Stuck {
                    self.reset_remaining = Some(n - 1);
                }
                0
            }
        }
    }
}

impl Default for Uart16c750 {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterIo for Uart16c750 {
    fn read_raw(&mut self, offset: u32) -> Result<u16> {
        self.begin_access(offset)?;
        let value = self.load(offset);
        self.trace.push(Access::Read { offset, value });
        Ok(value)
    }

    fn write_raw(&mut self, offset: u32, value: u16) -> Result<()> {
        self.begin_access(offset)?;
        self.store(offset, value);
        self.trace.push(Access::Write { offset, value });
        Ok(())
    }
}
