//! Bring-Up Sequencer
//!
//! Fixed reset and configuration protocol for the block, run once per
//! device lifetime from a cold hardware state:
//!
//! 1. Sync the LCR shadow with hardware
//! 2. Soft reset through SYSC, then poll SYSS until reset is done
//! 3. Program MCR, FCR, LCR (8N1, FIFOs on) and the divisor latch
//! 4. Enable the internal loopback path and select UART 16x mode
//! 5. Self-test: transmit one byte, poll the RX level, read the echo back
//!
//! The two polls are the only blocking points. Both default to unbounded
//! waits; a [`PollLimit`] or [`CancelToken`] turns them into bounded ones
//! without changing the register traffic of a successful run.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use uart_mmio::RegisterIo;

use crate::banked::BankedRegisters;
use crate::config::BringUpConfig;
use crate::error::{Result, UartError, WaitPoint};
use crate::registers::{Fcr, Lcr, LogicalRegister, Mcr, Syss, Sysc, MDR1_MODE_UART16X};

/// Upper bound on register reads at a blocking point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollLimit {
    /// Poll until the condition holds, however long that takes
    #[default]
    Unbounded,
    /// Give up with [`UartError::Timeout`] after this many reads
    Iterations(u32),
}

/// What a failed self-test echo does to bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelfTestPolicy {
    /// A mismatched echo fails bring-up with [`UartError::SelfTestMismatch`]
    #[default]
    Enforce,
    /// A mismatched echo is logged and bring-up completes
    Observe,
}

/// Shared flag that aborts a blocking point
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Observations from a completed bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUpReport {
    /// SYSS reads until reset was reported done
    pub reset_polls: u32,
    /// RX level reads until the echo arrived
    pub echo_polls: u32,
    /// MCR read back after configuration
    pub mcr: u16,
    /// Byte read back during the self-test
    pub echoed: u8,
}

impl BringUpReport {
    pub fn echo_matches(&self, expected: u8) -> bool {
        self.echoed == expected
    }
}

/// Run the bring-up protocol
///
/// # Arguments
/// * `regs` - Translator over the freshly mapped block
/// * `divisor` - Value programmed into DLH
/// * `selector` - Starting LCR value for the shadow sync
/// * `config` - Self-test byte, poll limits, cancellation, self-test policy
///
/// # Errors
/// Raw access failures, timeouts, cancellation, and (under
/// [`SelfTestPolicy::Enforce`]) a mismatched echo. The sequence stops at the
/// first failure.
pub fn run<R: RegisterIo>(
    regs: &mut BankedRegisters<R>,
    divisor: u16,
    selector: u16,
    config: &BringUpConfig,
) -> Result<BringUpReport> {
    regs.sync_selector(selector)?;

    // Soft reset
    regs.write(LogicalRegister::SYSC, Sysc::SOFTRESET.bits())?;
    let reset_polls = wait_until(regs, WaitPoint::ResetDone, LogicalRegister::SYSS, config, |syss| {
        Syss::from_bits_truncate(syss).contains(Syss::RESETDONE)
    })?;
    log::info!("uart: soft reset done after {} polls", reset_polls);

    // 8N1, FIFOs enabled and cleared, divisor
    regs.write(LogicalRegister::MCR, Mcr::LOOPBACK.bits())?;
    regs.write(
        LogicalRegister::FCR,
        (Fcr::FIFO_ENABLE | Fcr::RX_FIFO_CLEAR | Fcr::TX_FIFO_CLEAR).bits(),
    )?;
    regs.write(LogicalRegister::LCR, Lcr::WORD_LENGTH_8.bits())?;
    regs.write(LogicalRegister::DLH, divisor)?;

    // Internal loopback, UART 16x mode
    regs.write(LogicalRegister::MCR, (Mcr::LOOPBACK | Mcr::OUT1 | Mcr::RTS | Mcr::DTR).bits())?;
    regs.write(LogicalRegister::MDR1, MDR1_MODE_UART16X)?;

    let mcr = regs.read(LogicalRegister::MCR)?;
    log::info!("uart: configured, MCR = {:#06x}", mcr);

    // Loopback self-test
    let expected = config.self_test_byte;
    regs.write(LogicalRegister::THR, u16::from(expected))?;
    let echo_polls = wait_until(regs, WaitPoint::SelfTestEcho, LogicalRegister::RXFIFO_LVL, config, |level| {
        level != 0
    })?;
    let echoed = regs.read(LogicalRegister::RHR)? as u8;

    if echoed == expected {
        log::info!("uart: self-test echoed {:#04x}", echoed);
    } else {
        log::warn!("uart: self-test wrote {:#04x}, read back {:#04x}", expected, echoed);
        if config.self_test == SelfTestPolicy::Enforce {
            return Err(UartError::SelfTestMismatch { expected, actual: echoed });
        }
    }

    Ok(BringUpReport {
        reset_polls,
        echo_polls,
        mcr,
        echoed,
    })
}

/// Poll `reg` until `ready` holds, honoring the limit and cancel token for `point`
///
/// Returns the number of reads performed.
fn wait_until<R: RegisterIo>(
    regs: &mut BankedRegisters<R>,
    point: WaitPoint,
    reg: LogicalRegister,
    config: &BringUpConfig,
    ready: impl Fn(u16) -> bool,
) -> Result<u32> {
    let limit = config.poll_limit(point);
    let mut polls: u32 = 0;

    loop {
        if config.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(UartError::Cancelled { point });
        }
        if let PollLimit::Iterations(max) = limit {
            if polls >= max {
                return Err(UartError::Timeout { point, polls });
            }
        }

        let value = regs.read(reg)?;
        polls = polls.saturating_add(1);
        if ready(value) {
            return Ok(polls);
        }

        log::trace!("uart: waiting for {} ({:?} = {:#06x})", point, reg, value);
        core::hint::spin_loop();
    }
}
