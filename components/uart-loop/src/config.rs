//! Device configuration
//!
//! Defaults describe UART2 of the board this driver was brought up on. Every
//! field can be overridden through the `with_*` builders.

use static_assertions::const_assert;

use crate::bringup::{CancelToken, PollLimit, SelfTestPolicy};
use crate::error::WaitPoint;
use crate::registers::LogicalRegister;

/// Physical base address of UART2
pub const UART2_BASE: usize = 0x4802_4000;

/// Size of the UART2 register window
pub const UART2_SIZE: usize = 4096;

/// Line rate recorded for the device
pub const DEFAULT_BPS_RATE: u64 = 115_200;

/// Misc device node name
pub const DEVICE_NAME: &str = "uart_loop";

/// Platform driver name the device binds to
pub const DRIVER_NAME: &str = "barrometer_uart2";

/// DLH value programmed during bring-up
pub const DEFAULT_DIVISOR: u16 = 0x0001;

/// LCR value the shadow starts from
pub const DEFAULT_SELECTOR: u16 = 0x0000;

/// Byte transmitted and expected back during the self-test
pub const SELF_TEST_BYTE: u8 = b'A';

// Every register, including the banked ones, must sit inside the window.
const_assert!((LogicalRegister::MDR3.offset() as usize) + 2 <= UART2_SIZE);
const_assert!((LogicalRegister::EFR.offset() as usize) + 2 <= UART2_SIZE);

/// Bring-up tuning
#[derive(Debug, Clone)]
pub struct BringUpConfig {
    /// Byte used for the loopback self-test
    pub self_test_byte: u8,
    /// Limit on SYSS polls after soft reset
    pub reset_wait: PollLimit,
    /// Limit on RX level polls during the self-test
    pub rx_wait: PollLimit,
    /// Outcome of a mismatched echo
    pub self_test: SelfTestPolicy,
    /// Aborts either wait when cancelled
    pub cancel: Option<CancelToken>,
}

impl BringUpConfig {
    pub fn with_self_test_byte(mut self, byte: u8) -> Self {
        self.self_test_byte = byte;
        self
    }

    /// Apply the same limit to both blocking points
    pub fn with_poll_limit(mut self, limit: PollLimit) -> Self {
        self.reset_wait = limit;
        self.rx_wait = limit;
        self
    }

    pub fn with_reset_wait(mut self, limit: PollLimit) -> Self {
        self.reset_wait = limit;
        self
    }

    pub fn with_rx_wait(mut self, limit: PollLimit) -> Self {
        self.rx_wait = limit;
        self
    }

    pub fn with_self_test(mut self, policy: SelfTestPolicy) -> Self {
        self.self_test = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Limit that applies at `point`
    pub fn poll_limit(&self, point: WaitPoint) -> PollLimit {
        match point {
            WaitPoint::ResetDone => self.reset_wait,
            WaitPoint::SelfTestEcho => self.rx_wait,
        }
    }
}

impl Default for BringUpConfig {
    fn default() -> Self {
        Self {
            self_test_byte: SELF_TEST_BYTE,
            reset_wait: PollLimit::Unbounded,
            rx_wait: PollLimit::Unbounded,
            self_test: SelfTestPolicy::Enforce,
            cancel: None,
        }
    }
}

/// UART loop device configuration
#[derive(Debug, Clone)]
pub struct UartLoopConfig {
    /// Physical base of the register block
    pub base: usize,
    /// Bytes to map
    pub size: usize,
    /// Line rate, recorded and logged only
    pub bps_rate: u64,
    /// Character device name
    pub device_name: &'static str,
    /// Platform driver name
    pub driver_name: &'static str,
    /// Bring-up tuning
    pub bringup: BringUpConfig,
}

impl UartLoopConfig {
    pub fn with_window(mut self, base: usize, size: usize) -> Self {
        self.base = base;
        self.size = size;
        self
    }

    pub fn with_bps_rate(mut self, bps_rate: u64) -> Self {
        self.bps_rate = bps_rate;
        self
    }

    pub fn with_bringup(mut self, bringup: BringUpConfig) -> Self {
        self.bringup = bringup;
        self
    }
}

impl Default for UartLoopConfig {
    fn default() -> Self {
        Self {
            base: UART2_BASE,
            size: UART2_SIZE,
            bps_rate: DEFAULT_BPS_RATE,
            device_name: DEVICE_NAME,
            driver_name: DRIVER_NAME,
            bringup: BringUpConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_board() {
        let config = UartLoopConfig::default();
        assert_eq!(config.base, 0x4802_4000);
        assert_eq!(config.size, 4096);
        assert_eq!(config.bps_rate, 115_200);
        assert_eq!(config.device_name, "uart_loop");
        assert_eq!(config.bringup.self_test_byte, 0x41);
        assert_eq!(config.bringup.reset_wait, PollLimit::Unbounded);
        assert_eq!(config.bringup.self_test, SelfTestPolicy::Enforce);
    }

    #[test]
    fn test_poll_limit_per_point() {
        let config = BringUpConfig::default()
            .with_reset_wait(PollLimit::Iterations(10))
            .with_rx_wait(PollLimit::Iterations(3));
        assert_eq!(config.poll_limit(WaitPoint::ResetDone), PollLimit::Iterations(10));
        assert_eq!(config.poll_limit(WaitPoint::SelfTestEcho), PollLimit::Iterations(3));

        let config = config.with_poll_limit(PollLimit::Unbounded);
        assert_eq!(config.poll_limit(WaitPoint::ResetDone), PollLimit::Unbounded);
    }
}
