use alloc::vec::Vec;
use core::fmt;

use thiserror::Error;
use uart_mmio::MmioError;

/// Named blocking points of the bring-up sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPoint {
    /// SYSS reset-done after the soft reset
    ResetDone,
    /// RX FIFO level during the loopback self-test
    SelfTestEcho,
}

impl fmt::Display for WaitPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPoint::ResetDone => f.write_str("soft reset completion"),
            WaitPoint::SelfTestEcho => f.write_str("self-test echo"),
        }
    }
}

/// Error types for the UART loop device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UartError {
    #[error("Failed to map UART registers: {0}")]
    Mapping(#[source] MmioError),

    #[error("Register access failed: {0}")]
    Bus(#[from] MmioError),

    /// Bytes already drained from the RX FIFO are handed back with the fault
    #[error("Stream read failed after {} bytes: {source}", .data.len())]
    PartialRead {
        data: Vec<u8>,
        #[source]
        source: MmioError,
    },

    #[error("Timed out waiting for {point} after {polls} polls")]
    Timeout { point: WaitPoint, polls: u32 },

    #[error("Cancelled while waiting for {point}")]
    Cancelled { point: WaitPoint },

    #[error("Self-test echo mismatch: wrote {expected:#04x}, read {actual:#04x}")]
    SelfTestMismatch { expected: u8, actual: u8 },

    #[error("Device not initialized")]
    NotInitialized,

    #[error("Device already initialized")]
    AlreadyInitialized,
}

pub type Result<T> = core::result::Result<T, UartError>;
