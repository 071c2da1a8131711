//! UART Loop - banked register control for 16C750-class UARTs
//!
//! # Purpose
//! Drives a UART block whose logical register set is larger than its
//! physical register file. Several registers share one offset and are
//! selected by the current line-control (LCR) value. This crate keeps a
//! shadow of LCR so every banked access can select its bank and put the
//! selector back afterwards.
//!
//! # Integration Points
//! - Depends on: `uart-mmio` (raw 16-bit register access and mapping)
//! - Provides to: the character-device and attribute shell around it
//! - Test doubles: `uart-sim`
//!
//! # Architecture
//! - [`registers`]: logical register map and bit patterns
//! - [`BankedRegisters`]: translator from logical to physical accesses
//! - [`bringup`]: reset, configuration, and loopback self-test
//! - [`UartLoopDevice`]: byte-stream facade and device lifecycle
//! - [`attr`]: text form of the loopback attribute
//!
//! I/O is polled. There is no interrupt path and no baud-rate negotiation.
//!
//! # Testing Strategy
//! - Unit tests: exact raw-access traces against the `uart-sim` model
//! - Integration tests: stream round-trips, truncation, and concurrent access

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

pub mod attr;
mod banked;
pub mod bringup;
mod config;
mod device;
mod error;
pub mod registers;

pub use banked::BankedRegisters;
pub use bringup::{BringUpReport, CancelToken, PollLimit, SelfTestPolicy};
pub use config::{
    BringUpConfig, UartLoopConfig, DEFAULT_BPS_RATE, DEFAULT_DIVISOR, DEFAULT_SELECTOR, DEVICE_NAME, DRIVER_NAME,
    SELF_TEST_BYTE, UART2_BASE, UART2_SIZE,
};
pub use device::{StreamRead, UartLoopDevice};
pub use error::{Result, UartError, WaitPoint};
pub use registers::{Bank, LogicalRegister};
