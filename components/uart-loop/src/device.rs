//! Stream Device Facade
//!
//! Byte-stream access to the UART through the banked register translator.
//! One device instance owns the mapper, the register mapping, and the
//! translator. All register traffic goes through a single lock, so concurrent
//! callers never interleave inside a banked access.
//!
//! The loopback flag is operator intent only: it is stored and reported but
//! does not change how `read` and `write` drive the hardware.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;
use uart_mmio::MmioBus;

use crate::banked::BankedRegisters;
use crate::bringup::{self, BringUpReport};
use crate::config::UartLoopConfig;
use crate::error::{Result, UartError};
use crate::registers::LogicalRegister;

/// Result of a stream read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRead {
    /// Bytes drained from the RX FIFO, oldest first
    pub data: Vec<u8>,
    /// RX level reported at the start of the read
    pub available: usize,
    /// More bytes were available than requested; the rest stay queued
    pub truncated: bool,
}

struct DeviceState<B: MmioBus> {
    bus: B,
    regs: Option<BankedRegisters<B::Mapping>>,
}

/// UART loop device
pub struct UartLoopDevice<B: MmioBus> {
    config: UartLoopConfig,
    state: Mutex<DeviceState<B>>,
    loopback: AtomicBool,
}

impl<B: MmioBus> UartLoopDevice<B> {
    /// Create an uninitialized device over `bus`
    pub fn new(bus: B, config: UartLoopConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DeviceState { bus, regs: None }),
            loopback: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &UartLoopConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().regs.is_some()
    }

    /// Map the register block and run the bring-up sequence
    ///
    /// The lock is held for the whole sequence, including both polls.
    ///
    /// # Errors
    /// - `AlreadyInitialized` if a mapping is live
    /// - `Mapping` if the block cannot be mapped
    /// - any bring-up failure; the mapping is released before returning
    pub fn initialize(&self, divisor: u16, selector: u16) -> Result<BringUpReport> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.regs.is_some() {
            return Err(UartError::AlreadyInitialized);
        }

        log::info!(
            "{}: initializing {} at {:#x} ({} bytes, {} bps)",
            self.config.device_name,
            self.config.driver_name,
            self.config.base,
            self.config.size,
            self.config.bps_rate
        );

        let mapping = state
            .bus
            .map(self.config.base, self.config.size)
            .map_err(UartError::Mapping)?;
        let mut regs = BankedRegisters::new(mapping);

        match bringup::run(&mut regs, divisor, selector, &self.config.bringup) {
            Ok(report) => {
                state.regs = Some(regs);
                log::info!("{}: ready", self.config.device_name);
                Ok(report)
            }
            Err(err) => {
                log::warn!("{}: bring-up failed: {}", self.config.device_name, err);
                if let Err(unmap_err) = state.bus.unmap(regs.into_inner()) {
                    log::warn!("{}: unmap after failed bring-up: {}", self.config.device_name, unmap_err);
                }
                Err(err)
            }
        }
    }

    /// Release the register mapping
    pub fn teardown(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let regs = state.regs.take().ok_or(UartError::NotInitialized)?;

        state.bus.unmap(regs.into_inner()).map_err(UartError::Mapping)?;
        log::info!("{}: torn down", self.config.device_name);
        Ok(())
    }

    pub fn open(&self) -> Result<()> {
        self.ensure_initialized()?;
        log::debug!("{}: open", self.config.device_name);
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.ensure_initialized()?;
        log::debug!("{}: release", self.config.device_name);
        Ok(())
    }

    /// Transmit `bytes` in order, one THR write per byte
    ///
    /// Returns the number of bytes written, which is always `bytes.len()`
    /// on success.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        self.with_registers(|regs| {
            log::debug!("{}: write {} bytes", self.config.device_name, bytes.len());
            for &byte in bytes {
                regs.write(LogicalRegister::THR, u16::from(byte))?;
            }
            Ok(bytes.len())
        })
    }

    /// Drain up to `max_count` bytes from the RX FIFO
    ///
    /// Reads the RX level once and never consumes more than that snapshot.
    /// Bytes beyond `max_count` are left in the FIFO and flagged through
    /// [`StreamRead::truncated`].
    ///
    /// # Errors
    /// A register fault after at least one byte was drained returns
    /// [`UartError::PartialRead`] carrying those bytes; they are no longer
    /// in the FIFO.
    pub fn read(&self, max_count: usize) -> Result<StreamRead> {
        self.with_registers(|regs| {
            let available = usize::from(regs.read(LogicalRegister::RXFIFO_LVL)?);
            let count = available.min(max_count);

            let mut data = Vec::with_capacity(count);
            for _ in 0..count {
                match regs.read(LogicalRegister::RHR) {
                    Ok(value) => data.push(value as u8),
                    Err(source) if !data.is_empty() => {
                        log::warn!(
                            "{}: read failed after draining {} bytes: {}",
                            self.config.device_name,
                            data.len(),
                            source
                        );
                        return Err(UartError::PartialRead { data, source });
                    }
                    Err(source) => return Err(source.into()),
                }
            }

            let truncated = available > max_count;
            if truncated {
                log::warn!(
                    "{}: read truncated to {} of {} available bytes",
                    self.config.device_name,
                    max_count,
                    available
                );
            }
            log::debug!("{}: read {} bytes", self.config.device_name, data.len());

            Ok(StreamRead {
                data,
                available,
                truncated,
            })
        })
    }

    /// Write a logical register under the device lock
    pub fn write_register(&self, reg: LogicalRegister, value: u16) -> Result<()> {
        self.with_registers(|regs| Ok(regs.write(reg, value)?))
    }

    /// Read a logical register under the device lock
    pub fn read_register(&self, reg: LogicalRegister) -> Result<u16> {
        self.with_registers(|regs| Ok(regs.read(reg)?))
    }

    pub fn loopback(&self) -> bool {
        self.loopback.load(Ordering::Relaxed)
    }

    // TODO: route the flag into MCR once the intended semantics are settled;
    // bring-up already leaves the internal loopback path enabled.
    pub fn set_loopback(&self, enabled: bool) {
        log::info!("{}: loopback {}", self.config.device_name, if enabled { "on" } else { "off" });
        self.loopback.store(enabled, Ordering::Relaxed);
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(UartError::NotInitialized)
        }
    }

    fn with_registers<T>(&self, f: impl FnOnce(&mut BankedRegisters<B::Mapping>) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let regs = state.regs.as_mut().ok_or(UartError::NotInitialized)?;
        f(regs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bringup::PollLimit;
    use crate::config::{BringUpConfig, DEFAULT_DIVISOR, DEFAULT_SELECTOR, UART2_BASE, UART2_SIZE};
    use crate::error::WaitPoint;
    use uart_mmio::MmioError;
    use uart_sim::{Access, ResetBehavior, SimBus, SimUart, Uart16c750};

    fn device(model: Uart16c750) -> (UartLoopDevice<SimBus>, SimUart) {
        let uart = SimUart::new(model);
        let bus = SimBus::new(uart.clone(), UART2_BASE, UART2_SIZE);
        (UartLoopDevice::new(bus, UartLoopConfig::default()), uart)
    }

    fn ready() -> (UartLoopDevice<SimBus>, SimUart) {
        let (device, uart) = device(Uart16c750::new());
        device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap();
        uart.lock().take_trace();
        (device, uart)
    }

    #[test]
    fn test_initialize_and_teardown() {
        let (device, uart) = device(Uart16c750::new());
        assert!(!device.is_initialized());

        let report = device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap();
        assert_eq!(report.echoed, b'A');
        assert!(device.is_initialized());
        assert!(uart.lock().is_mapped());

        assert_eq!(
            device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR),
            Err(UartError::AlreadyInitialized)
        );

        device.teardown().unwrap();
        assert!(!uart.lock().is_mapped());
        assert_eq!(device.teardown(), Err(UartError::NotInitialized));
    }

    #[test]
    fn test_mapping_failure_aborts() {
        let uart = SimUart::default();
        let bus = SimBus::new(uart.clone(), UART2_BASE, UART2_SIZE).refuse_map();
        let device = UartLoopDevice::new(bus, UartLoopConfig::default());

        let err = device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap_err();
        assert_eq!(
            err,
            UartError::Mapping(MmioError::OutOfWindow { paddr: UART2_BASE, size: UART2_SIZE })
        );
        assert!(uart.lock().trace().is_empty());
        assert!(!device.is_initialized());
    }

    #[test]
    fn test_failed_bringup_releases_mapping() {
        let uart = SimUart::new(Uart16c750::new().with_reset(ResetBehavior::Stuck));
        let bus = SimBus::new(uart.clone(), UART2_BASE, UART2_SIZE);
        let config = UartLoopConfig::default()
            .with_bringup(BringUpConfig::default().with_poll_limit(PollLimit::Iterations(4)));
        let device = UartLoopDevice::new(bus, config);

        let err = device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap_err();
        assert_eq!(err, UartError::Timeout { point: WaitPoint::ResetDone, polls: 4 });
        assert!(!uart.lock().is_mapped());
        assert!(!device.is_initialized());
    }

    #[test]
    fn test_requires_initialization() {
        let (device, _uart) = device(Uart16c750::new());
        assert_eq!(device.open(), Err(UartError::NotInitialized));
        assert_eq!(device.write(b"A"), Err(UartError::NotInitialized));
        assert_eq!(device.read(1), Err(UartError::NotInitialized));
        assert_eq!(device.read_register(LogicalRegister::LCR), Err(UartError::NotInitialized));
    }

    #[test]
    fn test_open_close() {
        let (device, uart) = ready();
        device.open().unwrap();
        device.close().unwrap();
        assert!(uart.lock().trace().is_empty());
    }

    #[test]
    fn test_write_one_access_per_byte() {
        let (device, uart) = ready();

        assert_eq!(device.write(&[0x41, 0x42, 0xFF]).unwrap(), 3);
        assert_eq!(
            uart.lock().take_trace(),
            vec![
                Access::Write { offset: 0x000, value: 0x0041 },
                Access::Write { offset: 0x000, value: 0x0042 },
                Access::Write { offset: 0x000, value: 0x00FF },
            ]
        );
    }

    #[test]
    fn test_write_empty() {
        let (device, uart) = ready();
        assert_eq!(device.write(&[]).unwrap(), 0);
        assert!(uart.lock().trace().is_empty());
    }

    #[test]
    fn test_stream_round_trip() {
        let (device, _uart) = ready();

        device.write(&[0x41, 0x42]).unwrap();
        let read = device.read(2).unwrap();
        assert_eq!(read.data, vec![0x41, 0x42]);
        assert_eq!(read.available, 2);
        assert!(!read.truncated);
    }

    #[test]
    fn test_read_truncates_to_max_count() {
        let (device, uart) = ready();
        uart.lock().inject_rx(&[1, 2, 3]);

        let read = device.read(1).unwrap();
        assert_eq!(read.data, vec![1]);
        assert_eq!(read.available, 3);
        assert!(read.truncated);

        // Level read once, one RHR read
        let trace = uart.lock().take_trace();
        assert_eq!(trace.len(), 2);
        assert_eq!(uart.lock().rx_level(), 2);

        let rest = device.read(16).unwrap();
        assert_eq!(rest.data, vec![2, 3]);
        assert!(!rest.truncated);
    }

    #[test]
    fn test_read_fault_returns_drained_bytes() {
        let (device, uart) = ready();
        uart.lock().inject_rx(&[1, 2, 3]);
        // Level read and first RHR read succeed, second RHR read faults
        uart.lock().fail_access_after(2);

        assert_eq!(
            device.read(3),
            Err(UartError::PartialRead {
                data: vec![1],
                source: MmioError::BusFault { offset: 0x000 },
            })
        );
        assert_eq!(uart.lock().rx_level(), 2);

        // The faulted pop consumed nothing
        assert_eq!(device.read(3).unwrap().data, vec![2, 3]);
    }

    #[test]
    fn test_read_fault_before_any_byte() {
        let (device, uart) = ready();
        uart.lock().inject_rx(&[7]);
        uart.lock().fail_access_after(1);

        assert_eq!(device.read(1), Err(UartError::Bus(MmioError::BusFault { offset: 0x000 })));
        assert_eq!(uart.lock().rx_level(), 1);
    }

    #[test]
    fn test_oversized_window_fails_mapping() {
        let uart = SimUart::default();
        let bus = SimBus::new(uart.clone(), UART2_BASE, UART2_SIZE);
        let config = UartLoopConfig::default().with_window(UART2_BASE, usize::MAX);
        let device = UartLoopDevice::new(bus, config);

        assert_eq!(
            device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR),
            Err(UartError::Mapping(MmioError::OutOfWindow { paddr: UART2_BASE, size: usize::MAX }))
        );
        assert!(uart.lock().trace().is_empty());
    }

    #[test]
    fn test_read_empty_fifo() {
        let (device, _uart) = ready();
        let read = device.read(8).unwrap();
        assert!(read.data.is_empty());
        assert_eq!(read.available, 0);
        assert!(!read.truncated);
    }

    #[test]
    fn test_register_access_is_banked() {
        let (device, uart) = ready();

        device.write_register(LogicalRegister::DLL, 0x001A).unwrap();
        assert_eq!(device.read_register(LogicalRegister::DLL).unwrap(), 0x001A);
        assert_eq!(uart.lock().divisor().0, 0x001A);
        assert_eq!(uart.lock().selector(), 0x0003);
    }

    #[test]
    fn test_loopback_flag_has_no_hardware_effect() {
        let (device, uart) = ready();
        assert!(!device.loopback());

        device.set_loopback(true);
        assert!(device.loopback());
        device.set_loopback(false);
        assert!(!device.loopback());

        assert!(uart.lock().trace().is_empty());
    }
}
