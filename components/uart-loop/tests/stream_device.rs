//! Integration tests for the UART loop device
//!
//! These tests drive the public facade end to end against the simulated
//! block:
//! - Bring-up with a loopback self-test
//! - Stream write/read round trips
//! - Truncated reads
//! - Attribute text boundary

use uart_loop::attr::{show_loopback, store_loopback};
use uart_loop::*;
use uart_sim::{Access, Echo, ResetBehavior, SimBus, SimUart, Uart16c750, RX_FIFO_DEPTH};

fn device_over(model: Uart16c750, config: UartLoopConfig) -> (UartLoopDevice<SimBus>, SimUart) {
    let uart = SimUart::new(model);
    let bus = SimBus::new(uart.clone(), UART2_BASE, UART2_SIZE);
    (UartLoopDevice::new(bus, config), uart)
}

/// Test the full driver lifecycle: probe, use, remove
#[test]
fn test_driver_lifecycle() {
    let (device, uart) = device_over(
        Uart16c750::new().with_reset(ResetBehavior::Polls(3)),
        UartLoopConfig::default(),
    );

    // Probe: map + bring-up
    let report = device
        .initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR)
        .expect("bring-up failed");
    assert_eq!(report.reset_polls, 4);
    assert!(report.echo_matches(SELF_TEST_BYTE));
    assert_eq!(report.mcr, 0x0017);

    // Hardware left configured: 8N1, divisor, loopback path
    {
        let model = uart.lock();
        assert_eq!(model.selector(), 0x0003);
        assert_eq!(model.divisor(), (0, DEFAULT_DIVISOR));
        assert_eq!(model.mcr(), 0x0017);
        assert_eq!(model.mdr1(), 0x0000);
        assert_eq!(model.rx_level(), 0);
    }

    // Use
    device.open().unwrap();
    assert_eq!(device.write(b"hello").unwrap(), 5);
    assert_eq!(device.read(5).unwrap().data, b"hello".to_vec());
    device.close().unwrap();

    // Remove
    device.teardown().unwrap();
    assert!(!uart.lock().is_mapped());
}

/// The self-test echo read during bring-up equals the byte written
#[test]
fn test_loopback_self_test_echo() {
    let (device, uart) = device_over(Uart16c750::new(), UartLoopConfig::default());
    let report = device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap();

    let trace = uart.lock().take_trace();
    let thr_write = trace
        .iter()
        .position(|a| *a == Access::Write { offset: 0x000, value: 0x0041 })
        .expect("self-test byte not transmitted");
    assert_eq!(trace[thr_write + 1], Access::Read { offset: 0x064, value: 0x0001 });
    assert_eq!(trace[thr_write + 2], Access::Read { offset: 0x000, value: 0x0041 });
    assert_eq!(report.echoed, 0x41);
}

#[test]
fn test_stream_round_trip() {
    let (device, _uart) = device_over(Uart16c750::new(), UartLoopConfig::default());
    device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap();

    assert_eq!(device.write(&[0x41, 0x42]).unwrap(), 2);
    let read = device.read(2).unwrap();
    assert_eq!(read.data, vec![0x41, 0x42]);
    assert!(!read.truncated);
}

#[test]
fn test_truncation_never_overreads() {
    let (device, uart) = device_over(Uart16c750::new(), UartLoopConfig::default());
    device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap();
    uart.lock().inject_rx(&[0x10, 0x20, 0x30]);

    let read = device.read(1).unwrap();
    assert_eq!(read.data, vec![0x10]);
    assert!(read.truncated);
    assert_eq!(read.available, 3);
    assert_eq!(uart.lock().rx_level(), 2);
}

/// Bytes arriving during a drain are left for the next read
#[test]
fn test_read_uses_level_snapshot() {
    let (device, uart) = device_over(Uart16c750::new(), UartLoopConfig::default());
    device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap();

    device.write(b"ab").unwrap();
    let first = device.read(64).unwrap();
    device.write(b"c").unwrap();
    let second = device.read(64).unwrap();

    assert_eq!(first.data, b"ab".to_vec());
    assert_eq!(second.data, b"c".to_vec());
    assert_eq!(uart.lock().rx_level(), 0);
}

/// A full FIFO drains in one read when the caller allows it
#[test]
fn test_full_fifo_drain() {
    let (device, _uart) = device_over(Uart16c750::new(), UartLoopConfig::default());
    device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap();

    let payload: Vec<u8> = (0..RX_FIFO_DEPTH as u8).collect();
    device.write(&payload).unwrap();

    let read = device.read(RX_FIFO_DEPTH).unwrap();
    assert_eq!(read.data, payload);
    assert!(!read.truncated);
}

/// With the internal loopback off, writes go out on the line instead
#[test]
fn test_write_without_internal_loopback() {
    let (device, uart) = device_over(Uart16c750::new(), UartLoopConfig::default());
    device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap();
    device.write_register(LogicalRegister::MCR, 0x0003).unwrap();

    device.write(b"out").unwrap();
    assert_eq!(uart.lock().line_out(), b"out");
    assert!(device.read(8).unwrap().data.is_empty());
}

#[test]
fn test_corrupt_echo_fails_bringup() {
    let (device, uart) = device_over(
        Uart16c750::new().with_echo(Echo::Corrupt(0x01)),
        UartLoopConfig::default(),
    );

    let err = device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap_err();
    assert_eq!(err, UartError::SelfTestMismatch { expected: 0x41, actual: 0x40 });
    assert!(!uart.lock().is_mapped());
}

#[test]
fn test_cancel_unblocks_stuck_reset() {
    let cancel = CancelToken::new();
    let config = UartLoopConfig::default().with_bringup(BringUpConfig::default().with_cancel(cancel.clone()));
    let (device, _uart) = device_over(Uart16c750::new().with_reset(ResetBehavior::Stuck), config);

    crossbeam::scope(|s| {
        let waiter = s.spawn(|_| device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR));
        std::thread::sleep(std::time::Duration::from_millis(20));
        cancel.cancel();

        let result = waiter.join().unwrap();
        assert_eq!(result, Err(UartError::Cancelled { point: WaitPoint::ResetDone }));
    })
    .unwrap();

    assert!(!device.is_initialized());
}

#[test]
fn test_loopback_attribute_text() {
    let (device, _uart) = device_over(Uart16c750::new(), UartLoopConfig::default());
    device.initialize(DEFAULT_DIVISOR, DEFAULT_SELECTOR).unwrap();

    assert_eq!(show_loopback(&device), "off\n");
    assert_eq!(store_loopback(&device, b"on\n"), 3);
    assert_eq!(show_loopback(&device), "on\n");

    // Flag does not gate the stream path
    device.write(b"x").unwrap();
    assert_eq!(device.read(1).unwrap().data, b"x".to_vec());
    store_loopback(&device, b"off\n");
    device.write(b"y").unwrap();
    assert_eq!(device.read(1).unwrap().data, b"y".to_vec());
}
