//! UART Loop Control
//!
//! Brings the UART loop device up against the simulated 16C750 block, runs
//! an optional stream write/read, and reports what happened on the bus.
//!
//! Usage:
//!   uart-loopctl \
//!     --write hello \
//!     --read 16 \
//!     --loopback on \
//!     --trace

use anyhow::{bail, Context, Result};
use clap::Parser;

use uart_loop::attr::{show_loopback, store_loopback, LOOPBACK_ATTR_NAME};
use uart_loop::{
    BringUpConfig, PollLimit, SelfTestPolicy, UartLoopConfig, UartLoopDevice, DEFAULT_BPS_RATE, UART2_BASE,
    UART2_SIZE,
};
use uart_sim::{Access, ResetBehavior, SimBus, SimUart, Uart16c750};

#[derive(Parser, Debug)]
#[command(name = "uart-loopctl")]
#[command(about = "Exercise the UART loop device on a simulated 16C750")]
struct Args {
    /// Text to transmit after bring-up
    #[arg(long)]
    write: Option<String>,

    /// Maximum number of bytes to read back
    #[arg(long)]
    read: Option<usize>,

    /// Loopback attribute value (on|off)
    #[arg(long)]
    loopback: Option<String>,

    /// SYSS polls before the simulated reset completes
    #[arg(long, default_value_t = 0)]
    reset_latency: u32,

    /// Never complete the simulated soft reset
    #[arg(long)]
    stuck_reset: bool,

    /// Poll limit for both blocking points (default: unbounded)
    #[arg(long)]
    max_polls: Option<u32>,

    /// Log a mismatched self-test echo instead of failing bring-up
    #[arg(long)]
    observe_self_test: bool,

    /// Line rate recorded for the device
    #[arg(long, default_value_t = DEFAULT_BPS_RATE)]
    bps_rate: u64,

    /// Divisor latch high value (default: 0x1)
    #[arg(long, default_value = "0x1")]
    divisor: String,

    /// Starting line control value (default: 0x0)
    #[arg(long, default_value = "0x0")]
    selector: String,

    /// Print every raw register access
    #[arg(long)]
    trace: bool,
}

fn parse_hex_or_dec(s: &str) -> Result<u16> {
    if let Some(hex) = s.strip_prefix("0x") {
        u16::from_str_radix(hex, 16).context("Invalid hex number")
    } else {
        s.parse::<u16>().context("Invalid decimal number")
    }
}

fn print_trace(trace: &[Access]) {
    log::info!("Raw accesses ({}):", trace.len());
    for access in trace {
        match *access {
            Access::Read { offset, value } => log::info!("  R {:#05x} -> {:#06x}", offset, value),
            Access::Write { offset, value } => log::info!("  W {:#05x} <- {:#06x}", offset, value),
        }
    }
}

fn device_config(args: &Args) -> UartLoopConfig {
    let mut bringup = BringUpConfig::default();
    if let Some(polls) = args.max_polls {
        bringup = bringup.with_poll_limit(PollLimit::Iterations(polls));
    }
    if args.observe_self_test {
        bringup = bringup.with_self_test(SelfTestPolicy::Observe);
    }

    UartLoopConfig::default()
        .with_bps_rate(args.bps_rate)
        .with_bringup(bringup)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let divisor = parse_hex_or_dec(&args.divisor)?;
    let selector = parse_hex_or_dec(&args.selector)?;

    let reset = if args.stuck_reset {
        ResetBehavior::Stuck
    } else {
        ResetBehavior::Polls(args.reset_latency)
    };

    let config = device_config(&args);
    log::info!("Configuration:");
    log::info!("  Device:   {} ({})", config.device_name, config.driver_name);
    log::info!("  Window:   {:#x} + {:#x}", config.base, config.size);
    log::info!("  Rate:     {} bps", config.bps_rate);
    log::info!("  Divisor:  {:#x}", divisor);
    log::info!("  Selector: {:#x}", selector);
    log::info!("");

    let uart = SimUart::new(Uart16c750::new().with_reset(reset));
    let device = UartLoopDevice::new(SimBus::new(uart.clone(), UART2_BASE, UART2_SIZE), config);

    if let Some(value) = &args.loopback {
        let text = match value.as_str() {
            "on" | "off" => format!("{}\n", value),
            other => bail!("Invalid loopback value '{}' (expected on|off)", other),
        };
        store_loopback(&device, text.as_bytes());
    }

    let outcome = device.initialize(divisor, selector);
    if args.trace {
        print_trace(&uart.lock().take_trace());
    }
    let report = outcome.context("Bring-up failed")?;

    log::info!("Bring-up complete:");
    log::info!("  Reset polls: {}", report.reset_polls);
    log::info!("  Echo polls:  {}", report.echo_polls);
    log::info!("  MCR:         {:#06x}", report.mcr);
    log::info!("  Echoed:      {:#04x}", report.echoed);
    log::info!("  {}: {}", LOOPBACK_ATTR_NAME, show_loopback(&device).trim_end());

    device.open().context("Failed to open device")?;

    if let Some(text) = &args.write {
        let written = device.write(text.as_bytes()).context("Stream write failed")?;
        log::info!("Wrote {} bytes", written);
    }

    if let Some(max_count) = args.read {
        let read = device.read(max_count).context("Stream read failed")?;
        log::info!(
            "Read {} of {} available bytes: {:?}",
            read.data.len(),
            read.available,
            String::from_utf8_lossy(&read.data)
        );
        if read.truncated {
            log::warn!("{} bytes left in the RX FIFO", read.available - read.data.len());
        }
    }

    if args.trace {
        print_trace(&uart.lock().take_trace());
    }

    device.close().context("Failed to close device")?;
    device.teardown().context("Teardown failed")?;

    Ok(())
}
