//! Loopback attribute text boundary
//!
//! Formats and parses the `loopback` device attribute the way the attribute
//! filesystem exchanges it: `"on\n"` or `"off\n"`.

use uart_mmio::MmioBus;

use crate::device::UartLoopDevice;

/// Attribute file name
pub const LOOPBACK_ATTR_NAME: &str = "loopback";

/// Attribute permissions (rw-r--r--)
pub const LOOPBACK_ATTR_MODE: u16 = 0o644;

/// Render the loopback flag
pub fn show_loopback<B: MmioBus>(device: &UartLoopDevice<B>) -> &'static str {
    if device.loopback() {
        "on\n"
    } else {
        "off\n"
    }
}

/// Parse a store to the loopback attribute
///
/// Exactly `"on\n"` enables loopback; any other input disables it. The whole
/// input is always consumed.
pub fn store_loopback<B: MmioBus>(device: &UartLoopDevice<B>, buf: &[u8]) -> usize {
    device.set_loopback(buf == b"on\n");
    buf.len()
}
