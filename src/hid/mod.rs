//! HID (Human Interface Device) support
//!
//! Devices that carry HID class descriptors get a HID payload during
//! enumeration. The operations here address them by device address and HID
//! index and talk to the device over its control pipe:
//!
//! - report descriptor reads
//! - GET_REPORT / SET_REPORT
//! - SET_PROTOCOL, typically to switch keyboards and mice to boot protocol
//!
//! # Example
//!
//! ```no_run
//! # use dwc2_usbh::{UsbHost, HostHardware, Platform};
//! # use dwc2_usbh::hid::{HidProtocolMode, HidReportType};
//! # fn poll<H: HostHardware, P: Platform>(usb: &mut UsbHost<H, P>, address: u8) -> dwc2_usbh::Result<()> {
//! if usb.is_keyboard(address) {
//!     usb.hid_set_protocol(address, 0, HidProtocolMode::Boot as u16)?;
//!     let mut report = [0u8; 8];
//!     let n = usb.hid_read_report(address, 0, HidReportType::Input.report_value(0), &mut report)?;
//!     log::info!("keys: {:?}", &report[..n]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Reference
//!
//! - USB HID Specification 1.11: <https://www.usb.org/document-library/device-class-definition-hid-111>

pub mod constants;
pub mod device;

pub use constants::*;
