//! Device descriptions and bus tree printing

use core::fmt::{self, Write};

use heapless::String;

use crate::descriptor::DeviceClass;
use crate::dwc::HostHardware;
use crate::enumeration::ROOT_HUB_ADDRESS;
use crate::platform::Platform;
use crate::registry::{DeviceStatus, UsbDevice};
use crate::UsbHost;

/// Deepest tree level drawn with connector lines
const MAX_TREE_DEPTH: usize = 20;

fn hub_name(bcd_usb: u16) -> &'static str {
    match bcd_usb {
        0x0210 => "USB 2.1 Hub",
        0x0200 => "USB 2.0 Hub",
        0x0110 => "USB 1.1 Hub",
        0x0100 => "USB 1.0 Hub",
        _ => "USB Hub",
    }
}

/// Name for a configured device classed by its first interface
fn interface_name(device: &UsbDevice) -> &'static str {
    let Some(interface) = device.interfaces.first() else {
        return "Generic Device";
    };
    match DeviceClass::from_u8(interface.descriptor.b_interface_class) {
        Some(DeviceClass::Audio) => "USB Audio Device",
        Some(DeviceClass::Communications) => "USB CDC Device",
        Some(DeviceClass::Hid) => match interface.descriptor.b_interface_protocol {
            1 => "USB Keyboard",
            2 => "USB Mouse",
            _ => "USB HID",
        },
        Some(DeviceClass::Physical) => "USB Physical Device",
        Some(DeviceClass::Image) => "USB Imaging Device",
        Some(DeviceClass::Printer) => "USB Printer",
        Some(DeviceClass::MassStorage) => "USB Mass Storage Device",
        Some(DeviceClass::Hub) => hub_name(device.descriptor.bcd_usb),
        Some(DeviceClass::CdcData) => "USB CDC-Data Device",
        Some(DeviceClass::SmartCard) => "USB Smart Card",
        Some(DeviceClass::ContentSecurity) => "USB Content Security Device",
        Some(DeviceClass::Video) => "USB Video Device",
        Some(DeviceClass::PersonalHealthcare) => "USB Healthcare Device",
        Some(DeviceClass::AudioVideo) => "USB AV Device",
        Some(DeviceClass::Diagnostic) => "USB Diagnostic Device",
        Some(DeviceClass::WirelessController) => "USB Wireless Controller",
        Some(DeviceClass::Miscellaneous) => "USB Miscellaneous Device",
        Some(DeviceClass::VendorSpecific) => "Vendor Specific",
        _ => "Generic Device",
    }
}

/// Driver-generated description of `device`; nothing is read from the bus
pub fn describe(device: &UsbDevice) -> &'static str {
    match device.status {
        DeviceStatus::Attached => return "New Device (Not Ready)",
        DeviceStatus::Powered => return "Unknown Device (Not Ready)",
        _ => {}
    }
    if device.number == ROOT_HUB_ADDRESS {
        return "USB Root Hub";
    }

    let descriptor = &device.descriptor;
    match descriptor.device_class() {
        Some(DeviceClass::Hub) => hub_name(descriptor.bcd_usb),
        Some(DeviceClass::VendorSpecific)
            if descriptor.id_vendor == 0x0424 && descriptor.id_product == 0xEC00 =>
        {
            "SMSC LAN9512"
        }
        Some(DeviceClass::VendorSpecific | DeviceClass::InInterface) => {
            if device.status == DeviceStatus::Configured {
                interface_name(device)
            } else if descriptor.device_class() == Some(DeviceClass::VendorSpecific) {
                "Vendor Specific"
            } else {
                "Unconfigured Device"
            }
        }
        _ => "Generic Device",
    }
}

/// `fmt::Write` sink that emits each completed line through `log::info!`
struct LineLogger {
    line: String<160>,
}

impl Write for LineLogger {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if ch == '\n' {
                log::info!("{}", self.line.as_str());
                self.line.clear();
            } else if self.line.push(ch).is_err() {
                // Overlong line: emit what we have and keep going
                log::info!("{}", self.line.as_str());
                self.line.clear();
                let _ = self.line.push(ch);
            }
        }
        Ok(())
    }
}

impl<H: HostHardware, P: Platform> UsbHost<H, P> {
    /// Driver-generated description of the device at `address`
    pub fn description(&self, address: u8) -> &'static str {
        self.registry
            .device(address)
            .map_or("No Device", describe)
    }

    /// Draw the bus as an ASCII tree, one line per device, into `out`
    pub fn show_tree<W: Write>(&self, out: &mut W) -> fmt::Result {
        if self.registry.device(ROOT_HUB_ADDRESS).is_none() {
            return Ok(());
        }
        let mut in_use = [false; MAX_TREE_DEPTH];
        self.write_node(out, ROOT_HUB_ADDRESS, 1, '+', &mut in_use)
    }

    /// Emit the bus tree through the logger
    pub fn log_tree(&self) {
        let mut logger = LineLogger { line: String::new() };
        let _ = self.show_tree(&mut logger);
    }

    fn write_node<W: Write>(
        &self,
        out: &mut W,
        address: u8,
        level: usize,
        tee: char,
        in_use: &mut [bool; MAX_TREE_DEPTH],
    ) -> fmt::Result {
        let Some(device) = self.registry.device(address) else {
            return Ok(());
        };

        for drawn in in_use.iter().take(level.saturating_sub(1)) {
            out.write_str(if *drawn { " | " } else { "   " })?;
        }
        writeln!(
            out,
            " {}-{} id: {} port: {} speed: {} packetsize: {} {}",
            tee,
            describe(device),
            device.pipe0.address,
            device.parent.map_or(0, |p| p.port),
            device.pipe0.speed.as_str(),
            device.pipe0.max_size.to_number(),
            if self.registry.is_hid(address) {
                "- HID interface"
            } else {
                ""
            }
        )?;

        let Some(hub) = self.registry.hub(address) else {
            return Ok(());
        };
        let children = hub.children;
        let last = (hub.max_children as usize).min(children.len());
        for i in 0..last {
            let more = children[i + 1..last].iter().any(Option::is_some);
            if more && level < MAX_TREE_DEPTH {
                in_use[level] = true;
            }
            let node_tee = if more { '+' } else { '`' };
            if let Some(child) = children[i] {
                self.write_node(out, child, level + 1, node_tee, in_use)?;
            }
            if level < MAX_TREE_DEPTH {
                in_use[level] = false;
            }
        }
        Ok(())
    }
}
