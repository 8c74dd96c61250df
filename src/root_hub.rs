//! Emulated root hub
//!
//! The DWC2 core exposes one physical port, not a hub. Control requests sent
//! to the root hub address are answered here from canned descriptor tables,
//! and port requests are mapped onto the host port register so the physical
//! bus enumerates like any other hub port.

use crate::descriptor::DescriptorType;
use crate::dwc::controller::Dwc2Controller;
use crate::dwc::{host_port, HostHardware, HostPort, PowerClock, Reg};
use crate::error::{Result, UsbError};
use crate::hub::{HubStatus, PortChange, PortFeature, PortStatus};
use crate::platform::Platform;
use crate::transfer::control::{request, request_type};
use crate::transfer::{DeviceSpeed, SetupPacket};

/// Device descriptor: USB 2.0 hub, 64 byte EP0, product string 1
const DEVICE_DESCRIPTOR: [u8; 18] = [
    18, 0x01, 0x00, 0x02, 0x09, 0, 0, 64, 0, 0, 0, 0, 0x00, 0x01, 0, 1, 0, 1,
];

/// Configuration, interface and interrupt IN endpoint, 25 bytes total
const CONFIGURATION_DESCRIPTOR: [u8; 25] = [
    // Configuration: 1 interface, value 1, string 2, self powered
    9, 0x02, 25, 0, 1, 1, 2, 0xC0, 0,
    // Interface: hub class, 1 endpoint
    9, 0x04, 0, 0, 1, 0x09, 0, 0, 0,
    // Endpoint: 1 IN, interrupt, 64 bytes, interval 255
    7, 0x05, 0x81, 0x03, 64, 0, 0xFF,
];

/// Language table: US English only
const STRING_LANGUAGES: [u8; 4] = [4, 0x03, 0x09, 0x04];

const PRODUCT_TEXT: &str = "FAKED Root Hub (tm)";
const CONFIGURATION_TEXT: &str = "FAKE config string";

/// String descriptor built from ASCII text at compile time
const fn string_descriptor<const N: usize>(text: &str) -> [u8; N] {
    let bytes = text.as_bytes();
    let mut out = [0u8; N];
    out[0] = N as u8;
    out[1] = DescriptorType::String as u8;
    let mut i = 0;
    while i < bytes.len() {
        out[2 + 2 * i] = bytes[i];
        i += 1;
    }
    out
}

const PRODUCT_STRING: [u8; 2 + 2 * PRODUCT_TEXT.len()] = string_descriptor(PRODUCT_TEXT);
const CONFIGURATION_STRING: [u8; 2 + 2 * CONFIGURATION_TEXT.len()] =
    string_descriptor(CONFIGURATION_TEXT);

/// Hub descriptor: 1 port, global power switching, port 1 removable
const HUB_DESCRIPTOR: [u8; 9] = [9, 0x29, 1, 0x00, 0x00, 0, 0, 0x02, 0xFF];

/// Root hub has exactly one port
const ROOT_PORT: u16 = 1;

impl<H: HostHardware, P: Platform> Dwc2Controller<H, P> {
    /// Address the emulated root hub currently answers on
    pub fn root_hub_address(&self) -> Option<u8> {
        self.root_hub_address
    }

    /// Route the root hub to `address`, or detach it with `None`
    pub fn set_root_hub_address(&mut self, address: Option<u8>) {
        self.root_hub_address = address;
    }

    /// Answer a control request addressed to the root hub
    ///
    /// The reply is truncated to `buffer` and the copied length returned.
    /// Unrecognised requests are [`UsbError::Argument`].
    pub(crate) fn process_root_hub_message(
        &mut self,
        buffer: Option<&mut [u8]>,
        setup: &SetupPacket,
    ) -> Result<usize> {
        let request_kind = setup.bRequest;
        let request_type = setup.bmRequestType;
        let value = setup.wValue;
        let index = setup.wIndex;

        let mut scratch = [0u8; 4];
        let reply: &[u8] = match request_kind {
            request::GET_STATUS => match request_type {
                request_type::DEVICE_IN => {
                    // Self powered, no remote wakeup
                    scratch[..2].copy_from_slice(&1u16.to_le_bytes());
                    &scratch[..2]
                }
                request_type::INTERFACE_IN | request_type::ENDPOINT_IN => &scratch[..2],
                request_type::HUB_IN => {
                    let status = HubStatus {
                        local_power: true,
                        over_current: false,
                    };
                    scratch = (status.to_raw() as u32).to_le_bytes();
                    &scratch[..]
                }
                request_type::PORT_IN if index == ROOT_PORT => {
                    scratch = self.root_port_status().to_le_bytes();
                    &scratch[..]
                }
                _ => return Err(UsbError::Argument),
            },
            request::CLEAR_FEATURE => {
                self.root_feature(request_type, value, index, false)?;
                &[]
            }
            request::SET_FEATURE => {
                self.root_feature(request_type, value, index, true)?;
                &[]
            }
            request::SET_ADDRESS => {
                self.root_hub_address = Some(value as u8);
                log::debug!("HCD: Root hub moved to address {}", value);
                &[]
            }
            request::GET_DESCRIPTOR => match request_type {
                request_type::DEVICE_IN => match (value >> 8) as u8 {
                    t if t == DescriptorType::Device as u8 => &DEVICE_DESCRIPTOR,
                    t if t == DescriptorType::Configuration as u8 => &CONFIGURATION_DESCRIPTOR,
                    t if t == DescriptorType::String as u8 => match value & 0xFF {
                        0 => &STRING_LANGUAGES,
                        1 => &PRODUCT_STRING,
                        2 => &CONFIGURATION_STRING,
                        _ => &[],
                    },
                    _ => return Err(UsbError::Argument),
                },
                request_type::HUB_IN => &HUB_DESCRIPTOR,
                _ => return Err(UsbError::Argument),
            },
            request::GET_CONFIGURATION => {
                scratch[0] = 1;
                &scratch[..1]
            }
            request::SET_CONFIGURATION => &[],
            _ => return Err(UsbError::Argument),
        };

        let Some(buffer) = buffer else {
            return Ok(0);
        };
        let length = reply.len().min(buffer.len());
        buffer[..length].copy_from_slice(&reply[..length]);
        Ok(length)
    }

    /// Host port register translated into a hub port status word
    fn root_port_status(&mut self) -> u32 {
        let raw = self.hw.read(Reg::HostPort);
        let port = HostPort::from_bits_retain(raw);
        let speed = DeviceSpeed::from_port_bits(
            (raw & host_port::SPEED_MASK) >> host_port::SPEED_SHIFT,
        );

        let status = PortStatus {
            connected: port.contains(HostPort::CONNECT),
            enabled: port.contains(HostPort::ENABLE),
            suspended: port.contains(HostPort::SUSPEND),
            over_current: port.contains(HostPort::OVERCURRENT),
            reset: port.contains(HostPort::RESET),
            power: port.contains(HostPort::POWER),
            low_speed: speed == DeviceSpeed::Low,
            high_speed: speed == DeviceSpeed::High,
            test_mode: raw & host_port::TEST_CONTROL_MASK != 0,
            indicator: false,
        };
        // The core does not latch enable or reset changes
        let change = PortChange {
            connection: port.contains(HostPort::CONNECT_CHANGED),
            enabled: false,
            suspended: false,
            over_current: port.contains(HostPort::OVERCURRENT_CHANGED),
            reset: false,
        };

        status.to_raw() as u32 | ((change.to_raw() as u32) << 16)
    }

    /// SetFeature / ClearFeature on the root hub
    fn root_feature(&mut self, request_type: u8, feature: u16, index: u16, set: bool) -> Result<()> {
        match request_type {
            request_type::INTERFACE_OUT | request_type::ENDPOINT_OUT | request_type::HUB_OUT => Ok(()),
            request_type::PORT_OUT if index == ROOT_PORT => {
                match (PortFeature::from_u16(feature), set) {
                    (Some(PortFeature::Reset), true) => self.root_port_reset(),
                    (Some(PortFeature::Power), true) => {
                        log::info!("HCD: Physical host power on");
                        self.modify_host_port(|p| p | HostPort::POWER);
                    }
                    (Some(PortFeature::Enable), false) => {
                        // Writing 1 to ENABLE disables the port
                        self.modify_host_port(|p| p | HostPort::ENABLE);
                    }
                    (Some(PortFeature::Suspend), false) => self.root_port_resume(),
                    (Some(PortFeature::Power), false) => {
                        log::info!("HCD: Physical host power off");
                        self.modify_host_port(|p| p - HostPort::POWER);
                    }
                    (Some(PortFeature::ConnectionChange), false) => {
                        self.modify_host_port(|p| p | HostPort::CONNECT_CHANGED);
                    }
                    (Some(PortFeature::EnableChange), false) => {
                        self.modify_host_port(|p| p | HostPort::ENABLE_CHANGED);
                    }
                    (Some(PortFeature::OverCurrentChange), false) => {
                        self.modify_host_port(|p| p | HostPort::OVERCURRENT_CHANGED);
                    }
                    _ => {}
                }
                Ok(())
            }
            _ => Err(UsbError::Argument),
        }
    }

    /// Read-modify-write of the host port with the volatile bits masked off
    fn modify_host_port<F>(&mut self, f: F)
    where
        F: FnOnce(HostPort) -> HostPort,
    {
        self.hw.modify(Reg::HostPort, |v| {
            let masked = HostPort::from_bits_retain(v & host_port::WRITE_MASK);
            f(masked).bits()
        });
    }

    fn root_port_reset(&mut self) {
        self.hw.modify(Reg::PowerClock, |v| {
            v & !(PowerClock::SLEEP_CLOCK_GATING | PowerClock::STOP_PCLOCK).bits()
        });
        self.platform.delay_ms(10);
        self.hw.write(Reg::PowerClock, 0);

        self.modify_host_port(|p| (p - HostPort::SUSPEND) | HostPort::RESET | HostPort::POWER);
        self.platform.delay_ms(self.config.port_reset_hold_ms);
        self.modify_host_port(|p| p - HostPort::RESET);
        log::debug!("HCD: Reset physical port, root hub {:?}", self.root_hub_address);
    }

    fn root_port_resume(&mut self) {
        self.hw.write(Reg::PowerClock, 0);
        self.platform.delay_ms(5);
        self.modify_host_port(|p| p | HostPort::RESUME);
        self.platform.delay_ms(100);
        self.modify_host_port(|p| p - (HostPort::SUSPEND | HostPort::RESUME));
    }
}
