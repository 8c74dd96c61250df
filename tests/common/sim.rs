//! Simulated DWC2 core, bus and board platform
//!
//! [`SimController`] implements the register boundary of the driver. Channel
//! launches are executed against a tree of [`SimDevice`]s hanging off the
//! root port, so whole enumerations run without hardware. Outcomes can be
//! forced per launch to exercise the retry policy.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};

use dwc2_usbh::dwc::{
    hcchar, hcsplt, hctsiz, host_port, ChannelInterrupt, ChannelReg, CoreReset, HostPort, Reg,
};
use dwc2_usbh::{DeviceSpeed, HostHardware, Platform, SetupPacket, UsbError};
use embedded_hal::delay::DelayNs;

use super::descriptors::{self, KEYBOARD_REPORT, MOUSE_REPORT};

/// Synopsys id of a BCM2835 core ("OT2", 2.80a)
pub const VENDOR_ID: u32 = 0x4F54_280A;
/// GHWCFG2: internal DMA, UTMI+ high-speed PHY, 8 host channels
pub const HARDWARE2: u32 = (2 << 3) | (1 << 6) | (7 << 14);

const SETUP_PID: u32 = 3;

/// Forced result of the next channel launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Halt with these flags; nothing reaches the device
    Flags(ChannelInterrupt),
    /// Never halt, so the driver's poll times out
    Silent,
}

/// One channel launch as seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub address: u8,
    pub low_speed: bool,
    /// Hub and port of a split transaction
    pub split: Option<(u8, u8)>,
    pub complete_split: bool,
}

/// Downstream port of a simulated hub
#[derive(Debug, Default)]
pub struct SimPort {
    pub device: Option<SimDevice>,
    pub powered: bool,
    pub enabled: bool,
    pub suspended: bool,
    pub connect_change: bool,
    pub enable_change: bool,
    pub reset_change: bool,
}

impl SimPort {
    fn status(&self) -> u32 {
        let connected = self.powered && self.device.is_some();
        let speed = self.device.as_ref().map(|d| d.speed);
        (connected as u32)
            | ((self.enabled as u32) << 1)
            | ((self.suspended as u32) << 2)
            | ((self.powered as u32) << 8)
            | (((speed == Some(DeviceSpeed::Low)) as u32) << 9)
            | (((speed == Some(DeviceSpeed::High)) as u32) << 10)
            | ((self.connect_change as u32) << 16)
            | ((self.enable_change as u32) << 17)
            | ((self.reset_change as u32) << 20)
    }
}

/// A device on the simulated bus
#[derive(Debug)]
pub struct SimDevice {
    pub speed: DeviceSpeed,
    /// Current bus address; 0 after reset
    pub address: u8,
    pub device_descriptor: Vec<u8>,
    pub configuration: Vec<u8>,
    /// Index 0 is the language table
    pub strings: Vec<Vec<u8>>,
    /// Report descriptor per interface number
    pub report_descriptors: Vec<Vec<u8>>,
    pub input_report: Vec<u8>,
    /// SET_REPORT payloads as (wValue, data)
    pub output_reports: Vec<(u16, Vec<u8>)>,
    /// SET_PROTOCOL as (wValue, wIndex)
    pub protocol: Option<(u16, u16)>,
    pub configuration_value: Option<u8>,
    /// Downstream ports; empty unless a hub
    pub ports: Vec<SimPort>,
    pub hub_descriptor: Vec<u8>,
    /// Every setup packet this device accepted
    pub requests: Vec<SetupPacket>,
    /// Request codes answered with STALL
    pub refuse: Vec<u8>,
    /// Port GET_STATUS replies left before the hub starts stalling them
    pub port_status_replies: Option<usize>,
    pending: Option<SetupPacket>,
}

impl SimDevice {
    fn new(speed: DeviceSpeed, device_descriptor: Vec<u8>, configuration: Vec<u8>) -> Self {
        Self {
            speed,
            address: 0,
            device_descriptor,
            configuration,
            strings: vec![descriptors::languages(&[0x0409])],
            report_descriptors: Vec::new(),
            input_report: Vec::new(),
            output_reports: Vec::new(),
            protocol: None,
            configuration_value: None,
            ports: Vec::new(),
            hub_descriptor: Vec::new(),
            requests: Vec::new(),
            refuse: Vec::new(),
            port_status_replies: None,
            pending: None,
        }
    }

    /// Device with no interfaces of interest
    pub fn plain(speed: DeviceSpeed, class: u8) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(&descriptors::interface(0, 1, class, 0, 0));
        body.extend_from_slice(&descriptors::endpoint(0x81, 0x02, 64, 0));
        Self::new(
            speed,
            descriptors::device_descriptor(class, 0x1234, 0x5678, 64, (0, 0, 0)),
            descriptors::configuration(1, 0, 1, &body),
        )
    }

    /// Mass storage device (bulk-only transport)
    pub fn mass_storage(speed: DeviceSpeed) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(&descriptors::interface(0, 2, 0x08, 0x06, 0x50));
        body.extend_from_slice(&descriptors::endpoint(0x81, 0x02, 512, 0));
        body.extend_from_slice(&descriptors::endpoint(0x02, 0x02, 512, 0));
        Self::new(
            speed,
            descriptors::device_descriptor(0, 0x0781, 0x5567, 64, (0, 0, 0)),
            descriptors::configuration(1, 0, 1, &body),
        )
    }

    /// Hub with `ports` downstream ports
    pub fn hub(speed: DeviceSpeed, ports: u8) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(&descriptors::interface(0, 1, 0x09, 0, 0));
        body.extend_from_slice(&descriptors::endpoint(0x81, 0x03, 1, 12));
        let mut device = Self::new(
            speed,
            descriptors::device_descriptor(0x09, 0x0424, 0x2514, 64, (0, 0, 0)),
            descriptors::configuration(1, 0, 1, &body),
        );
        device.hub_descriptor = descriptors::hub_descriptor(ports);
        device.ports = (0..ports).map(|_| SimPort::default()).collect();
        device
    }

    fn boot_hid(speed: DeviceSpeed, protocol: u8, report: &[u8], product: &str) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(&descriptors::interface(0, 1, 0x03, 0x01, protocol));
        body.extend_from_slice(&descriptors::hid_descriptor(report.len() as u16));
        body.extend_from_slice(&descriptors::endpoint(0x81, 0x03, 8, 10));
        let max_packet = if speed == DeviceSpeed::Low { 8 } else { 64 };
        let mut device = Self::new(
            speed,
            descriptors::device_descriptor(0, 0x046D, 0xC31C, max_packet, (1, 2, 0)),
            descriptors::configuration(1, 0, 1, &body),
        );
        device.strings.push(descriptors::string("Logitech"));
        device.strings.push(descriptors::string(product));
        device.report_descriptors.push(report.to_vec());
        device
    }

    /// Boot protocol keyboard
    pub fn keyboard(speed: DeviceSpeed) -> Self {
        let mut device = Self::boot_hid(speed, 1, &KEYBOARD_REPORT, "USB Keyboard");
        device.input_report = vec![0, 0, 0x04, 0, 0, 0, 0, 0];
        device
    }

    /// Boot protocol mouse
    pub fn mouse(speed: DeviceSpeed) -> Self {
        let mut device = Self::boot_hid(speed, 2, &MOUSE_REPORT, "USB Optical Mouse");
        device.input_report = vec![0x01, 0x05, 0xFB];
        device
    }

    /// Plug `device` into zero-based `port`
    pub fn attach(&mut self, port: usize, device: SimDevice) {
        let slot = &mut self.ports[port];
        slot.device = Some(device);
        if slot.powered {
            slot.connect_change = true;
        }
    }

    /// Unplug whatever sits on zero-based `port`
    pub fn detach(&mut self, port: usize) -> Option<SimDevice> {
        let slot = &mut self.ports[port];
        let device = slot.device.take();
        slot.enabled = false;
        slot.connect_change = true;
        device
    }

    /// Device on zero-based `port`
    pub fn child(&mut self, port: usize) -> &mut SimDevice {
        self.ports[port].device.as_mut().expect("no device on port")
    }

    fn reset(&mut self) {
        self.address = 0;
        self.configuration_value = None;
        self.pending = None;
        for port in &mut self.ports {
            port.powered = false;
            port.enabled = false;
            port.connect_change = false;
            port.enable_change = false;
            port.reset_change = false;
        }
    }

    fn find_mut(&mut self, address: u8) -> Option<&mut SimDevice> {
        if self.address == address {
            return Some(self);
        }
        for port in self.ports.iter_mut().filter(|p| p.enabled) {
            if let Some(found) = port.device.as_mut().and_then(|d| d.find_mut(address)) {
                return Some(found);
            }
        }
        None
    }

    fn setup(&mut self, setup: SetupPacket) {
        self.requests.push(setup);
        self.pending = Some(setup);
    }

    /// Reply for the pending IN request, `None` to stall
    fn respond(&self, setup: &SetupPacket) -> Option<Vec<u8>> {
        let (request_type, request, value, index) =
            (setup.bmRequestType, setup.bRequest, setup.wValue, setup.wIndex);
        if self.refuse.contains(&request) {
            return None;
        }
        match (request_type, request) {
            (0x80, 0x06) => match (value >> 8) as u8 {
                0x01 => Some(self.device_descriptor.clone()),
                0x02 => Some(self.configuration.clone()),
                0x03 => self.strings.get((value & 0xFF) as usize).cloned(),
                _ => None,
            },
            (0x80, 0x00) => Some(vec![0, 0]),
            (0x81, 0x06) if value >> 8 == 0x22 => self.report_descriptors.get(index as usize).cloned(),
            (0xA1, 0x01) => Some(self.input_report.clone()),
            (0xA0, 0x06) if !self.ports.is_empty() => Some(self.hub_descriptor.clone()),
            (0xA0, 0x00) if !self.ports.is_empty() => Some(vec![0; 4]),
            (0xA3, 0x00) if !self.ports.is_empty() => {
                let port = self.ports.get((index as usize).checked_sub(1)?)?;
                Some(port.status().to_le_bytes().to_vec())
            }
            _ => None,
        }
    }

    fn data_in(&mut self, buffer: &mut [u8]) -> Result<usize, ()> {
        let setup = self.pending.ok_or(())?;
        if (setup.bmRequestType, setup.bRequest) == (0xA3, 0x00) {
            if let Some(left) = self.port_status_replies.as_mut() {
                *left = left.checked_sub(1).ok_or(())?;
            }
        }
        let reply = self.respond(&setup).ok_or(())?;
        let length = reply.len().min(buffer.len());
        buffer[..length].copy_from_slice(&reply[..length]);
        Ok(length)
    }

    fn data_out(&mut self, data: &[u8]) -> Result<usize, ()> {
        let setup = self.pending.ok_or(())?;
        let (request_type, request, value) = (setup.bmRequestType, setup.bRequest, setup.wValue);
        if self.refuse.contains(&request) {
            return Err(());
        }
        match (request_type, request) {
            (0x21, 0x09) => {
                self.output_reports.push((value, data.to_vec()));
                Ok(data.len())
            }
            _ => Err(()),
        }
    }

    /// Status stage; requests without a data stage take effect here
    fn status(&mut self) -> Result<(), ()> {
        let setup = self.pending.take().ok_or(())?;
        let (request_type, request, value, index, length) = (
            setup.bmRequestType,
            setup.bRequest,
            setup.wValue,
            setup.wIndex,
            setup.wLength,
        );
        if length != 0 {
            return Ok(());
        }
        if self.refuse.contains(&request) {
            return Err(());
        }
        match (request_type, request) {
            (0x00, 0x05) => self.address = value as u8,
            (0x00, 0x09) => self.configuration_value = Some(value as u8),
            (0x21, 0x0B) => self.protocol = Some((value, index)),
            (0x20, 0x01 | 0x03) if !self.ports.is_empty() => {}
            (0x23, 0x01 | 0x03) if !self.ports.is_empty() => {
                self.port_feature(request == 0x03, value, index)?;
            }
            _ => return Err(()),
        }
        Ok(())
    }

    fn port_feature(&mut self, set: bool, feature: u16, index: u16) -> Result<(), ()> {
        let slot = (index as usize).checked_sub(1).ok_or(())?;
        let port = self.ports.get_mut(slot).ok_or(())?;
        match (set, feature) {
            (true, 2) => port.suspended = true,
            (true, 4) => {
                if port.powered {
                    if let Some(device) = port.device.as_mut() {
                        device.reset();
                        port.enabled = true;
                        port.reset_change = true;
                    }
                }
            }
            (true, 8) => {
                port.powered = true;
                if port.device.is_some() {
                    port.connect_change = true;
                }
            }
            (false, 1) => port.enabled = false,
            (false, 2) => port.suspended = false,
            (false, 8) => port.powered = false,
            (false, 16) => port.connect_change = false,
            (false, 17) => port.enable_change = false,
            (false, 18 | 19) => {}
            (false, 20) => port.reset_change = false,
            _ => return Err(()),
        }
        Ok(())
    }
}

/// Register-level model of a DWC2 core in host mode
pub struct SimController {
    registers: HashMap<Reg, u32>,
    host_port: u32,
    /// Device on the root port
    pub root: Option<SimDevice>,
    /// Forced outcomes consumed one per launch
    pub outcomes: VecDeque<Outcome>,
    pub launches: Vec<Launch>,
}

impl SimController {
    /// Core with an empty root port
    pub fn new() -> Self {
        let mut registers = HashMap::new();
        registers.insert(Reg::VendorId, VENDOR_ID);
        registers.insert(Reg::UserId, 0x2708_A000);
        registers.insert(Reg::Hardware2, HARDWARE2);
        Self {
            registers,
            host_port: 0,
            root: None,
            outcomes: VecDeque::new(),
            launches: Vec::new(),
        }
    }

    /// Core with `device` plugged into the root port
    pub fn with_root(device: SimDevice) -> Self {
        let mut sim = Self::new();
        sim.attach_root(device);
        sim
    }

    /// Override a plain register value
    pub fn set_register(&mut self, reg: Reg, value: u32) {
        self.registers.insert(reg, value);
    }

    /// Plug `device` into the root port
    pub fn attach_root(&mut self, device: SimDevice) {
        self.root = Some(device);
        self.host_port |= HostPort::CONNECT_CHANGED.bits();
    }

    /// Unplug the root port device
    pub fn detach_root(&mut self) -> Option<SimDevice> {
        self.host_port &= !HostPort::ENABLE.bits();
        self.host_port |= HostPort::CONNECT_CHANGED.bits();
        self.root.take()
    }

    /// The root port device
    pub fn root_device(&mut self) -> &mut SimDevice {
        self.root.as_mut().expect("nothing on the root port")
    }

    /// Raw host port register as the core holds it
    pub fn host_port(&self) -> HostPort {
        HostPort::from_bits_retain(self.read_host_port())
    }

    /// Launches that went to bus address `address`
    pub fn launches_to(&self, address: u8) -> Vec<Launch> {
        self.launches
            .iter()
            .copied()
            .filter(|l| l.address == address)
            .collect()
    }

    fn read_host_port(&self) -> u32 {
        let mut value = self.host_port;
        if let Some(device) = &self.root {
            value |= HostPort::CONNECT.bits();
            value |= (device.speed as u32) << host_port::SPEED_SHIFT;
        }
        value
    }

    fn write_host_port(&mut self, value: u32) {
        let clear_on_write = (HostPort::CONNECT_CHANGED
            | HostPort::ENABLE_CHANGED
            | HostPort::OVERCURRENT_CHANGED)
            .bits();
        let held = (HostPort::RESUME | HostPort::SUSPEND | HostPort::RESET | HostPort::POWER).bits()
            | host_port::TEST_CONTROL_MASK;

        let mut next = self.host_port & !(value & clear_on_write);
        if value & HostPort::ENABLE.bits() != 0 {
            next &= !HostPort::ENABLE.bits();
        }
        let was_resetting = next & HostPort::RESET.bits() != 0;
        next = (next & !held) | (value & held);

        if was_resetting && value & HostPort::RESET.bits() == 0 {
            if let Some(device) = self.root.as_mut() {
                device.reset();
                next |= HostPort::ENABLE.bits();
            }
        }
        self.host_port = next;
    }

    fn root_enabled(&self) -> bool {
        self.host_port & HostPort::ENABLE.bits() != 0
    }

    fn device_mut(&mut self, address: u8) -> Option<&mut SimDevice> {
        if !self.root_enabled() {
            return None;
        }
        self.root.as_mut().and_then(|d| d.find_mut(address))
    }

    fn transact(&mut self, channel: u8, characteristic: u32, size: u32, buffer: &mut [u8]) -> ChannelInterrupt {
        let address = hcchar::device_address(characteristic);
        let direction_in = characteristic & hcchar::DIRECTION_IN != 0;
        let pid = hctsiz::pid(size);
        let length = (hctsiz::size(size) as usize).min(buffer.len());

        let Some(device) = self.device_mut(address) else {
            return ChannelInterrupt::TRANSACTION_ERROR;
        };
        let result = if pid == SETUP_PID {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buffer[..8]);
            device.setup(SetupPacket::from_bytes(&raw));
            Ok(8)
        } else if length == 0 {
            device.status().map(|_| 0)
        } else if direction_in {
            device.data_in(&mut buffer[..length])
        } else {
            device.data_out(&buffer[..length])
        };

        match result {
            Ok(moved) => {
                let remaining = (hctsiz::size(size) as usize).saturating_sub(moved) as u32;
                self.registers.insert(
                    Reg::Channel(channel, ChannelReg::TransferSize),
                    hctsiz::encode(remaining, 0, pid),
                );
                ChannelInterrupt::ACK | ChannelInterrupt::TRANSFER_COMPLETE
            }
            Err(()) => ChannelInterrupt::STALL,
        }
    }
}

impl Default for SimController {
    fn default() -> Self {
        Self::new()
    }
}

impl HostHardware for SimController {
    fn read(&mut self, reg: Reg) -> u32 {
        match reg {
            Reg::HostPort => self.read_host_port(),
            Reg::CoreReset => {
                self.registers.get(&reg).copied().unwrap_or(0) | CoreReset::AHB_IDLE.bits()
            }
            _ => self.registers.get(&reg).copied().unwrap_or(0),
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::HostPort => self.write_host_port(value),
            Reg::CoreReset => {
                let self_clearing =
                    (CoreReset::CORE_SOFT | CoreReset::TX_FIFO_FLUSH | CoreReset::RX_FIFO_FLUSH).bits();
                self.registers.insert(reg, value & !self_clearing);
            }
            Reg::Channel(_, ChannelReg::Characteristic) => {
                // Channels halt immediately
                self.registers.insert(reg, value & !hcchar::ENABLE);
            }
            Reg::Channel(_, ChannelReg::Interrupt) => {
                let current = self.registers.get(&reg).copied().unwrap_or(0);
                self.registers.insert(reg, current & !value);
            }
            _ => {
                self.registers.insert(reg, value);
            }
        }
    }

    fn launch_channel(&mut self, channel: u8, buffer: &mut [u8]) {
        let characteristic = self.read(Reg::Channel(channel, ChannelReg::Characteristic));
        let size = self.read(Reg::Channel(channel, ChannelReg::TransferSize));
        let split = self.read(Reg::Channel(channel, ChannelReg::SplitControl));

        let split_target = (split & hcsplt::SPLIT_ENABLE != 0).then(|| {
            (
                ((split & hcsplt::HUB_MASK) >> hcsplt::HUB_SHIFT) as u8,
                ((split & hcsplt::PORT_MASK) >> hcsplt::PORT_SHIFT) as u8,
            )
        });
        let complete_split = split & hcsplt::COMPLETE_SPLIT != 0;
        self.launches.push(Launch {
            address: hcchar::device_address(characteristic),
            low_speed: characteristic & hcchar::LOW_SPEED != 0,
            split: split_target,
            complete_split,
        });

        let interrupt = Reg::Channel(channel, ChannelReg::Interrupt);
        let flags = match self.outcomes.pop_front() {
            Some(Outcome::Silent) => {
                self.registers.insert(interrupt, 0);
                return;
            }
            Some(Outcome::Flags(flags)) => flags,
            // The hub's transaction translator accepts the start-split
            None if split_target.is_some() && !complete_split => ChannelInterrupt::ACK,
            None => self.transact(channel, characteristic, size, buffer),
        };
        self.registers
            .insert(interrupt, (flags | ChannelInterrupt::HALT).bits());
    }
}

/// Board platform with a simulated 1 MHz clock
///
/// Every delay advances the clock, and every tick read advances it by one so
/// register polls always make progress toward their timeouts.
pub struct SimPlatform {
    now: Cell<u64>,
    pub powered: bool,
    pub fail_power: bool,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0),
            powered: false,
            fail_power: false,
        }
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayNs for SimPlatform {
    fn delay_ns(&mut self, ns: u32) {
        let us = (ns as u64 / 1000).max(1);
        self.now.set(self.now.get() + us);
    }
}

impl Platform for SimPlatform {
    fn ticks(&self) -> u64 {
        let now = self.now.get() + 1;
        self.now.set(now);
        now
    }

    fn set_power(&mut self, on: bool) -> dwc2_usbh::Result<()> {
        if self.fail_power {
            return Err(UsbError::General);
        }
        self.powered = on;
        Ok(())
    }
}
