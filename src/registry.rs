//! Device, hub and HID record pools
//!
//! Three fixed arenas replace per-device heap objects. A device is named by
//! its address, which is its slot index plus one, so address 0 is never a
//! real device. Hub payloads own their children: tearing down a hub tears
//! down its subtree first. A child only records its parent's address and
//! port, which is never followed during teardown.

use heapless::Vec;

use crate::config::{
    MAX_CHILDREN_PER_DEVICE, MAX_DEVICES, MAX_HIDS, MAX_HID_PER_DEVICE, MAX_HUBS,
    MAX_INTERFACES_PER_DEVICE,
};
use crate::descriptor::{DeviceClass, DeviceDescriptor, HidEntry, HubDescriptor, Interface};
use crate::error::{Result, UsbError};
use crate::transfer::Pipe;

/// Device lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceStatus {
    /// Slot allocated, nothing known yet
    #[default]
    Attached,
    /// Port powered (root hub only)
    Powered,
    /// Responding at address 0
    Default,
    /// Permanent address assigned
    Addressed,
    /// Configuration selected
    Configured,
}

/// Class payload attached to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Payload {
    /// No class data
    #[default]
    None,
    /// Index into the hub pool
    Hub(usize),
    /// Index into the HID pool
    Hid(usize),
    /// Bulk-only storage; classification only
    MassStorage,
}

/// Where a device hangs off its parent hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParentLink {
    /// Parent hub address
    pub hub: u8,
    /// Zero-based port on the parent hub
    pub port: u8,
}

/// One device on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    /// Permanent address, slot index plus one
    pub number: u8,
    /// Control pipe; its address is 0 while the device is being addressed
    pub pipe0: Pipe,
    /// Enumeration progress
    pub status: DeviceStatus,
    /// Device descriptor, zeroed until step 4 of enumeration
    pub descriptor: DeviceDescriptor,
    /// Interfaces of the selected configuration
    pub interfaces: Vec<Interface, MAX_INTERFACES_PER_DEVICE>,
    /// Class data, if the device is a hub or HID
    pub payload: Payload,
    /// Upstream hub and zero-based port; `None` for the root hub
    pub parent: Option<ParentLink>,
    /// Selected configuration value
    pub config_index: u8,
    /// String index of the selected configuration
    pub config_string_index: u8,
}

impl UsbDevice {
    fn new(number: u8) -> Self {
        Self {
            number,
            pipe0: Pipe {
                address: number,
                ..Pipe::default()
            },
            status: DeviceStatus::Attached,
            descriptor: DeviceDescriptor::default(),
            interfaces: Vec::new(),
            payload: Payload::None,
            parent: None,
            config_index: 0,
            config_string_index: 0,
        }
    }

    /// Device class from the device descriptor
    pub fn class(&self) -> Option<DeviceClass> {
        self.descriptor.device_class()
    }
}

/// Hub class payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubPayload {
    /// Hub class descriptor
    pub descriptor: HubDescriptor,
    /// Child device addresses, indexed by zero-based port
    pub children: [Option<u8>; MAX_CHILDREN_PER_DEVICE],
    /// Ports in use
    pub max_children: u8,
}

/// HID class payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidPayload {
    /// HID descriptors with the interface each belongs to
    pub entries: Vec<HidEntry, MAX_HID_PER_DEVICE>,
    /// HID descriptors in use
    pub max_hid: u8,
}

/// Fixed-capacity device, hub and HID pools
pub struct DeviceRegistry {
    devices: [Option<UsbDevice>; MAX_DEVICES],
    hubs: [Option<HubPayload>; MAX_HUBS],
    hids: [Option<HidPayload>; MAX_HIDS],
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Empty pools
    pub const fn new() -> Self {
        Self {
            devices: [const { None }; MAX_DEVICES],
            hubs: [const { None }; MAX_HUBS],
            hids: [const { None }; MAX_HIDS],
        }
    }

    #[inline]
    fn slot(address: u8) -> Option<usize> {
        let address = address as usize;
        (address > 0 && address <= MAX_DEVICES).then(|| address - 1)
    }

    /// Claim the first free device slot
    pub fn allocate_device(&mut self) -> Result<u8> {
        let index = self
            .devices
            .iter()
            .position(Option::is_none)
            .ok_or(UsbError::Memory)?;
        let number = (index + 1) as u8;
        self.devices[index] = Some(UsbDevice::new(number));
        Ok(number)
    }

    /// Release a device and, for a hub, its whole subtree
    ///
    /// The parent's child entry is cleared only if it still points at this
    /// device on the recorded port.
    pub fn deallocate_device(&mut self, address: u8) {
        let Some(index) = Self::slot(address) else {
            return;
        };
        let Some(device) = self.devices[index].as_ref() else {
            return;
        };
        let payload = device.payload;
        let parent = device.parent;

        match payload {
            Payload::Hub(_) => self.remove_hub_payload(address),
            Payload::Hid(_) => self.remove_hid_payload(address),
            _ => {}
        }

        if let Some(link) = parent {
            if let Some(hub) = self.hub_mut(link.hub) {
                if let Some(child) = hub.children.get_mut(link.port as usize) {
                    if *child == Some(address) {
                        *child = None;
                    }
                }
            }
        }

        self.devices[index] = None;
    }

    /// Attach an empty hub payload to a device without one
    pub fn add_hub_payload(&mut self, address: u8) -> Result<()> {
        let device = self.device_mut(address).ok_or(UsbError::DeviceNumber)?;
        if device.payload != Payload::None {
            return Err(UsbError::Argument);
        }
        let index = self
            .hubs
            .iter()
            .position(Option::is_none)
            .ok_or(UsbError::Memory)?;
        self.hubs[index] = Some(HubPayload {
            descriptor: HubDescriptor::default(),
            children: [None; MAX_CHILDREN_PER_DEVICE],
            max_children: MAX_CHILDREN_PER_DEVICE as u8,
        });
        if let Some(device) = self.device_mut(address) {
            device.payload = Payload::Hub(index);
        }
        Ok(())
    }

    /// Attach an empty HID payload to a device without one
    pub fn add_hid_payload(&mut self, address: u8) -> Result<()> {
        let device = self.device_mut(address).ok_or(UsbError::DeviceNumber)?;
        if device.payload != Payload::None {
            return Err(UsbError::Argument);
        }
        let index = self
            .hids
            .iter()
            .position(Option::is_none)
            .ok_or(UsbError::Memory)?;
        self.hids[index] = Some(HidPayload {
            entries: Vec::new(),
            max_hid: MAX_HID_PER_DEVICE as u8,
        });
        if let Some(device) = self.device_mut(address) {
            device.payload = Payload::Hid(index);
        }
        Ok(())
    }

    /// Release a hub payload after releasing every child
    pub fn remove_hub_payload(&mut self, address: u8) {
        let Some(Payload::Hub(index)) = self.device(address).map(|d| d.payload) else {
            return;
        };
        if let Some(children) = self.hubs[index].as_ref().map(|h| h.children) {
            for child in children.into_iter().flatten() {
                self.deallocate_device(child);
            }
        }
        self.hubs[index] = None;
        if let Some(device) = self.device_mut(address) {
            device.payload = Payload::None;
        }
    }

    /// Release a HID payload
    pub fn remove_hid_payload(&mut self, address: u8) {
        let Some(Payload::Hid(index)) = self.device(address).map(|d| d.payload) else {
            return;
        };
        self.hids[index] = None;
        if let Some(device) = self.device_mut(address) {
            device.payload = Payload::None;
        }
    }

    /// Device at `address`, if the slot is in use
    pub fn device(&self, address: u8) -> Option<&UsbDevice> {
        Self::slot(address).and_then(|i| self.devices[i].as_ref())
    }

    /// Mutable device at `address`
    pub fn device_mut(&mut self, address: u8) -> Option<&mut UsbDevice> {
        Self::slot(address).and_then(move |i| self.devices[i].as_mut())
    }

    /// Hub payload of the device at `address`
    pub fn hub(&self, address: u8) -> Option<&HubPayload> {
        match self.device(address)?.payload {
            Payload::Hub(index) => self.hubs[index].as_ref(),
            _ => None,
        }
    }

    /// Mutable hub payload of the device at `address`
    pub fn hub_mut(&mut self, address: u8) -> Option<&mut HubPayload> {
        match self.device(address)?.payload {
            Payload::Hub(index) => self.hubs[index].as_mut(),
            _ => None,
        }
    }

    /// HID payload of the device at `address`
    pub fn hid(&self, address: u8) -> Option<&HidPayload> {
        match self.device(address)?.payload {
            Payload::Hid(index) => self.hids[index].as_ref(),
            _ => None,
        }
    }

    /// Mutable HID payload of the device at `address`
    pub fn hid_mut(&mut self, address: u8) -> Option<&mut HidPayload> {
        match self.device(address)?.payload {
            Payload::Hid(index) => self.hids[index].as_mut(),
            _ => None,
        }
    }

    /// Child on zero-based `port` of the hub at `address`
    pub fn child(&self, address: u8, port: u8) -> Option<u8> {
        self.hub(address)?
            .children
            .get(port as usize)
            .copied()
            .flatten()
    }

    /// Record `child` on zero-based `port` of the hub at `address`
    pub fn set_child(&mut self, address: u8, port: u8, child: Option<u8>) {
        if let Some(slot) = self
            .hub_mut(address)
            .and_then(|hub| hub.children.get_mut(port as usize))
        {
            *slot = child;
        }
    }

    /// Device carries a hub payload
    pub fn is_hub(&self, address: u8) -> bool {
        matches!(self.device(address).map(|d| d.payload), Some(Payload::Hub(_)))
    }

    /// Device carries a HID payload
    pub fn is_hid(&self, address: u8) -> bool {
        matches!(self.device(address).map(|d| d.payload), Some(Payload::Hid(_)))
    }

    /// Device is tagged as mass storage
    pub fn is_mass_storage(&self, address: u8) -> bool {
        matches!(self.device(address).map(|d| d.payload), Some(Payload::MassStorage))
    }

    /// HID device whose first interface uses the boot protocol `protocol`
    fn hid_protocol_is(&self, address: u8, protocol: u8) -> bool {
        self.is_hid(address)
            && self
                .device(address)
                .and_then(|d| d.interfaces.first())
                .is_some_and(|i| i.descriptor.b_interface_protocol == protocol)
    }

    /// HID boot mouse
    pub fn is_mouse(&self, address: u8) -> bool {
        self.hid_protocol_is(address, 2)
    }

    /// HID boot keyboard
    pub fn is_keyboard(&self, address: u8) -> bool {
        self.hid_protocol_is(address, 1)
    }

    /// Devices currently allocated
    pub fn devices(&self) -> impl Iterator<Item = &UsbDevice> {
        self.devices.iter().flatten()
    }

    /// Device slots in use
    pub fn device_count(&self) -> usize {
        self.devices.iter().filter(|d| d.is_some()).count()
    }

    /// Hub payload slots in use
    pub fn hub_count(&self) -> usize {
        self.hubs.iter().filter(|h| h.is_some()).count()
    }

    /// HID payload slots in use
    pub fn hid_count(&self) -> usize {
        self.hids.iter().filter(|h| h.is_some()).count()
    }
}
