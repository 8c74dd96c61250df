#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

//! Polled USB 2.0 host driver for Synopsys DesignWare (DWC2) OTG cores
//!
//! The driver runs without interrupts: every transfer is started on a host
//! channel and then polled to completion. The single physical port of the
//! core is presented as a one-port root hub so that devices on the root port
//! and devices behind external hubs enumerate through the same code path.
//!
//! # Getting started
//!
//! 1. Implement [`HostHardware`] for your register block (or wrap it in
//!    [`Mmio`]) and [`Platform`] for your board's delay, timer and power.
//! 2. Build a [`UsbHost`] and call [`UsbHost::initialize`] to bring up the
//!    core and enumerate the bus.
//! 3. Call [`UsbHost::check_for_change`] periodically to pick up hotplug.
//!
//! # Core Components
//!
//! - [`dwc`] - register map and controller bring-up
//! - [`transfer`] - channel transfer engine and control messages
//! - [`root_hub`] - emulated root hub answering on the bus address
//! - [`registry`] - fixed device, hub and HID pools
//! - [`enumeration`] - addressing and configuring new devices
//! - [`hub`] - hub class: port status, reset and change polling
//! - [`hid`] - HID class requests
//! - [`error`] - error type shared by every operation

#[cfg(feature = "defmt")]
use defmt as _;

pub mod config;
pub mod descriptor;
pub mod dwc;
pub mod enumeration;
pub mod error;
pub mod hid;
pub mod hub;
pub mod platform;
pub mod registry;
pub mod root_hub;
pub mod transfer;
pub mod tree;

pub use config::HostConfig;
pub use dwc::controller::Dwc2Controller;
pub use dwc::{HostHardware, Mmio};
pub use enumeration::ROOT_HUB_ADDRESS;
pub use error::{Result, UsbError};
pub use platform::Platform;
pub use registry::{DeviceRegistry, DeviceStatus, ParentLink, UsbDevice};
pub use transfer::{DeviceSpeed, Direction, PacketSize, Pipe, PipeControl, SetupPacket, TransferType};

/// USB host: the controller plus the devices enumerated on its bus
pub struct UsbHost<H, P> {
    pub(crate) controller: Dwc2Controller<H, P>,
    pub(crate) registry: DeviceRegistry,
}

impl<H: HostHardware, P: Platform> UsbHost<H, P> {
    /// Create a host over `hw`; nothing touches the hardware until
    /// [`UsbHost::initialize`]
    pub const fn new(hw: H, platform: P, config: HostConfig) -> Self {
        Self {
            controller: Dwc2Controller::new(hw, platform, config),
            registry: DeviceRegistry::new(),
        }
    }

    /// Underlying controller
    pub fn controller(&self) -> &Dwc2Controller<H, P> {
        &self.controller
    }

    /// Underlying controller, for raw transfers
    pub fn controller_mut(&mut self) -> &mut Dwc2Controller<H, P> {
        &mut self.controller
    }

    /// Device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Poll every hub on the bus for port changes
    ///
    /// Newly connected devices are enumerated and disconnected ones released
    /// together with everything behind them.
    pub fn check_for_change(&mut self) {
        if self.registry.device(ROOT_HUB_ADDRESS).is_some() {
            self.hub_check_for_change(ROOT_HUB_ADDRESS);
        }
    }

    /// Device record at `address`
    pub fn device_at(&self, address: u8) -> Option<&UsbDevice> {
        self.registry.device(address)
    }

    /// The root hub record, once attached
    pub fn root_hub(&self) -> Option<&UsbDevice> {
        self.registry.device(ROOT_HUB_ADDRESS)
    }

    /// Address of the device on `port` (zero-based) of `hub`
    pub fn device_on_port(&self, hub: u8, port: u8) -> Option<u8> {
        self.registry.child(hub, port)
    }

    /// Child addresses of hub `address`, indexed by zero-based port
    pub fn hub_children(&self, address: u8) -> Option<&[Option<u8>]> {
        self.registry.hub(address).map(|hub| {
            let ports = (hub.max_children as usize).min(hub.children.len());
            &hub.children[..ports]
        })
    }

    /// Hub and port `address` is attached to; `None` for the root hub
    pub fn parent_of(&self, address: u8) -> Option<ParentLink> {
        self.registry.device(address).and_then(|d| d.parent)
    }

    /// True when `address` is an enumerated hub
    pub fn is_hub(&self, address: u8) -> bool {
        self.registry.is_hub(address)
    }

    /// True when `address` carries HID interfaces
    pub fn is_hid(&self, address: u8) -> bool {
        self.registry.is_hid(address)
    }

    /// True when `address` is a mass storage device
    pub fn is_mass_storage(&self, address: u8) -> bool {
        self.registry.is_mass_storage(address)
    }

    /// True when the first interface of `address` is a boot mouse
    pub fn is_mouse(&self, address: u8) -> bool {
        self.registry.is_mouse(address)
    }

    /// True when the first interface of `address` is a boot keyboard
    pub fn is_keyboard(&self, address: u8) -> bool {
        self.registry.is_keyboard(address)
    }

    /// Release every device and power the USB block down
    pub fn power_off(&mut self) -> Result<()> {
        if self.registry.device(ROOT_HUB_ADDRESS).is_some() {
            self.registry.deallocate_device(ROOT_HUB_ADDRESS);
        }
        self.controller.set_root_hub_address(None);
        log::info!("USBD: Powering off");
        self.controller.power_off()
    }
}
