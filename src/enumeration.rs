//! USB device enumeration
//!
//! Handles device detection, addressing and configuration, then hands hubs
//! and HID devices to their class continuations. The emulated root hub goes
//! through the same steps as any physical device; only the second port reset
//! is skipped for it.

use crate::config::{CONTROL_BUFFER_SIZE, CONTROL_CHANNEL};
use crate::descriptor::{
    parse_configuration, ConfigurationDescriptor, DescriptorType, DeviceClass, DeviceDescriptor,
};
use crate::dwc::HostHardware;
use crate::error::{Result, UsbError};
use crate::platform::Platform;
use crate::registry::{DeviceStatus, ParentLink, Payload, UsbDevice};
use crate::transfer::control::request_type;
use crate::transfer::{DeviceSpeed, Direction, PacketSize, Pipe, PipeControl, SetupPacket};
use crate::UsbHost;

/// Address of the emulated root hub, the first registry slot
pub const ROOT_HUB_ADDRESS: u8 = 1;

/// Maximum string length kept when logging device strings
const STRING_CAPACITY: usize = 64;

impl<H: HostHardware, P: Platform> UsbHost<H, P> {
    /// Bring the controller up and enumerate the whole bus
    pub fn initialize(&mut self) -> Result<()> {
        if let Err(e) = self.controller.initialise() {
            log::error!("USBD: HCD failed to initialise: {}", e);
            return Err(e);
        }
        if let Err(e) = self.controller.start() {
            log::error!("USBD: Abort, HCD failed to start: {}", e);
            return Err(e);
        }
        if let Err(e) = self.attach_root_hub() {
            log::error!("USBD: Failed to enumerate devices: {}", e);
            return Err(e);
        }

        #[cfg(feature = "defmt")]
        defmt::info!("USBD: bus enumerated, {} devices", self.registry.device_count());

        Ok(())
    }

    /// Allocate the emulated root hub and enumerate everything behind it
    ///
    /// A root hub left over from an earlier attach is torn down first,
    /// together with its subtree.
    pub fn attach_root_hub(&mut self) -> Result<()> {
        log::debug!("USBD: Allocating root hub");
        if self.registry.device(ROOT_HUB_ADDRESS).is_some() {
            self.registry.deallocate_device(ROOT_HUB_ADDRESS);
        }

        let address = self.registry.allocate_device()?;
        if address != ROOT_HUB_ADDRESS {
            log::error!("USBD: Root hub landed at address {}", address);
            self.registry.deallocate_device(address);
            return Err(UsbError::Internal);
        }
        if let Some(root) = self.registry.device_mut(address) {
            root.pipe0.speed = DeviceSpeed::Full;
            root.pipe0.max_size = PacketSize::Bits64;
            root.status = DeviceStatus::Powered;
        }

        // Answers on address 0 until enumeration moves it
        self.controller.set_root_hub_address(Some(0));
        if let Err(e) = self.enumerate_device(address, None) {
            self.registry.deallocate_device(address);
            self.controller.set_root_hub_address(None);
            return Err(e);
        }
        Ok(())
    }

    /// Enumerate the freshly allocated device at `address`
    ///
    /// `parent` is the hub and zero-based port the device hangs off, or
    /// `None` for the root hub. On failure the caller releases the device.
    pub(crate) fn enumerate_device(&mut self, address: u8, parent: Option<ParentLink>) -> Result<()> {
        let mut pipe = self
            .registry
            .device(address)
            .map(|d| d.pipe0)
            .ok_or(UsbError::DeviceNumber)?;

        // Step 1: first 8 bytes of the device descriptor at address 0
        pipe.address = 0;
        pipe.max_size = PacketSize::Bits8;
        let mut raw = [0u8; DeviceDescriptor::SIZE];
        let control = PipeControl::control(CONTROL_CHANNEL, Direction::In);
        let setup = SetupPacket::get_descriptor(
            request_type::DEVICE_IN,
            DescriptorType::Device as u8,
            0,
            0,
            8,
        );
        match self
            .controller
            .submit_control_message(&pipe, &control, Some(&mut raw[..8]), &setup)
        {
            Ok(8) => {}
            Ok(n) => {
                log::warn!("USBD: Enumeration step 1 on device {} read {} bytes", address, n);
                return Err(UsbError::Device);
            }
            Err(e) => {
                log::warn!("USBD: Enumeration step 1 on device {} failed: {}", address, e);
                return Err(e);
            }
        }
        pipe.max_size = PacketSize::from_number(raw[7] as u16);
        self.update_device(address, |d| {
            d.pipe0.max_size = pipe.max_size;
            d.status = DeviceStatus::Default;
        });

        // Step 2: second port reset, not possible on the emulated root
        if let Some(link) = parent {
            if let Err(e) = self.hub_port_reset(link.hub, link.port) {
                log::warn!("USBD: Failed to reset port again for new device {}", address);
                return Err(e);
            }
        }

        // Step 3: move the device to its slot address
        self.controller.set_address(&pipe, address).map_err(|e| {
            log::warn!("USBD: Failed to assign address to {:#x}", address);
            e
        })?;
        pipe.address = address;
        self.controller.platform.delay_ms(10);
        self.update_device(address, |d| {
            d.pipe0.address = address;
            d.status = DeviceStatus::Addressed;
        });

        // Step 4: full device descriptor
        let descriptor = match self.controller.get_descriptor(
            &pipe,
            DescriptorType::Device as u8,
            0,
            0,
            &mut raw,
            request_type::DEVICE_IN,
            true,
        ) {
            Ok(n) if n == DeviceDescriptor::SIZE => DeviceDescriptor::from_bytes(&raw),
            Ok(_) => None,
            Err(e) => {
                log::warn!("USBD: Enumeration step 4 on device {} failed: {}", address, e);
                return Err(e);
            }
        }
        .ok_or(UsbError::Device)?;
        log::debug!("USBD: Device: {}, Class: {}", address, descriptor.b_device_class);
        self.update_device(address, |d| d.descriptor = descriptor);

        // Step 5: configuration header, then the whole configuration
        let mut header = [0u8; ConfigurationDescriptor::SIZE];
        let config = match self.controller.get_descriptor(
            &pipe,
            DescriptorType::Configuration as u8,
            0,
            0,
            &mut header,
            request_type::DEVICE_IN,
            true,
        ) {
            Ok(n) if n == ConfigurationDescriptor::SIZE => {
                ConfigurationDescriptor::from_bytes(&header)
            }
            _ => None,
        };
        let Some(config) = config else {
            log::warn!("USBD: Error reading configuration descriptor for device: {}", address);
            return Err(UsbError::Device);
        };

        let total = config.w_total_length as usize;
        if !(ConfigurationDescriptor::SIZE..=CONTROL_BUFFER_SIZE).contains(&total) {
            log::warn!(
                "USBD: Configuration of device {} has unusable length {}",
                address,
                total
            );
            return Err(UsbError::Device);
        }
        let mut blob = [0u8; CONTROL_BUFFER_SIZE];
        let setup = SetupPacket::get_descriptor(
            request_type::DEVICE_IN,
            DescriptorType::Configuration as u8,
            0,
            0,
            total as u16,
        );
        match self
            .controller
            .submit_control_message(&pipe, &control, Some(&mut blob[..total]), &setup)
        {
            Ok(n) if n == total => {}
            Ok(n) => {
                log::warn!(
                    "USBD: Failed to read configuration descriptor for device {}, {} bytes read",
                    address,
                    n
                );
                return Err(UsbError::Device);
            }
            Err(e) => {
                log::warn!(
                    "USBD: Failed to read configuration descriptor for device {}: {}",
                    address,
                    e
                );
                return Err(e);
            }
        }

        let parsed = parse_configuration(&blob[..total]);
        let is_hub = descriptor.device_class() == Some(DeviceClass::Hub);
        let is_mass_storage = descriptor.device_class() == Some(DeviceClass::MassStorage)
            || parsed.interfaces.first().is_some_and(|i| {
                i.descriptor.b_interface_class == DeviceClass::MassStorage as u8
            });
        let hid_count = parsed.hids.len();
        let interface_count = parsed.interfaces.len();
        self.update_device(address, |d| {
            d.interfaces = parsed.interfaces;
            d.config_string_index = config.i_configuration;
        });
        if hid_count > 0 && !is_hub {
            self.registry.add_hid_payload(address).map_err(|e| {
                log::warn!("USBD: Could not allocate hid payload, {}", e);
                e
            })?;
            if let Some(payload) = self.registry.hid_mut(address) {
                payload.entries = parsed.hids;
                payload.max_hid = hid_count as u8;
            }
        } else if is_mass_storage && !is_hub {
            self.update_device(address, |d| d.payload = Payload::MassStorage);
        }

        // Step 6: select the configuration
        self.controller
            .set_configuration(&pipe, config.b_configuration_value)?;
        self.update_device(address, |d| {
            d.config_index = config.b_configuration_value;
            d.status = DeviceStatus::Configured;
        });

        log::info!(
            "USBD: Attach Device {}. Address:{} Class:{} USB:{:x}.{:x}, {} configuration(s), {} interface(s)",
            self.description(address),
            address,
            descriptor.b_device_class,
            descriptor.bcd_usb >> 8,
            descriptor.bcd_usb & 0xFF,
            descriptor.b_num_configurations,
            interface_count
        );
        self.log_device_strings(&pipe, &descriptor, config.i_configuration);

        // Step 7: class continuation
        if is_hub {
            if let Err(e) = self.enumerate_hub(address) {
                log::warn!("USBD: Could not enumerate HUB device {}: {}", address, e);
                return Err(e);
            }
        } else if hid_count > 0 {
            self.enumerate_hid(address);
        }

        Ok(())
    }

    fn update_device<F>(&mut self, address: u8, f: F)
    where
        F: FnOnce(&mut UsbDevice),
    {
        if let Some(device) = self.registry.device_mut(address) {
            f(device);
        }
    }

    /// Log product, manufacturer, serial and configuration strings
    fn log_device_strings(
        &mut self,
        pipe: &Pipe,
        descriptor: &DeviceDescriptor,
        config_string: u8,
    ) {
        let strings = [
            ("Product", descriptor.i_product),
            ("Manufacturer", descriptor.i_manufacturer),
            ("SerialNumber", descriptor.i_serial_number),
            ("Configuration", config_string),
        ];
        for (label, index) in strings {
            if index == 0 {
                continue;
            }
            if let Ok(text) = self
                .controller
                .read_string_descriptor::<STRING_CAPACITY>(pipe, index)
            {
                log::info!("USBD:  -{}: {}", label, text.as_str());
            }
        }
    }

    /// HID class continuation: log each HID and probe its report descriptor
    fn enumerate_hid(&mut self, address: u8) {
        let Some(entries) = self.registry.hid(address).map(|h| h.entries.clone()) else {
            return;
        };
        for (index, entry) in entries.iter().enumerate() {
            let hid = &entry.descriptor;
            let (protocol, number) = self
                .registry
                .device(address)
                .and_then(|d| d.interfaces.get(entry.interface as usize))
                .map_or((0, 0), |i| {
                    (i.descriptor.b_interface_protocol, i.descriptor.b_interface_number)
                });
            log::info!(
                "USBD: HID details: Version: {:04x}, Language: {} Descriptions: {}, Type: {}, Protocol: {}, NumInterface: {}",
                hid.bcd_hid,
                hid.b_country_code,
                hid.b_num_descriptors,
                hid.b_report_type,
                protocol,
                number
            );

            let mut report = [0u8; CONTROL_BUFFER_SIZE];
            if self
                .hid_read_descriptor(address, index as u8, &mut report)
                .is_ok()
            {
                log::debug!(
                    "USBD: HID REPORT> Page usage: 0x{:02x}{:02x}, Usage: 0x{:02x}{:02x}, Collection: 0x{:02x}{:02x}",
                    report[0],
                    report[1],
                    report[2],
                    report[3],
                    report[4],
                    report[5]
                );
                log::trace!("USBD: HID report bytes: {:02x?}", &report[6..52]);
            }
        }
    }
}
