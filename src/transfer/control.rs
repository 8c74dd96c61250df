//! USB control messages
//!
//! A control transfer is three channel transactions on channel 0: an 8-byte
//! SETUP, an optional DATA stage, and a zero-length STATUS stage in the
//! opposite direction. Messages addressed to the emulated root hub never reach
//! the hardware.

use heapless::String;

use super::{Direction, PacketId, Pipe, PipeControl};
use crate::config::{CONTROL_BUFFER_SIZE, CONTROL_CHANNEL};
use crate::descriptor::{DescriptorHeader, DescriptorType};
use crate::dwc::controller::Dwc2Controller;
use crate::dwc::HostHardware;
use crate::error::{Result, UsbError};
use crate::platform::Platform;

/// Standard and class request codes
#[allow(missing_docs)]
pub mod request {
    pub const GET_STATUS: u8 = 0x00;
    pub const CLEAR_FEATURE: u8 = 0x01;
    pub const SET_FEATURE: u8 = 0x03;
    pub const SET_ADDRESS: u8 = 0x05;
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const GET_CONFIGURATION: u8 = 0x08;
    pub const SET_CONFIGURATION: u8 = 0x09;
}

/// bmRequestType values used by the driver
pub mod request_type {
    /// Host-to-device, standard, device
    pub const DEVICE_OUT: u8 = 0x00;
    /// Device-to-host, standard, device
    pub const DEVICE_IN: u8 = 0x80;
    /// Device-to-host, standard, interface
    pub const INTERFACE_IN: u8 = 0x81;
    /// Device-to-host, standard, endpoint
    pub const ENDPOINT_IN: u8 = 0x82;
    /// Host-to-device, standard, interface
    pub const INTERFACE_OUT: u8 = 0x01;
    /// Host-to-device, standard, endpoint
    pub const ENDPOINT_OUT: u8 = 0x02;
    /// Host-to-device, class, device (hub feature)
    pub const HUB_OUT: u8 = 0x20;
    /// Device-to-host, class, device (hub status and descriptor)
    pub const HUB_IN: u8 = 0xA0;
    /// Host-to-device, class, other (port feature)
    pub const PORT_OUT: u8 = 0x23;
    /// Device-to-host, class, other (port status)
    pub const PORT_IN: u8 = 0xA3;
    /// Host-to-device, class, interface (HID)
    pub const CLASS_INTERFACE_OUT: u8 = 0x21;
    /// Device-to-host, class, interface (HID)
    pub const CLASS_INTERFACE_IN: u8 = 0xA1;
}

/// USB language id for US English
pub const LANGUAGE_US_ENGLISH: u16 = 0x0409;

/// USB Setup packet per USB 2.0 specification
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_snake_case)] // USB spec field names
pub struct SetupPacket {
    /// Request type and direction
    pub bmRequestType: u8,
    /// Specific request
    pub bRequest: u8,
    /// Request-specific value
    pub wValue: u16,
    /// Request-specific index
    pub wIndex: u16,
    /// Data transfer length
    pub wLength: u16,
}

impl SetupPacket {
    /// Build an arbitrary request
    pub const fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            bmRequestType: request_type,
            bRequest: request,
            wValue: value,
            wIndex: index,
            wLength: length,
        }
    }

    /// GET_DESCRIPTOR addressed by `request_type`
    pub const fn get_descriptor(
        request_type: u8,
        desc_type: u8,
        desc_index: u8,
        language_id: u16,
        length: u16,
    ) -> Self {
        Self::new(
            request_type,
            request::GET_DESCRIPTOR,
            ((desc_type as u16) << 8) | (desc_index as u16),
            language_id,
            length,
        )
    }

    /// Standard SET_ADDRESS request
    pub const fn set_address(address: u8) -> Self {
        Self::new(request_type::DEVICE_OUT, request::SET_ADDRESS, address as u16, 0, 0)
    }

    /// Standard SET_CONFIGURATION request
    pub const fn set_configuration(config_value: u8) -> Self {
        Self::new(
            request_type::DEVICE_OUT,
            request::SET_CONFIGURATION,
            config_value as u16,
            0,
            0,
        )
    }

    /// Decode the 8 wire bytes of a setup packet
    pub fn from_bytes(bytes: &[u8; 8]) -> Self {
        Self {
            bmRequestType: bytes[0],
            bRequest: bytes[1],
            wValue: u16::from_le_bytes([bytes[2], bytes[3]]),
            wIndex: u16::from_le_bytes([bytes[4], bytes[5]]),
            wLength: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Encode as 8 little-endian wire bytes
    pub fn to_bytes(&self) -> [u8; 8] {
        let value = self.wValue.to_le_bytes();
        let index = self.wIndex.to_le_bytes();
        let length = self.wLength.to_le_bytes();
        [
            self.bmRequestType,
            self.bRequest,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }
}

/// Word-aligned staging buffer for the DMA data stage
#[repr(C, align(4))]
struct DmaBuffer([u8; CONTROL_BUFFER_SIZE]);

impl<H: HostHardware, P: Platform> Dwc2Controller<H, P> {
    /// Perform a full control transfer, returning the data stage byte count
    ///
    /// The data stage direction comes from `control`; `buffer` is its payload
    /// (sent for OUT, filled for IN). A failure in any stage aborts the
    /// message with that stage's error. The device may already have acted on
    /// the request by then.
    pub fn submit_control_message(
        &mut self,
        pipe: &Pipe,
        control: &PipeControl,
        buffer: Option<&mut [u8]>,
        setup: &SetupPacket,
    ) -> Result<usize> {
        if Some(pipe.address) == self.root_hub_address {
            return self.process_root_hub_message(buffer, setup);
        }

        let length = buffer.as_ref().map_or(0, |b| b.len());
        if length > CONTROL_BUFFER_SIZE {
            return Err(UsbError::Argument);
        }

        let mut stage = PipeControl::control(control.channel, Direction::Out);
        let mut packet = setup.to_bytes();
        if let Err(e) = self.channel_transfer(pipe, &stage, &mut packet, PacketId::Setup) {
            log::warn!(
                "HCD: SETUP packet to device: {} req: {:#x} type: {:#x} speed: {} error: {}",
                pipe.address,
                setup.bRequest,
                setup.bmRequestType,
                pipe.speed.as_str(),
                e
            );
            return Err(e);
        }

        let mut dma = DmaBuffer([0; CONTROL_BUFFER_SIZE]);
        let mut transferred = 0;
        if let Some(buffer) = buffer {
            if control.direction == Direction::Out {
                dma.0[..length].copy_from_slice(buffer);
            }
            stage.direction = control.direction;
            let moved = match self.channel_transfer(pipe, &stage, &mut dma.0[..length], PacketId::Data1) {
                Ok(moved) => moved,
                Err(e) => {
                    log::warn!("HCD: Could not transfer DATA to device {}: {}", pipe.address, e);
                    return Err(e);
                }
            };
            transferred = if control.direction == Direction::In {
                buffer[..moved].copy_from_slice(&dma.0[..moved]);
                moved
            } else {
                length
            };
        }

        stage.direction = if length == 0 || control.direction == Direction::Out {
            Direction::In
        } else {
            Direction::Out
        };
        if let Err(e) = self.channel_transfer(pipe, &stage, &mut dma.0[..0], PacketId::Data1) {
            log::warn!("HCD: Could not transfer STATUS to device {}: {}", pipe.address, e);
            return Err(e);
        }

        Ok(transferred)
    }

    /// Fetch a descriptor into `buffer`
    ///
    /// With `header_check` the 2-byte header is read first; a wrong
    /// descriptor type is [`UsbError::General`] and the read is shortened to
    /// the descriptor's own length. Returns the bytes read.
    #[allow(clippy::too_many_arguments)]
    pub fn get_descriptor(
        &mut self,
        pipe: &Pipe,
        desc_type: u8,
        index: u8,
        language_id: u16,
        buffer: &mut [u8],
        recipient: u8,
        header_check: bool,
    ) -> Result<usize> {
        let control = PipeControl::control(CONTROL_CHANNEL, Direction::In);
        let mut length = buffer.len();

        if header_check {
            let mut header = [0u8; 2];
            let setup = SetupPacket::get_descriptor(recipient, desc_type, index, language_id, 2);
            let result = self
                .submit_control_message(pipe, &control, Some(&mut header), &setup)
                .and_then(|_| {
                    if header[1] != desc_type {
                        Err(UsbError::General)
                    } else {
                        Ok(())
                    }
                });
            if let Err(e) = result {
                log::warn!(
                    "HCD: Fail to get descriptor {:#x}:{:#x} recipient: {:#x}, device: {}: {}",
                    desc_type,
                    index,
                    recipient,
                    pipe.address,
                    e
                );
                return Err(e);
            }
            length = length.min(header[0] as usize);
        }

        let setup =
            SetupPacket::get_descriptor(recipient, desc_type, index, language_id, length as u16);
        let transferred =
            self.submit_control_message(pipe, &control, Some(&mut buffer[..length]), &setup)?;
        if transferred != length {
            log::warn!(
                "HCD: Failed to get descriptor {:#x}:{:#x} for device: {}, got {} of {} bytes",
                desc_type,
                index,
                pipe.address,
                transferred,
                length
            );
            return Err(UsbError::Transmission);
        }
        Ok(transferred)
    }

    /// Assign `address` to the device behind `pipe`
    pub fn set_address(&mut self, pipe: &Pipe, address: u8) -> Result<()> {
        if address == 0 {
            return Err(UsbError::Argument);
        }
        let control = PipeControl::control(CONTROL_CHANNEL, Direction::Out);
        self.submit_control_message(pipe, &control, None, &SetupPacket::set_address(address))
            .map_err(|e| {
                log::warn!("HCD: Failed to change address of device to {}: {}", address, e);
                e
            })?;
        Ok(())
    }

    /// Select configuration `config_value`
    pub fn set_configuration(&mut self, pipe: &Pipe, config_value: u8) -> Result<()> {
        let control = PipeControl::control(CONTROL_CHANNEL, Direction::Out);
        self.submit_control_message(
            pipe,
            &control,
            None,
            &SetupPacket::set_configuration(config_value),
        )
        .map_err(|e| {
            log::warn!(
                "HCD: Failed to set configuration {} for device {}: {}",
                config_value,
                pipe.address,
                e
            );
            e
        })?;
        Ok(())
    }

    /// Read the 32-bit status of hub port `port` (1-based), or the hub itself for 0
    pub fn read_hub_port_status(&mut self, pipe: &Pipe, port: u8) -> Result<u32> {
        let control = PipeControl::control(CONTROL_CHANNEL, Direction::In);
        let request_type = if port != 0 {
            request_type::PORT_IN
        } else {
            request_type::HUB_IN
        };
        let setup = SetupPacket::new(request_type, request::GET_STATUS, 0, port as u16, 4);
        let mut status = [0u8; 4];
        let transferred = self
            .submit_control_message(pipe, &control, Some(&mut status), &setup)
            .map_err(|e| {
                log::warn!(
                    "HCD: Hub read status failed on device: {}, port: {}: {}",
                    pipe.address,
                    port,
                    e
                );
                e
            })?;
        if transferred < status.len() {
            log::warn!("HUB: Failed to read hub device: {} port: {} status", pipe.address, port);
            return Err(UsbError::Device);
        }
        Ok(u32::from_le_bytes(status))
    }

    /// Set or clear `feature` on hub port `port` (1-based), or the hub itself for 0
    pub fn change_hub_port_feature(
        &mut self,
        pipe: &Pipe,
        feature: u16,
        port: u8,
        set: bool,
    ) -> Result<()> {
        let control = PipeControl::control(CONTROL_CHANNEL, Direction::Out);
        let request_type = if port != 0 {
            request_type::PORT_OUT
        } else {
            request_type::HUB_OUT
        };
        let request = if set {
            request::SET_FEATURE
        } else {
            request::CLEAR_FEATURE
        };
        let setup = SetupPacket::new(request_type, request, feature, port as u16, 0);
        self.submit_control_message(pipe, &control, None, &setup)
            .map_err(|e| {
                log::warn!(
                    "HUB: Failed to change port feature for device: {}, port: {} feature: {} set: {}",
                    pipe.address,
                    port,
                    feature,
                    set
                );
                e
            })?;
        Ok(())
    }

    /// Read string descriptor `index` as ASCII
    ///
    /// US English is preferred. When the device offers no English string the
    /// first language is read to keep the device happy and an empty string is
    /// returned. Characters outside ASCII become `?`.
    pub fn read_string_descriptor<const N: usize>(
        &mut self,
        pipe: &Pipe,
        index: u8,
    ) -> Result<String<N>> {
        if index == 0 {
            return Err(UsbError::Argument);
        }

        let string_type = DescriptorType::String as u8;
        let mut languages = [0u8; 256];
        let header = self
            .get_descriptor(pipe, string_type, 0, 0, &mut languages[..2], request_type::DEVICE_IN, true)
            .ok()
            .and_then(|_| DescriptorHeader::from_bytes(&languages[..2]))
            .ok_or_else(|| {
                log::warn!("HCD: Could not read language support for device: {}", pipe.address);
                UsbError::Argument
            })?;
        if header.descriptor_type != string_type {
            log::warn!("HCD: Not a valid language support descriptor on device: {}", pipe.address);
            return Err(UsbError::Argument);
        }

        let table_length = header.length as usize;
        if self
            .get_descriptor(
                pipe,
                string_type,
                0,
                0,
                &mut languages[..table_length],
                request_type::DEVICE_IN,
                true,
            )
            .is_err()
        {
            log::warn!(
                "HCD: Could not read all the language support data on device: {}",
                pipe.address
            );
            return Err(UsbError::Argument);
        }

        let mut ids = languages[2..table_length.max(2)]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
        let first = ids.clone().next().unwrap_or(0);
        let english = ids.any(|id| id == LANGUAGE_US_ENGLISH);
        if !english {
            log::info!("HCD: No english language string available on device: {}", pipe.address);
        }
        let language = if english { LANGUAGE_US_ENGLISH } else { first };

        let mut header = [0u8; 2];
        let read = self.get_descriptor(
            pipe,
            string_type,
            index,
            language,
            &mut header,
            request_type::DEVICE_IN,
            true,
        );
        if read != Ok(2) {
            log::warn!(
                "HCD: Could not fetch string descriptor header ({}) for device: {}",
                index,
                pipe.address
            );
            return Err(UsbError::Device);
        }

        let mut raw = [0u8; 256];
        let length = header[0] as usize;
        if self
            .get_descriptor(
                pipe,
                string_type,
                index,
                language,
                &mut raw[..length],
                request_type::DEVICE_IN,
                true,
            )
            .is_err()
        {
            log::warn!(
                "HCD: Could not fetch string descriptor ({}) for device: {}",
                index,
                pipe.address
            );
            return Err(UsbError::Argument);
        }

        let mut text = String::new();
        if english {
            for unit in raw[2..length.max(2)].chunks_exact(2) {
                let unit = u16::from_le_bytes([unit[0], unit[1]]);
                let ch = if unit < 0x80 { unit as u8 as char } else { '?' };
                if text.push(ch).is_err() {
                    break;
                }
            }
        }
        Ok(text)
    }
}
