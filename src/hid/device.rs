//! HID class requests on enumerated devices

use super::constants::HidRequest;
use crate::config::{CONTROL_BUFFER_SIZE, CONTROL_CHANNEL};
use crate::descriptor::{DescriptorType, HidEntry};
use crate::dwc::HostHardware;
use crate::error::{Result, UsbError};
use crate::platform::Platform;
use crate::registry::Payload;
use crate::transfer::control::request_type;
use crate::transfer::{Direction, Pipe, PipeControl, SetupPacket};
use crate::UsbHost;

#[inline]
fn check_buffer(length: usize) -> Result<()> {
    if length == 0 || length > CONTROL_BUFFER_SIZE {
        return Err(UsbError::Argument);
    }
    Ok(())
}

impl<H: HostHardware, P: Platform> UsbHost<H, P> {
    /// Control pipe of a HID device
    fn hid_pipe(&self, address: u8) -> Result<Pipe> {
        let device = self.registry.device(address).ok_or(UsbError::DeviceNumber)?;
        match device.payload {
            Payload::Hid(_) => Ok(device.pipe0),
            _ => Err(UsbError::NotHid),
        }
    }

    /// Control pipe and HID record `hid_index` of a HID device
    fn hid_entry(&self, address: u8, hid_index: u8) -> Result<(Pipe, HidEntry)> {
        let pipe = self.hid_pipe(address)?;
        let entry = self
            .registry
            .hid(address)
            .and_then(|h| h.entries.get(hid_index as usize).copied())
            .ok_or(UsbError::Index)?;
        Ok((pipe, entry))
    }

    /// Read the report descriptor of HID `hid_index` into `buffer`
    ///
    /// The whole descriptor is fetched, then as much as fits is copied.
    /// Returns the number of bytes copied.
    pub fn hid_read_descriptor(&mut self, address: u8, hid_index: u8, buffer: &mut [u8]) -> Result<usize> {
        check_buffer(buffer.len())?;
        let (pipe, entry) = self.hid_entry(address, hid_index)?;

        let size = entry.descriptor.w_report_length as usize;
        let mut report = [0u8; CONTROL_BUFFER_SIZE];
        let read = if size <= CONTROL_BUFFER_SIZE {
            self.controller.get_descriptor(
                &pipe,
                DescriptorType::HidReport as u8,
                0,
                entry.interface as u16,
                &mut report[..size],
                request_type::INTERFACE_IN,
                false,
            )
        } else {
            Err(UsbError::Argument)
        };
        if read != Ok(size) {
            log::warn!(
                "HID: Fetch HID descriptor {} for device: {} failed",
                entry.interface,
                address
            );
            return Err(UsbError::Device);
        }

        let copied = size.min(buffer.len());
        buffer[..copied].copy_from_slice(&report[..copied]);
        Ok(copied)
    }

    /// GET_REPORT from HID `hid_index`
    ///
    /// `report_value` carries the report type in its high byte and the report
    /// id in its low byte. Returns the number of bytes the device sent.
    pub fn hid_read_report(
        &mut self,
        address: u8,
        hid_index: u8,
        report_value: u16,
        buffer: &mut [u8],
    ) -> Result<usize> {
        check_buffer(buffer.len())?;
        let (pipe, entry) = self.hid_entry(address, hid_index)?;

        let setup = SetupPacket::new(
            request_type::CLASS_INTERFACE_IN,
            HidRequest::GetReport as u8,
            report_value,
            entry.interface as u16,
            buffer.len() as u16,
        );
        let control = PipeControl::control(CONTROL_CHANNEL, Direction::In);
        self.controller
            .submit_control_message(&pipe, &control, Some(buffer), &setup)
    }

    /// SET_REPORT on HID `hid_index`
    ///
    /// A device that accepts fewer bytes than `data` holds is
    /// [`UsbError::General`].
    pub fn hid_write_report(
        &mut self,
        address: u8,
        hid_index: u8,
        report_value: u16,
        data: &[u8],
    ) -> Result<()> {
        check_buffer(data.len())?;
        let (pipe, entry) = self.hid_entry(address, hid_index)?;

        let mut report = [0u8; CONTROL_BUFFER_SIZE];
        report[..data.len()].copy_from_slice(data);
        let setup = SetupPacket::new(
            request_type::CLASS_INTERFACE_OUT,
            HidRequest::SetReport as u8,
            report_value,
            entry.interface as u16,
            data.len() as u16,
        );
        let control = PipeControl::control(CONTROL_CHANNEL, Direction::Out);
        let written = self.controller.submit_control_message(
            &pipe,
            &control,
            Some(&mut report[..data.len()]),
            &setup,
        )?;
        if written != data.len() {
            return Err(UsbError::General);
        }
        Ok(())
    }

    /// SET_PROTOCOL on `interface` of a HID device
    pub fn hid_set_protocol(&mut self, address: u8, interface: u8, protocol: u16) -> Result<()> {
        let pipe = self.hid_pipe(address)?;
        let setup = SetupPacket::new(
            request_type::CLASS_INTERFACE_OUT,
            HidRequest::SetProtocol as u8,
            protocol,
            interface as u16,
            0,
        );
        let control = PipeControl::control(CONTROL_CHANNEL, Direction::Out);
        self.controller
            .submit_control_message(&pipe, &control, None, &setup)
            .map(|_| ())
    }
}
