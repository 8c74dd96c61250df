//! USB descriptors and configuration parsing
//!
//! Descriptors are decoded field by field from little-endian wire bytes.
//! [`parse_configuration`] walks a full configuration blob the way enumeration
//! needs it: interfaces in order, endpoints attached to the interface before
//! them, HID class descriptors tagged with their interface.

use heapless::Vec;

use crate::config::{MAX_ENDPOINTS_PER_INTERFACE, MAX_HID_PER_DEVICE, MAX_INTERFACES_PER_DEVICE};

/// Standard and class descriptor types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum DescriptorType {
    Device = 0x01,
    Configuration = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    DeviceQualifier = 0x06,
    OtherSpeedConfiguration = 0x07,
    InterfacePower = 0x08,
    Hid = 0x21,
    HidReport = 0x22,
    HidPhysical = 0x23,
    Hub = 0x29,
}

/// USB device class codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceClass {
    /// Class defined per interface
    InInterface = 0x00,
    /// Audio device
    Audio = 0x01,
    /// Communications device
    Communications = 0x02,
    /// Human interface device
    Hid = 0x03,
    /// Physical device
    Physical = 0x05,
    /// Still imaging
    Image = 0x06,
    /// Printer
    Printer = 0x07,
    /// Mass storage device
    MassStorage = 0x08,
    /// Hub
    Hub = 0x09,
    /// CDC data
    CdcData = 0x0A,
    /// Smart card
    SmartCard = 0x0B,
    /// Content security
    ContentSecurity = 0x0D,
    /// Video
    Video = 0x0E,
    /// Personal healthcare
    PersonalHealthcare = 0x0F,
    /// Audio/video
    AudioVideo = 0x10,
    /// Diagnostic device
    Diagnostic = 0xDC,
    /// Wireless controller
    WirelessController = 0xE0,
    /// Miscellaneous
    Miscellaneous = 0xEF,
    /// Application specific
    ApplicationSpecific = 0xFE,
    /// Vendor specific
    VendorSpecific = 0xFF,
}

impl DeviceClass {
    /// Create from u8 value
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::InInterface,
            0x01 => Self::Audio,
            0x02 => Self::Communications,
            0x03 => Self::Hid,
            0x05 => Self::Physical,
            0x06 => Self::Image,
            0x07 => Self::Printer,
            0x08 => Self::MassStorage,
            0x09 => Self::Hub,
            0x0A => Self::CdcData,
            0x0B => Self::SmartCard,
            0x0D => Self::ContentSecurity,
            0x0E => Self::Video,
            0x0F => Self::PersonalHealthcare,
            0x10 => Self::AudioVideo,
            0xDC => Self::Diagnostic,
            0xE0 => Self::WirelessController,
            0xEF => Self::Miscellaneous,
            0xFE => Self::ApplicationSpecific,
            0xFF => Self::VendorSpecific,
            _ => return None,
        })
    }
}

#[inline]
fn le16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

/// Common two-byte descriptor header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct DescriptorHeader {
    pub length: u8,
    pub descriptor_type: u8,
}

impl DescriptorHeader {
    /// Parse from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        match data {
            [length, descriptor_type, ..] => Some(Self {
                length: *length,
                descriptor_type: *descriptor_type,
            }),
            _ => None,
        }
    }
}

/// USB device descriptor (18 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct DeviceDescriptor {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub bcd_usb: u16,
    pub b_device_class: u8,
    pub b_device_sub_class: u8,
    pub b_device_protocol: u8,
    pub b_max_packet_size0: u8,
    pub id_vendor: u16,
    pub id_product: u16,
    pub bcd_device: u16,
    pub i_manufacturer: u8,
    pub i_product: u8,
    pub i_serial_number: u8,
    pub b_num_configurations: u8,
}

impl DeviceDescriptor {
    /// Descriptor size on the wire
    pub const SIZE: usize = 18;

    /// Parse from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            b_length: data[0],
            b_descriptor_type: data[1],
            bcd_usb: le16(data, 2),
            b_device_class: data[4],
            b_device_sub_class: data[5],
            b_device_protocol: data[6],
            b_max_packet_size0: data[7],
            id_vendor: le16(data, 8),
            id_product: le16(data, 10),
            bcd_device: le16(data, 12),
            i_manufacturer: data[14],
            i_product: data[15],
            i_serial_number: data[16],
            b_num_configurations: data[17],
        })
    }

    /// Get device class
    pub fn device_class(&self) -> Option<DeviceClass> {
        DeviceClass::from_u8(self.b_device_class)
    }
}

/// Configuration descriptor header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct ConfigurationDescriptor {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub w_total_length: u16,
    pub b_num_interfaces: u8,
    pub b_configuration_value: u8,
    pub i_configuration: u8,
    pub bm_attributes: u8,
    pub b_max_power: u8,
}

impl ConfigurationDescriptor {
    /// Descriptor size on the wire
    pub const SIZE: usize = 9;

    /// Parse from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            b_length: data[0],
            b_descriptor_type: data[1],
            w_total_length: le16(data, 2),
            b_num_interfaces: data[4],
            b_configuration_value: data[5],
            i_configuration: data[6],
            bm_attributes: data[7],
            b_max_power: data[8],
        })
    }
}

/// Interface descriptor (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct InterfaceDescriptor {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub b_interface_number: u8,
    pub b_alternate_setting: u8,
    pub b_num_endpoints: u8,
    pub b_interface_class: u8,
    pub b_interface_sub_class: u8,
    pub b_interface_protocol: u8,
    pub i_interface: u8,
}

impl InterfaceDescriptor {
    /// Descriptor size on the wire
    pub const SIZE: usize = 9;

    /// Parse from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            b_length: data[0],
            b_descriptor_type: data[1],
            b_interface_number: data[2],
            b_alternate_setting: data[3],
            b_num_endpoints: data[4],
            b_interface_class: data[5],
            b_interface_sub_class: data[6],
            b_interface_protocol: data[7],
            i_interface: data[8],
        })
    }
}

/// Endpoint descriptor (7 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct EndpointDescriptor {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub b_endpoint_address: u8,
    pub bm_attributes: u8,
    pub w_max_packet_size: u16,
    pub b_interval: u8,
}

impl EndpointDescriptor {
    /// Descriptor size on the wire
    pub const SIZE: usize = 7;

    /// Parse from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            b_length: data[0],
            b_descriptor_type: data[1],
            b_endpoint_address: data[2],
            bm_attributes: data[3],
            w_max_packet_size: le16(data, 4),
            b_interval: data[6],
        })
    }
}

/// HID class descriptor (9 bytes, one report descriptor entry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct HidDescriptor {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub bcd_hid: u16,
    pub b_country_code: u8,
    pub b_num_descriptors: u8,
    pub b_report_type: u8,
    pub w_report_length: u16,
}

impl HidDescriptor {
    /// Descriptor size on the wire
    pub const SIZE: usize = 9;

    /// Parse from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            b_length: data[0],
            b_descriptor_type: data[1],
            bcd_hid: le16(data, 2),
            b_country_code: data[4],
            b_num_descriptors: data[5],
            b_report_type: data[6],
            w_report_length: le16(data, 7),
        })
    }
}

/// Hub class descriptor for hubs with up to 7 ports (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct HubDescriptor {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub b_nbr_ports: u8,
    pub w_hub_characteristics: u16,
    pub b_pwr_on_2_pwr_good: u8,
    pub b_hub_contr_current: u8,
    pub device_removable: u8,
    pub port_pwr_ctrl_mask: u8,
}

impl HubDescriptor {
    /// Descriptor size on the wire
    pub const SIZE: usize = 9;

    /// Parse from raw bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            b_length: data[0],
            b_descriptor_type: data[1],
            b_nbr_ports: data[2],
            w_hub_characteristics: le16(data, 3),
            b_pwr_on_2_pwr_good: data[5],
            b_hub_contr_current: data[6],
            device_removable: data[7],
            port_pwr_ctrl_mask: data[8],
        })
    }
}

/// One interface of the active configuration and its endpoints
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Interface {
    /// Interface record
    pub descriptor: InterfaceDescriptor,
    /// Endpoint records that followed the interface record
    pub endpoints: Vec<EndpointDescriptor, MAX_ENDPOINTS_PER_INTERFACE>,
}

/// A HID class descriptor and the interface it was found under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HidEntry {
    /// Class descriptor as read from the configuration
    pub descriptor: HidDescriptor,
    /// Index into the device's interface list
    pub interface: u8,
}

/// Result of walking a configuration blob
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedConfiguration {
    /// Interfaces in descriptor order
    pub interfaces: Vec<Interface, MAX_INTERFACES_PER_DEVICE>,
    /// HID class descriptors in descriptor order
    pub hids: Vec<HidEntry, MAX_HID_PER_DEVICE>,
}

/// Walk a full configuration descriptor blob
///
/// Each record's own length advances the cursor. Interface records open a new
/// entry; endpoint and HID records attach to the most recent interface and are
/// dropped if none has been seen. Records past a pool's capacity are dropped,
/// as is a truncated trailing record. Endpoint and HID records that follow a
/// dropped interface go with it. A zero-length record ends the walk.
pub fn parse_configuration(blob: &[u8]) -> ParsedConfiguration {
    let mut parsed = ParsedConfiguration::default();
    let mut i = 0usize;
    // Set while the records being walked belong to a dropped interface
    let mut dropped = false;

    while i + 1 < blob.len() {
        let length = blob[i] as usize;
        if length == 0 {
            log::warn!("HCD: Zero length descriptor at offset {} in configuration", i);
            break;
        }
        let record = &blob[i..blob.len().min(i + length)];

        match blob[i + 1] {
            t if t == DescriptorType::Interface as u8 => {
                if let Some(descriptor) = InterfaceDescriptor::from_bytes(record) {
                    let entry = Interface {
                        descriptor,
                        endpoints: Vec::new(),
                    };
                    dropped = parsed.interfaces.push(entry).is_err();
                    if dropped {
                        log::warn!("HCD: Interface limit reached, ignoring interface");
                    }
                }
            }
            _ if dropped => {}
            t if t == DescriptorType::Endpoint as u8 => {
                if let (Some(descriptor), Some(interface)) =
                    (EndpointDescriptor::from_bytes(record), parsed.interfaces.last_mut())
                {
                    if interface.endpoints.push(descriptor).is_err() {
                        log::warn!("HCD: Endpoint limit reached, ignoring endpoint");
                    }
                }
            }
            t if t == DescriptorType::Hid as u8 => {
                if length != HidDescriptor::SIZE {
                    log::warn!("HID entry wrong size");
                }
                if let (Some(descriptor), Some(interface)) = (
                    HidDescriptor::from_bytes(record),
                    parsed.interfaces.len().checked_sub(1),
                ) {
                    let entry = HidEntry {
                        descriptor,
                        interface: interface as u8,
                    };
                    if parsed.hids.push(entry).is_err() {
                        log::warn!("HCD: HID limit reached, ignoring HID on interface {}", interface);
                    }
                }
            }
            _ => {}
        }

        i += length;
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERFACE: [u8; 9] = [9, 0x04, 0, 0, 2, 0x03, 1, 1, 0];
    const ENDPOINT: [u8; 7] = [7, 0x05, 0x81, 0x03, 8, 0, 10];
    const HID: [u8; 9] = [9, 0x21, 0x11, 0x01, 0, 1, 0x22, 63, 0];

    fn blob(parts: &[&[u8]]) -> heapless::Vec<u8, 256> {
        let mut out = heapless::Vec::new();
        for part in parts {
            out.extend_from_slice(part).unwrap();
        }
        out
    }

    #[test]
    fn interfaces_collect_following_endpoints() {
        let data = blob(&[&INTERFACE, &ENDPOINT, &ENDPOINT, &INTERFACE, &ENDPOINT]);
        let parsed = parse_configuration(&data);
        assert_eq!(parsed.interfaces.len(), 2);
        assert_eq!(parsed.interfaces[0].endpoints.len(), 2);
        assert_eq!(parsed.interfaces[1].endpoints.len(), 1);
        assert!(parsed.hids.is_empty());
    }

    #[test]
    fn hid_records_remember_their_interface() {
        let data = blob(&[&INTERFACE, &HID, &ENDPOINT, &INTERFACE, &HID, &ENDPOINT]);
        let parsed = parse_configuration(&data);
        assert_eq!(parsed.hids.len(), 2);
        assert_eq!(parsed.hids[0].interface, 0);
        assert_eq!(parsed.hids[1].interface, 1);
        assert_eq!(parsed.hids[0].descriptor.w_report_length, 63);
    }

    #[test]
    fn endpoint_before_interface_is_dropped() {
        let data = blob(&[&ENDPOINT, &INTERFACE, &ENDPOINT]);
        let parsed = parse_configuration(&data);
        assert_eq!(parsed.interfaces.len(), 1);
        assert_eq!(parsed.interfaces[0].endpoints.len(), 1);
    }

    #[test]
    fn records_after_the_interface_limit_are_dropped() {
        let mut data: heapless::Vec<u8, 256> = heapless::Vec::new();
        for number in 0..9u8 {
            let mut interface = INTERFACE;
            interface[2] = number;
            data.extend_from_slice(&interface).unwrap();
            data.extend_from_slice(&ENDPOINT).unwrap();
        }
        let parsed = parse_configuration(&data);
        assert_eq!(parsed.interfaces.len(), MAX_INTERFACES_PER_DEVICE);
        let last = parsed.interfaces.last().unwrap();
        assert_eq!(last.descriptor.b_interface_number, 7);
        assert!(parsed.interfaces.iter().all(|i| i.endpoints.len() == 1));
    }

    #[test]
    fn hid_records_past_the_pool_are_dropped() {
        let mut data: heapless::Vec<u8, 256> = heapless::Vec::new();
        for _ in 0..MAX_HID_PER_DEVICE + 1 {
            data.extend_from_slice(&INTERFACE).unwrap();
            data.extend_from_slice(&HID).unwrap();
        }
        let parsed = parse_configuration(&data);
        assert_eq!(parsed.interfaces.len(), MAX_HID_PER_DEVICE + 1);
        assert_eq!(parsed.hids.len(), MAX_HID_PER_DEVICE);
        assert_eq!(parsed.hids.last().unwrap().interface, MAX_HID_PER_DEVICE as u8 - 1);
    }

    #[test]
    fn zero_length_record_stops_the_walk() {
        let data = blob(&[&INTERFACE, &[0, 0x05], &ENDPOINT]);
        let parsed = parse_configuration(&data);
        assert_eq!(parsed.interfaces.len(), 1);
        assert!(parsed.interfaces[0].endpoints.is_empty());
    }

    #[test]
    fn device_descriptor_decodes_little_endian_fields() {
        let raw = [
            18, 1, 0x00, 0x02, 9, 0, 1, 64, 0x24, 0x04, 0x00, 0xEC, 0x00, 0x01, 1, 2, 3, 1,
        ];
        let desc = DeviceDescriptor::from_bytes(&raw).unwrap();
        assert_eq!(desc.bcd_usb, 0x0200);
        assert_eq!(desc.id_vendor, 0x0424);
        assert_eq!(desc.id_product, 0xEC00);
        assert_eq!(desc.device_class(), Some(DeviceClass::Hub));
        assert!(DeviceDescriptor::from_bytes(&raw[..8]).is_none());
    }
}
