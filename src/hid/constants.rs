//! HID protocol constants
//!
//! Standard constants from USB HID Specification 1.11

/// HID interface class code
pub const HID_CLASS: u8 = 0x03;

/// HID subclass codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HidSubclass {
    /// No subclass
    None = 0x00,
    /// Boot interface subclass
    Boot = 0x01,
}

/// HID boot interface protocol codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HidProtocol {
    /// No protocol
    None = 0x00,
    /// Keyboard protocol
    Keyboard = 0x01,
    /// Mouse protocol
    Mouse = 0x02,
}

/// HID class-specific requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HidRequest {
    /// Get report
    GetReport = 0x01,
    /// Get idle rate
    GetIdle = 0x02,
    /// Get protocol
    GetProtocol = 0x03,
    /// Set report
    SetReport = 0x09,
    /// Set idle rate
    SetIdle = 0x0A,
    /// Set protocol
    SetProtocol = 0x0B,
}

/// HID report types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HidReportType {
    /// Input report
    Input = 0x01,
    /// Output report
    Output = 0x02,
    /// Feature report
    Feature = 0x03,
}

impl HidReportType {
    /// wValue for GET_REPORT / SET_REPORT: type in the high byte, id in the low
    pub const fn report_value(self, report_id: u8) -> u16 {
        ((self as u16) << 8) | report_id as u16
    }
}

/// HID protocol modes for SET_PROTOCOL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HidProtocolMode {
    /// Boot protocol (simplified, standard reports)
    Boot = 0x00,
    /// Report protocol (full HID report descriptors)
    Report = 0x01,
}
