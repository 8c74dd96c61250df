//! USB transfer primitives
//!
//! Pipe addressing, the channel transfer engine ([`channel`]) and control
//! messages composed on top of it ([`control`]).

pub mod channel;
pub mod control;

pub use channel::{check_error_and_action, SendControl};
pub use control::SetupPacket;

/// USB transfer types, encoded as the DWC2 endpoint type field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TransferType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Direction {
    Out = 0,
    In = 1,
}

/// Packet id programmed into the channel transfer size register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum PacketId {
    Data0 = 0,
    Data2 = 1,
    Data1 = 2,
    Setup = 3,
}

/// Device speed, encoded as the root port speed field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum DeviceSpeed {
    #[default]
    High = 0,
    Full = 1,
    Low = 2,
}

impl DeviceSpeed {
    /// Decode the two-bit root port speed field
    pub const fn from_port_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Self::High,
            2 => Self::Low,
            _ => Self::Full,
        }
    }

    /// Human readable name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Full => "Full",
            Self::Low => "Low",
        }
    }
}

/// Endpoint 0 packet size classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum PacketSize {
    #[default]
    Bits8,
    Bits16,
    Bits32,
    Bits64,
}

impl PacketSize {
    /// Smallest size class holding `size` bytes, capped at 64
    pub const fn from_number(size: u16) -> Self {
        if size <= 8 {
            Self::Bits8
        } else if size <= 16 {
            Self::Bits16
        } else if size <= 32 {
            Self::Bits32
        } else {
            Self::Bits64
        }
    }

    /// Size class in bytes
    pub const fn to_number(self) -> u32 {
        match self {
            Self::Bits8 => 8,
            Self::Bits16 => 16,
            Self::Bits32 => 32,
            Self::Bits64 => 64,
        }
    }
}

/// Endpoint addressing handle
///
/// `hub_address` / `hub_port` name the transaction translator for devices
/// slower than high speed reached through a hub; they are zero otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pipe {
    /// Device address on the bus
    pub address: u8,
    /// Endpoint number
    pub endpoint: u8,
    /// Device speed
    pub speed: DeviceSpeed,
    /// Negotiated max packet size
    pub max_size: PacketSize,
    /// Split target hub address
    pub hub_address: u8,
    /// Split target hub port
    pub hub_port: u8,
}

/// Channel selection for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipeControl {
    /// Host channel index
    pub channel: u8,
    /// Data direction
    pub direction: Direction,
    /// Endpoint type
    pub transfer_type: TransferType,
}

impl PipeControl {
    /// Control transfer on `channel` in `direction`
    pub const fn control(channel: u8, direction: Direction) -> Self {
        Self {
            channel,
            direction,
            transfer_type: TransferType::Control,
        }
    }
}
