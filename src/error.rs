//! USB error types

use core::fmt;

/// USB operation result type
pub type Result<T> = core::result::Result<T, UsbError>;

/// USB error types
///
/// Every layer of the driver reports failures through this enum; there is no
/// partial or degraded success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbError {
    /// Bad caller input (zero address, oversized buffer, unknown request)
    Argument,
    /// Device address out of range or slot not in use
    DeviceNumber,
    /// HID operation requested on a device without a HID payload
    NotHid,
    /// HID index beyond the device's HID descriptor count
    Index,
    /// Polling budget exceeded
    Timeout,
    /// Wire error after exhausting retries
    Transmission,
    /// Endpoint stalled
    Stall,
    /// A device-level step failed (short read, disconnect during reset)
    Device,
    /// A fixed-capacity pool is exhausted
    Memory,
    /// Hardware capability check failed at bring-up
    Incompatible,
    /// Unclassified failure (wrong descriptor type, unknown channel state)
    General,
    /// Internal invariant violated
    Internal,
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument => write!(f, "Invalid argument"),
            Self::DeviceNumber => write!(f, "Invalid device number"),
            Self::NotHid => write!(f, "Device is not a HID"),
            Self::Index => write!(f, "HID index out of range"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Transmission => write!(f, "Transmission error"),
            Self::Stall => write!(f, "USB stall"),
            Self::Device => write!(f, "Device error"),
            Self::Memory => write!(f, "Out of pool memory"),
            Self::Incompatible => write!(f, "Incompatible hardware"),
            Self::General => write!(f, "General failure"),
            Self::Internal => write!(f, "Internal invariant violated"),
        }
    }
}
