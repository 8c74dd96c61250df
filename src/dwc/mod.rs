//! DWC2 (DesignWare OTG 2.0) host controller register interface
//!
//! Register offsets and bit definitions for the subset of the core used in host
//! mode. Single-bit flags are `bitflags` types; multi-bit fields are exposed as
//! `_SHIFT` / `_MASK` constants in per-register modules.
//!
//! # Register Memory Layout
//!
//! - Core global registers at offset 0x000-0x0FF
//! - Periodic FIFO sizing at 0x100
//! - Host mode registers at 0x400, root port at 0x440
//! - Host channels at 0x500, 0x20 bytes each
//! - Power and clock gating at 0xE00
//!
//! All register access goes through [`HostHardware`] so the driver can run
//! against memory-mapped hardware ([`Mmio`]) or a simulated controller.

pub mod controller;
pub mod register;

pub use register::{Mmio, Register, RegisterTimeout};

use bitflags::bitflags;

/// Host-mode registers used by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// OTG control and status (GOTGCTL)
    OtgControl,
    /// AHB configuration (GAHBCFG)
    Ahb,
    /// USB configuration (GUSBCFG)
    UsbConfig,
    /// Core reset (GRSTCTL)
    CoreReset,
    /// Core interrupt status (GINTSTS)
    CoreInterrupt,
    /// Core interrupt mask (GINTMSK)
    CoreInterruptMask,
    /// Receive FIFO size (GRXFSIZ)
    ReceiveFifoSize,
    /// Non-periodic transmit FIFO size (GNPTXFSIZ)
    NonPeriodicFifoSize,
    /// User id (GUID)
    UserId,
    /// Synopsys id (GSNPSID)
    VendorId,
    /// Hardware configuration 2 (GHWCFG2)
    Hardware2,
    /// Periodic transmit FIFO size (HPTXFSIZ)
    PeriodicFifoSize,
    /// Host configuration (HCFG)
    HostConfig,
    /// Root port control and status (HPRT)
    HostPort,
    /// Power and clock gating (PCGCCTL)
    PowerClock,
    /// Per-channel register
    Channel(u8, ChannelReg),
}

/// Registers of one host channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelReg {
    /// Channel characteristics (HCCHAR)
    Characteristic,
    /// Split control (HCSPLT)
    SplitControl,
    /// Interrupt status (HCINT)
    Interrupt,
    /// Interrupt mask (HCINTMSK)
    InterruptMask,
    /// Transfer size (HCTSIZ)
    TransferSize,
    /// DMA address (HCDMA)
    DmaAddress,
}

impl Reg {
    /// Byte offset from the controller base
    pub const fn offset(self) -> usize {
        match self {
            Self::OtgControl => 0x000,
            Self::Ahb => 0x008,
            Self::UsbConfig => 0x00C,
            Self::CoreReset => 0x010,
            Self::CoreInterrupt => 0x014,
            Self::CoreInterruptMask => 0x018,
            Self::ReceiveFifoSize => 0x024,
            Self::NonPeriodicFifoSize => 0x028,
            Self::UserId => 0x03C,
            Self::VendorId => 0x040,
            Self::Hardware2 => 0x048,
            Self::PeriodicFifoSize => 0x100,
            Self::HostConfig => 0x400,
            Self::HostPort => 0x440,
            Self::PowerClock => 0xE00,
            Self::Channel(n, reg) => {
                let base = 0x500 + (n as usize) * 0x20;
                base + match reg {
                    ChannelReg::Characteristic => 0x00,
                    ChannelReg::SplitControl => 0x04,
                    ChannelReg::Interrupt => 0x08,
                    ChannelReg::InterruptMask => 0x0C,
                    ChannelReg::TransferSize => 0x10,
                    ChannelReg::DmaAddress => 0x14,
                }
            }
        }
    }
}

/// Hardware access boundary for the host driver
///
/// Implementors provide raw 32-bit register access plus a channel launch that
/// hands the DMA buffer to the hardware. Register writes are exact: the driver
/// applies masks (for example [`host_port::WRITE_MASK`]) before writing.
pub trait HostHardware {
    /// Read a register
    fn read(&mut self, reg: Reg) -> u32;

    /// Write a register
    fn write(&mut self, reg: Reg, value: u32);

    /// Read-modify-write a register
    fn modify<F>(&mut self, reg: Reg, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let value = self.read(reg);
        self.write(reg, f(value));
    }

    /// Point `channel` at `buffer` and start it
    ///
    /// The implementation programs the channel DMA address with the bus
    /// address of `buffer`, then writes the characteristic register with
    /// [`hcchar::launch`] applied. The buffer must stay untouched until the
    /// channel halts.
    fn launch_channel(&mut self, channel: u8, buffer: &mut [u8]);
}

/// Expected Synopsys id ("OT2" core) after masking with [`VENDOR_ID_MASK`]
pub const VENDOR_ID_OT2: u32 = 0x4F54_2000;
/// Mask applied to [`Reg::VendorId`] before comparison
pub const VENDOR_ID_MASK: u32 = 0xFFFF_F000;

bitflags! {
    /// OTG control register (GOTGCTL)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OtgControl: u32 {
        /// Host Set HNP Enable (HSTSETHNPEN) - Bit 10
        const HOST_SET_HNP_ENABLE = 1 << 10;
    }
}

bitflags! {
    /// AHB configuration register (GAHBCFG)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AhbConfig: u32 {
        /// Global Interrupt Enable (GINTMSK) - Bit 0
        const INTERRUPT_ENABLE = 1 << 0;
        /// DMA Enable (DMAEN) - Bit 5
        const DMA_ENABLE = 1 << 5;
        /// DMA Remainder Mode single (REMMEMSUPP) - Bit 23
        const DMA_REMAINDER_SINGLE = 1 << 23;
    }
}

bitflags! {
    /// USB configuration register (GUSBCFG)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UsbConfig: u32 {
        /// PHY Interface width (PHYIF) - Bit 3
        const PHY_INTERFACE = 1 << 3;
        /// UTMI+ mode select (ULPI_UTMI_SEL clear = UTMI) - Bit 4
        const MODE_SELECT_UTMI = 1 << 4;
        /// SRP Capable (SRPCAP) - Bit 8
        const SRP_CAPABLE = 1 << 8;
        /// HNP Capable (HNPCAP) - Bit 9
        const HNP_CAPABLE = 1 << 9;
        /// ULPI FS/LS select (ULPIFSLS) - Bit 17
        const ULPI_FSLS = 1 << 17;
        /// ULPI clock suspend (ULPICLKSUSM) - Bit 19
        const ULPI_CLK_SUS_M = 1 << 19;
        /// ULPI external VBUS drive (ULPIEVBUSD) - Bit 20
        const ULPI_DRIVE_EXTERNAL_VBUS = 1 << 20;
        /// TermSel DLine pulsing (TERMSELDLPULSE) - Bit 22
        const TS_DLINE_PULSE_ENABLE = 1 << 22;
    }
}

bitflags! {
    /// Core reset register (GRSTCTL)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CoreReset: u32 {
        /// Core Soft Reset (CSFTRST) - Bit 0
        const CORE_SOFT = 1 << 0;
        /// HCLK Soft Reset (HSFTRST) - Bit 1
        const HCLK_SOFT = 1 << 1;
        /// Host Frame Counter Reset (FRMCNTRST) - Bit 2
        const FRAME_COUNTER = 1 << 2;
        /// RxFIFO Flush (RXFFLSH) - Bit 4
        const RX_FIFO_FLUSH = 1 << 4;
        /// TxFIFO Flush (TXFFLSH) - Bit 5
        const TX_FIFO_FLUSH = 1 << 5;
        /// AHB Master Idle (AHBIDLE) - Bit 31
        const AHB_IDLE = 1 << 31;
    }
}

/// Core reset register multi-bit fields
#[allow(missing_docs)]
pub mod core_reset {
    /// TxFIFO number to flush - Bits 6-10
    pub const TX_FIFO_NUM_SHIFT: u32 = 6;
    pub const TX_FIFO_NUM_MASK: u32 = 0x1F << TX_FIFO_NUM_SHIFT;
    /// TxFIFO number selecting every transmit FIFO
    pub const FLUSH_ALL_TX: u32 = 16;
}

/// Hardware configuration 2 fields (GHWCFG2)
#[allow(missing_docs)]
pub mod hardware2 {
    pub const OPERATING_MODE_SHIFT: u32 = 0;
    pub const OPERATING_MODE_MASK: u32 = 0x7 << OPERATING_MODE_SHIFT;
    pub const ARCHITECTURE_SHIFT: u32 = 3;
    pub const ARCHITECTURE_MASK: u32 = 0x3 << ARCHITECTURE_SHIFT;
    pub const HIGH_SPEED_PHY_SHIFT: u32 = 6;
    pub const HIGH_SPEED_PHY_MASK: u32 = 0x3 << HIGH_SPEED_PHY_SHIFT;
    pub const FULL_SPEED_PHY_SHIFT: u32 = 8;
    pub const FULL_SPEED_PHY_MASK: u32 = 0x3 << FULL_SPEED_PHY_SHIFT;
    pub const HOST_CHANNEL_COUNT_SHIFT: u32 = 14;
    pub const HOST_CHANNEL_COUNT_MASK: u32 = 0xF << HOST_CHANNEL_COUNT_SHIFT;

    /// Operating mode: HNP and SRP capable OTG
    pub const MODE_HNP_SRP_CAPABLE: u32 = 0;
    /// Operating modes that advertise SRP only
    pub const MODE_SRP_ONLY: [u32; 3] = [1, 3, 5];

    /// Architecture: internal DMA
    pub const ARCHITECTURE_INTERNAL_DMA: u32 = 2;

    /// High-speed PHY: not supported
    pub const HS_PHY_NOT_SUPPORTED: u32 = 0;
    /// High-speed PHY: ULPI
    pub const HS_PHY_ULPI: u32 = 2;
    /// Full-speed PHY: dedicated
    pub const FS_PHY_DEDICATED: u32 = 1;

    /// Extract a field
    #[inline]
    pub const fn field(raw: u32, mask: u32, shift: u32) -> u32 {
        (raw & mask) >> shift
    }
}

/// Host configuration fields (HCFG)
#[allow(missing_docs)]
pub mod host_config {
    /// FS/LS PHY clock select - Bits 0-1
    pub const CLOCK_RATE_MASK: u32 = 0x3;
    pub const CLOCK_30_60_MHZ: u32 = 0;
    pub const CLOCK_48_MHZ: u32 = 1;
    /// FS/LS only support - Bit 2
    pub const FSLS_ONLY: u32 = 1 << 2;
    /// Scatter-gather DMA descriptors enabled - Bit 23
    pub const ENABLE_DMA_DESCRIPTOR: u32 = 1 << 23;
}

bitflags! {
    /// Root port control and status (HPRT)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HostPort: u32 {
        /// Port Connect Status (PRTCONNSTS) - Bit 0
        const CONNECT = 1 << 0;
        /// Port Connect Detected (PRTCONNDET) - Bit 1, write 1 to clear
        const CONNECT_CHANGED = 1 << 1;
        /// Port Enable (PRTENA) - Bit 2, write 1 to disable
        const ENABLE = 1 << 2;
        /// Port Enable Changed (PRTENCHNG) - Bit 3, write 1 to clear
        const ENABLE_CHANGED = 1 << 3;
        /// Port Overcurrent Active (PRTOVRCURRACT) - Bit 4
        const OVERCURRENT = 1 << 4;
        /// Port Overcurrent Changed (PRTOVRCURRCHNG) - Bit 5, write 1 to clear
        const OVERCURRENT_CHANGED = 1 << 5;
        /// Port Resume (PRTRES) - Bit 6
        const RESUME = 1 << 6;
        /// Port Suspend (PRTSUSP) - Bit 7
        const SUSPEND = 1 << 7;
        /// Port Reset (PRTRST) - Bit 8
        const RESET = 1 << 8;
        /// Port Power (PRTPWR) - Bit 12
        const POWER = 1 << 12;
    }
}

/// Root port multi-bit fields
#[allow(missing_docs)]
pub mod host_port {
    /// Line status - Bits 10-11
    pub const LINE_STATUS_SHIFT: u32 = 10;
    pub const LINE_STATUS_MASK: u32 = 0x3 << LINE_STATUS_SHIFT;
    /// Port test control - Bits 13-16
    pub const TEST_CONTROL_SHIFT: u32 = 13;
    pub const TEST_CONTROL_MASK: u32 = 0xF << TEST_CONTROL_SHIFT;
    /// Port speed - Bits 17-18 (0 = high, 1 = full, 2 = low)
    pub const SPEED_SHIFT: u32 = 17;
    pub const SPEED_MASK: u32 = 0x3 << SPEED_SHIFT;

    /// Clears the write-1-to-clear and write-1-to-disable bits
    ///
    /// Applied to every read-modify-write of HPRT so that a stale change bit
    /// or the enable bit is never written back as a 1.
    pub const WRITE_MASK: u32 = !0x2E;
}

bitflags! {
    /// Power and clock gating control (PCGCCTL)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PowerClock: u32 {
        /// Stop PHY clock (STPPCLK) - Bit 0
        const STOP_PCLOCK = 1 << 0;
        /// Gate HCLK (GATEHCLK) - Bit 1
        const GATE_HCLOCK = 1 << 1;
        /// Enable sleep clock gating (ENBL_SLP_CLK_GTNG) - Bit 5
        const SLEEP_CLOCK_GATING = 1 << 5;
    }
}

bitflags! {
    /// Host channel interrupt status (HCINT)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChannelInterrupt: u32 {
        /// Transfer Completed (XFERCOMPL) - Bit 0
        const TRANSFER_COMPLETE = 1 << 0;
        /// Channel Halted (CHHLTD) - Bit 1
        const HALT = 1 << 1;
        /// AHB Error (AHBERR) - Bit 2
        const AHB_ERROR = 1 << 2;
        /// STALL Response (STALL) - Bit 3
        const STALL = 1 << 3;
        /// NAK Response (NAK) - Bit 4
        const NAK = 1 << 4;
        /// ACK Response (ACK) - Bit 5
        const ACK = 1 << 5;
        /// NYET Response (NYET) - Bit 6
        const NOT_YET = 1 << 6;
        /// Transaction Error (XACTERR) - Bit 7
        const TRANSACTION_ERROR = 1 << 7;
        /// Babble Error (BBLERR) - Bit 8
        const BABBLE = 1 << 8;
        /// Frame Overrun (FRMOVRUN) - Bit 9
        const FRAME_OVERRUN = 1 << 9;
        /// Data Toggle Error (DATATGLERR) - Bit 10
        const DATA_TOGGLE_ERROR = 1 << 10;
        /// Buffer Not Available (BNA) - Bit 11
        const BUFFER_NOT_AVAILABLE = 1 << 11;
        /// Excessive Transaction Error (XCS_XACT_ERR) - Bit 12
        const EXCESSIVE_TRANSMISSION = 1 << 12;
        /// Frame List Rollover (FRM_LIST_ROLL) - Bit 13
        const FRAME_LIST_ROLLOVER = 1 << 13;
    }
}

/// Host channel characteristics fields (HCCHAR)
#[allow(missing_docs)]
pub mod hcchar {
    /// Maximum packet size - Bits 0-10
    pub const MAX_PACKET_SHIFT: u32 = 0;
    pub const MAX_PACKET_MASK: u32 = 0x7FF << MAX_PACKET_SHIFT;
    /// Endpoint number - Bits 11-14
    pub const ENDPOINT_SHIFT: u32 = 11;
    pub const ENDPOINT_MASK: u32 = 0xF << ENDPOINT_SHIFT;
    /// Endpoint direction, set for IN - Bit 15
    pub const DIRECTION_IN: u32 = 1 << 15;
    /// Low-speed device - Bit 17
    pub const LOW_SPEED: u32 = 1 << 17;
    /// Endpoint type - Bits 18-19
    pub const TYPE_SHIFT: u32 = 18;
    pub const TYPE_MASK: u32 = 0x3 << TYPE_SHIFT;
    /// Packets per frame (multi count) - Bits 20-21
    pub const PACKETS_PER_FRAME_SHIFT: u32 = 20;
    pub const PACKETS_PER_FRAME_MASK: u32 = 0x3 << PACKETS_PER_FRAME_SHIFT;
    /// Device address - Bits 22-28
    pub const DEVICE_ADDRESS_SHIFT: u32 = 22;
    pub const DEVICE_ADDRESS_MASK: u32 = 0x7F << DEVICE_ADDRESS_SHIFT;
    /// Odd frame - Bit 29
    pub const ODD_FRAME: u32 = 1 << 29;
    /// Channel disable - Bit 30
    pub const DISABLE: u32 = 1 << 30;
    /// Channel enable - Bit 31
    pub const ENABLE: u32 = 1 << 31;

    /// Characteristic value that starts a programmed channel
    #[inline]
    pub const fn launch(value: u32) -> u32 {
        (value & !(PACKETS_PER_FRAME_MASK | DISABLE)) | (1 << PACKETS_PER_FRAME_SHIFT) | ENABLE
    }

    /// Device address field
    #[inline]
    pub const fn device_address(value: u32) -> u8 {
        ((value & DEVICE_ADDRESS_MASK) >> DEVICE_ADDRESS_SHIFT) as u8
    }

    /// Endpoint number field
    #[inline]
    pub const fn endpoint(value: u32) -> u8 {
        ((value & ENDPOINT_MASK) >> ENDPOINT_SHIFT) as u8
    }

    /// Maximum packet size field
    #[inline]
    pub const fn max_packet(value: u32) -> u32 {
        (value & MAX_PACKET_MASK) >> MAX_PACKET_SHIFT
    }
}

/// Host channel split control fields (HCSPLT)
#[allow(missing_docs)]
pub mod hcsplt {
    /// Hub port address - Bits 0-6
    pub const PORT_SHIFT: u32 = 0;
    pub const PORT_MASK: u32 = 0x7F << PORT_SHIFT;
    /// Hub address - Bits 7-13
    pub const HUB_SHIFT: u32 = 7;
    pub const HUB_MASK: u32 = 0x7F << HUB_SHIFT;
    /// Transaction position - Bits 14-15
    pub const POSITION_SHIFT: u32 = 14;
    pub const POSITION_MASK: u32 = 0x3 << POSITION_SHIFT;
    /// Do complete split - Bit 16
    pub const COMPLETE_SPLIT: u32 = 1 << 16;
    /// Split enable - Bit 31
    pub const SPLIT_ENABLE: u32 = 1 << 31;

    /// Split control value targeting `hub` / `port`
    #[inline]
    pub const fn start_split(hub: u8, port: u8) -> u32 {
        SPLIT_ENABLE
            | (((hub as u32) << HUB_SHIFT) & HUB_MASK)
            | (((port as u32) << PORT_SHIFT) & PORT_MASK)
    }
}

/// Host channel transfer size fields (HCTSIZ)
#[allow(missing_docs)]
pub mod hctsiz {
    /// Transfer size in bytes - Bits 0-18
    pub const SIZE_SHIFT: u32 = 0;
    pub const SIZE_MASK: u32 = 0x7FFFF << SIZE_SHIFT;
    /// Packet count - Bits 19-28
    pub const PACKET_COUNT_SHIFT: u32 = 19;
    pub const PACKET_COUNT_MASK: u32 = 0x3FF << PACKET_COUNT_SHIFT;
    /// Packet id - Bits 29-30
    pub const PID_SHIFT: u32 = 29;
    pub const PID_MASK: u32 = 0x3 << PID_SHIFT;
    /// Do ping - Bit 31
    pub const DO_PING: u32 = 1 << 31;

    /// Remaining byte count
    #[inline]
    pub const fn size(value: u32) -> u32 {
        (value & SIZE_MASK) >> SIZE_SHIFT
    }

    /// Remaining packet count
    #[inline]
    pub const fn packet_count(value: u32) -> u32 {
        (value & PACKET_COUNT_MASK) >> PACKET_COUNT_SHIFT
    }

    /// Packet id field
    #[inline]
    pub const fn pid(value: u32) -> u32 {
        (value & PID_MASK) >> PID_SHIFT
    }

    /// Assemble a transfer size value
    #[inline]
    pub const fn encode(size: u32, packet_count: u32, pid: u32) -> u32 {
        ((size << SIZE_SHIFT) & SIZE_MASK)
            | ((packet_count << PACKET_COUNT_SHIFT) & PACKET_COUNT_MASK)
            | ((pid << PID_SHIFT) & PID_MASK)
    }
}
