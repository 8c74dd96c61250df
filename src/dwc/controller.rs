//! DWC2 host controller bring-up
//!
//! [`Dwc2Controller`] owns the register backend and the board platform. Bring-up
//! is split the way the core expects it:
//!
//! 1. [`Dwc2Controller::initialise`] checks the core identity and capabilities,
//!    masks interrupts and powers the block.
//! 2. [`Dwc2Controller::start`] soft-resets the core, selects the PHY, sizes the
//!    FIFOs, quiesces every channel and powers and resets the root port.
//!
//! Channel transfers, control messages and the emulated root hub are
//! implemented on the same type in the transfer and root hub modules.

use super::{
    core_reset, hardware2, hcchar, host_config, host_port, AhbConfig, ChannelReg, CoreReset,
    HostHardware, HostPort, OtgControl, Reg, RegisterTimeout, UsbConfig, VENDOR_ID_MASK,
    VENDOR_ID_OT2,
};
use crate::config::HostConfig;
use crate::error::{Result, UsbError};
use crate::platform::Platform;

/// DWC2 core in host mode
pub struct Dwc2Controller<H, P> {
    pub(crate) hw: H,
    pub(crate) platform: P,
    pub(crate) config: HostConfig,
    /// Raw host channel count field from GHWCFG2
    pub(crate) channel_count: u8,
    phy_initialised: bool,
    /// Address the emulated root hub answers on, once attached
    pub(crate) root_hub_address: Option<u8>,
}

impl<H: HostHardware, P: Platform> Dwc2Controller<H, P> {
    /// Wrap a register backend and board platform
    pub const fn new(hw: H, platform: P, config: HostConfig) -> Self {
        Self {
            hw,
            platform,
            config,
            channel_count: 0,
            phy_initialised: false,
            root_hub_address: None,
        }
    }

    /// Register backend
    pub fn hardware(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Board platform
    pub fn platform(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Active configuration
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Check the core identity and power the USB block
    pub fn initialise(&mut self) -> Result<()> {
        let vendor_id = self.hw.read(Reg::VendorId);
        let user_id = self.hw.read(Reg::UserId);
        let [v3, v2, _, _] = vendor_id.to_be_bytes();
        let hardware = self.hw.read(Reg::Hardware2);

        if vendor_id & VENDOR_ID_MASK != VENDOR_ID_OT2 {
            log::error!(
                "HCD: Hardware: {}{}{:x}.{:03x} (BCM{:05x}). Driver incompatible. Expected OT2.xxx",
                v3 as char,
                v2 as char,
                (vendor_id >> 12) & 0xF,
                vendor_id & 0xFFF,
                (user_id >> 12) & 0xF_FFFF
            );
            return Err(UsbError::Incompatible);
        }
        log::info!(
            "HCD: Hardware: {}{}{:x}.{:03x} (BCM{:05x})",
            v3 as char,
            v2 as char,
            (vendor_id >> 12) & 0xF,
            vendor_id & 0xFFF,
            (user_id >> 12) & 0xF_FFFF
        );

        let architecture = hardware2::field(
            hardware,
            hardware2::ARCHITECTURE_MASK,
            hardware2::ARCHITECTURE_SHIFT,
        );
        if architecture != hardware2::ARCHITECTURE_INTERNAL_DMA {
            log::error!("HCD: Host architecture does not support internal DMA");
            return Err(UsbError::Incompatible);
        }

        let hs_phy = hardware2::field(
            hardware,
            hardware2::HIGH_SPEED_PHY_MASK,
            hardware2::HIGH_SPEED_PHY_SHIFT,
        );
        if hs_phy == hardware2::HS_PHY_NOT_SUPPORTED {
            log::error!("HCD: High speed physical unsupported");
            return Err(UsbError::Incompatible);
        }

        self.channel_count = hardware2::field(
            hardware,
            hardware2::HOST_CHANNEL_COUNT_MASK,
            hardware2::HOST_CHANNEL_COUNT_SHIFT,
        ) as u8;

        self.hw
            .modify(Reg::Ahb, |v| v & !AhbConfig::INTERRUPT_ENABLE.bits());
        self.hw.write(Reg::CoreInterruptMask, 0);

        if self.platform.set_power(true).is_err() {
            log::error!("HCD: Failed to power on USB host controller");
            return Err(UsbError::Incompatible);
        }

        #[cfg(feature = "defmt")]
        defmt::info!("HCD: core identified, {} host channels", self.channel_count);

        Ok(())
    }

    /// Power the USB block down
    pub fn power_off(&mut self) -> Result<()> {
        self.platform.set_power(false)
    }

    /// Soft reset the core
    pub fn reset(&mut self) -> Result<()> {
        let timeout = RegisterTimeout::new(&self.platform, self.config.core_reset_timeout);
        timeout.wait_for(&mut self.hw, &self.platform, Reg::CoreReset, |v| {
            v & CoreReset::AHB_IDLE.bits() != 0
        })?;

        self.hw
            .modify(Reg::CoreReset, |v| v | CoreReset::CORE_SOFT.bits());

        let timeout = RegisterTimeout::new(&self.platform, self.config.core_reset_timeout);
        timeout.wait_for(&mut self.hw, &self.platform, Reg::CoreReset, |v| {
            let reset = CoreReset::from_bits_retain(v);
            !reset.contains(CoreReset::CORE_SOFT) && reset.contains(CoreReset::AHB_IDLE)
        })
    }

    /// Flush one transmit FIFO, or all of them with [`core_reset::FLUSH_ALL_TX`]
    pub fn flush_transmit_fifo(&mut self, fifo: u32) -> Result<()> {
        self.hw.modify(Reg::CoreReset, |v| {
            (v & !core_reset::TX_FIFO_NUM_MASK)
                | ((fifo << core_reset::TX_FIFO_NUM_SHIFT) & core_reset::TX_FIFO_NUM_MASK)
        });
        self.hw
            .modify(Reg::CoreReset, |v| v | CoreReset::TX_FIFO_FLUSH.bits());

        let timeout = RegisterTimeout::new(&self.platform, self.config.core_reset_timeout);
        timeout.wait_for(&mut self.hw, &self.platform, Reg::CoreReset, |v| {
            v & CoreReset::TX_FIFO_FLUSH.bits() == 0
        })
    }

    /// Flush the receive FIFO
    pub fn flush_receive_fifo(&mut self) -> Result<()> {
        self.hw
            .modify(Reg::CoreReset, |v| v | CoreReset::RX_FIFO_FLUSH.bits());

        let timeout = RegisterTimeout::new(&self.platform, self.config.core_reset_timeout);
        timeout.wait_for(&mut self.hw, &self.platform, Reg::CoreReset, |v| {
            v & CoreReset::RX_FIFO_FLUSH.bits() == 0
        })
    }

    /// Bring the core up in host mode and reset the root port
    pub fn start(&mut self) -> Result<()> {
        self.hw.modify(Reg::UsbConfig, |v| {
            v & !(UsbConfig::ULPI_DRIVE_EXTERNAL_VBUS | UsbConfig::TS_DLINE_PULSE_ENABLE).bits()
        });

        log::debug!("HCD: Master reset");
        if let Err(e) = self.reset() {
            log::error!("HCD: Could not do a master reset: {}", e);
            return Err(e);
        }

        if !self.phy_initialised {
            log::debug!("HCD: One time phy initialisation, interface UTMI+");
            self.phy_initialised = true;
            self.hw.modify(Reg::UsbConfig, |v| {
                (v | UsbConfig::MODE_SELECT_UTMI.bits()) & !UsbConfig::PHY_INTERFACE.bits()
            });
            if let Err(e) = self.reset() {
                log::error!("HCD: Could not do a master reset: {}", e);
                return Err(e);
            }
        }

        let hardware = self.hw.read(Reg::Hardware2);
        let ulpi_fsls = hardware2::field(
            hardware,
            hardware2::HIGH_SPEED_PHY_MASK,
            hardware2::HIGH_SPEED_PHY_SHIFT,
        ) == hardware2::HS_PHY_ULPI
            && hardware2::field(
                hardware,
                hardware2::FULL_SPEED_PHY_MASK,
                hardware2::FULL_SPEED_PHY_SHIFT,
            ) == hardware2::FS_PHY_DEDICATED;
        let fsls_bits = (UsbConfig::ULPI_FSLS | UsbConfig::ULPI_CLK_SUS_M).bits();
        if ulpi_fsls {
            log::debug!("HCD: ULPI FSLS configuration: enabled");
            self.hw.modify(Reg::UsbConfig, |v| v | fsls_bits);
        } else {
            log::debug!("HCD: ULPI FSLS configuration: disabled");
            self.hw.modify(Reg::UsbConfig, |v| v & !fsls_bits);
        }

        self.hw.modify(Reg::Ahb, |v| {
            (v | AhbConfig::DMA_ENABLE.bits()) & !AhbConfig::DMA_REMAINDER_SINGLE.bits()
        });

        let mode = hardware2::field(
            hardware,
            hardware2::OPERATING_MODE_MASK,
            hardware2::OPERATING_MODE_SHIFT,
        );
        let capability = if mode == hardware2::MODE_HNP_SRP_CAPABLE {
            log::debug!("HCD: HNP/SRP configuration: HNP, SRP");
            UsbConfig::HNP_CAPABLE | UsbConfig::SRP_CAPABLE
        } else if hardware2::MODE_SRP_ONLY.contains(&mode) {
            log::debug!("HCD: HNP/SRP configuration: SRP");
            UsbConfig::SRP_CAPABLE
        } else {
            log::debug!("HCD: HNP/SRP configuration: none");
            UsbConfig::empty()
        };
        self.hw.modify(Reg::UsbConfig, |v| {
            (v & !(UsbConfig::HNP_CAPABLE | UsbConfig::SRP_CAPABLE).bits()) | capability.bits()
        });
        log::debug!("HCD: Core started, starting host");

        self.hw.write(Reg::PowerClock, 0);

        let clock = if ulpi_fsls {
            log::debug!("HCD: Host clock: 48Mhz");
            host_config::CLOCK_48_MHZ
        } else {
            log::debug!("HCD: Host clock: 30-60Mhz");
            host_config::CLOCK_30_60_MHZ
        };
        self.hw.modify(Reg::HostConfig, |v| {
            (v & !host_config::CLOCK_RATE_MASK) | clock | host_config::FSLS_ONLY
        });

        let rx = self.config.receive_fifo_size as u32;
        let np = self.config.non_periodic_fifo_size as u32;
        let periodic = self.config.periodic_fifo_size as u32;
        self.hw.write(Reg::ReceiveFifoSize, rx);
        self.hw.write(Reg::NonPeriodicFifoSize, (np << 16) | rx);
        self.hw
            .write(Reg::PeriodicFifoSize, (periodic << 16) | (rx + np));

        log::debug!("HCD: Set HNP: enabled");
        self.hw
            .modify(Reg::OtgControl, |v| v | OtgControl::HOST_SET_HNP_ENABLE.bits());

        self.flush_transmit_fifo(core_reset::FLUSH_ALL_TX)?;
        self.flush_receive_fifo()?;

        if self.hw.read(Reg::HostConfig) & host_config::ENABLE_DMA_DESCRIPTOR == 0 {
            self.halt_all_channels();
        }

        let port = self.hw.read(Reg::HostPort);
        if port & HostPort::POWER.bits() == 0 {
            log::debug!("HCD: Initial power physical host up");
            self.hw
                .write(Reg::HostPort, (port & host_port::WRITE_MASK) | HostPort::POWER.bits());
        }

        log::debug!("HCD: Initial resetting physical host");
        self.hw.modify(Reg::HostPort, |v| {
            (v & host_port::WRITE_MASK) | HostPort::RESET.bits()
        });
        self.platform.delay_ms(self.config.port_reset_hold_ms);
        self.hw.modify(Reg::HostPort, |v| {
            v & host_port::WRITE_MASK & !HostPort::RESET.bits()
        });

        log::info!("HCD: Successfully started");
        #[cfg(feature = "defmt")]
        defmt::info!("HCD: host started");

        Ok(())
    }

    /// Disable every channel, then halt each one into a known state
    fn halt_all_channels(&mut self) {
        let count = self.channel_count;
        for channel in 0..count {
            self.hw
                .modify(Reg::Channel(channel, ChannelReg::Characteristic), |v| {
                    (v & !hcchar::ENABLE) | hcchar::DISABLE | hcchar::DIRECTION_IN
                });
        }

        for channel in 0..count {
            let reg = Reg::Channel(channel, ChannelReg::Characteristic);
            self.hw
                .modify(reg, |v| v | hcchar::ENABLE | hcchar::DISABLE | hcchar::DIRECTION_IN);
            let timeout = RegisterTimeout::new(&self.platform, self.config.channel_halt_timeout);
            if timeout
                .wait_for(&mut self.hw, &self.platform, reg, |v| v & hcchar::ENABLE == 0)
                .is_err()
            {
                log::warn!("HCD: Unable to clear halt on channel {}", channel);
            }
        }
    }
}
