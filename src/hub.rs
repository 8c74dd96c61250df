//! USB hub class support
//!
//! Hub enumeration powers every port and sweeps them for connections. Port
//! status is polled, never interrupt driven: [`UsbHost::check_for_change`]
//! walks every hub reachable from the root and reacts to each port's change
//! bits, clearing them so they do not fire again.
//!
//! Ports are zero-based inside the driver and one-based on the wire.

use crate::config::{MAX_CHILDREN_PER_DEVICE, PORT_RESET_POLLS, PORT_RESET_POLL_MS, PORT_RESET_RETRIES};
use crate::descriptor::{DescriptorType, HubDescriptor};
use crate::dwc::HostHardware;
use crate::error::{Result, UsbError};
use crate::platform::Platform;
use crate::registry::ParentLink;
use crate::transfer::control::request_type;
use crate::transfer::{DeviceSpeed, Pipe};
use crate::UsbHost;

/// Hub feature selectors for SET_FEATURE/CLEAR_FEATURE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
#[allow(missing_docs)]
pub enum HubFeature {
    LocalPowerChange = 0,
    OverCurrentChange = 1,
}

/// Port feature selectors for SET_FEATURE/CLEAR_FEATURE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
#[allow(missing_docs)]
pub enum PortFeature {
    Connection = 0,
    Enable = 1,
    Suspend = 2,
    OverCurrent = 3,
    Reset = 4,
    Power = 8,
    LowSpeed = 9,
    ConnectionChange = 16,
    EnableChange = 17,
    SuspendChange = 18,
    OverCurrentChange = 19,
    ResetChange = 20,
    Test = 21,
    Indicator = 22,
}

impl PortFeature {
    /// Decode a feature selector
    pub const fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            0 => Self::Connection,
            1 => Self::Enable,
            2 => Self::Suspend,
            3 => Self::OverCurrent,
            4 => Self::Reset,
            8 => Self::Power,
            9 => Self::LowSpeed,
            16 => Self::ConnectionChange,
            17 => Self::EnableChange,
            18 => Self::SuspendChange,
            19 => Self::OverCurrentChange,
            20 => Self::ResetChange,
            21 => Self::Test,
            22 => Self::Indicator,
            _ => return None,
        })
    }
}

/// Hub status bits (wHubStatus)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HubStatus {
    /// Local power supply lost - Bit 0
    pub local_power: bool,
    /// Hub over-current - Bit 1
    pub over_current: bool,
}

impl HubStatus {
    /// Parse from the low half of a hub status word
    pub fn from_raw(status: u32) -> Self {
        Self {
            local_power: (status & (1 << 0)) != 0,
            over_current: (status & (1 << 1)) != 0,
        }
    }

    /// Encode as wHubStatus
    pub fn to_raw(&self) -> u16 {
        (self.local_power as u16) | ((self.over_current as u16) << 1)
    }
}

/// Hub port status bits (wPortStatus)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortStatus {
    /// Device present - Bit 0
    pub connected: bool,
    /// Port enabled - Bit 1
    pub enabled: bool,
    /// Bit 2
    pub suspended: bool,
    /// Bit 3
    pub over_current: bool,
    /// Reset signalling in progress - Bit 4
    pub reset: bool,
    /// Port powered - Bit 8
    pub power: bool,
    /// Low-speed device attached - Bit 9
    pub low_speed: bool,
    /// High-speed device attached - Bit 10
    pub high_speed: bool,
    /// Bit 11
    pub test_mode: bool,
    /// Software indicator control - Bit 12
    pub indicator: bool,
}

impl PortStatus {
    /// Parse from the low half of a port status word
    pub fn from_raw(status: u32) -> Self {
        Self {
            connected: (status & (1 << 0)) != 0,
            enabled: (status & (1 << 1)) != 0,
            suspended: (status & (1 << 2)) != 0,
            over_current: (status & (1 << 3)) != 0,
            reset: (status & (1 << 4)) != 0,
            power: (status & (1 << 8)) != 0,
            low_speed: (status & (1 << 9)) != 0,
            high_speed: (status & (1 << 10)) != 0,
            test_mode: (status & (1 << 11)) != 0,
            indicator: (status & (1 << 12)) != 0,
        }
    }

    /// Encode as wPortStatus
    pub fn to_raw(&self) -> u16 {
        (self.connected as u16)
            | ((self.enabled as u16) << 1)
            | ((self.suspended as u16) << 2)
            | ((self.over_current as u16) << 3)
            | ((self.reset as u16) << 4)
            | ((self.power as u16) << 8)
            | ((self.low_speed as u16) << 9)
            | ((self.high_speed as u16) << 10)
            | ((self.test_mode as u16) << 11)
            | ((self.indicator as u16) << 12)
    }

    /// Get device speed based on port status
    pub fn device_speed(&self) -> DeviceSpeed {
        if self.high_speed {
            DeviceSpeed::High
        } else if self.low_speed {
            DeviceSpeed::Low
        } else {
            DeviceSpeed::Full
        }
    }
}

/// Hub port change bits (wPortChange)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortChange {
    /// Connect status changed - Bit 0
    pub connection: bool,
    /// Port disabled by an error - Bit 1
    pub enabled: bool,
    /// Resume complete - Bit 2
    pub suspended: bool,
    /// Over-current indicator changed - Bit 3
    pub over_current: bool,
    /// Reset complete - Bit 4
    pub reset: bool,
}

impl PortChange {
    /// Parse from the high half of a port status word
    pub fn from_raw(status: u32) -> Self {
        let change = status >> 16;
        Self {
            connection: (change & (1 << 0)) != 0,
            enabled: (change & (1 << 1)) != 0,
            suspended: (change & (1 << 2)) != 0,
            over_current: (change & (1 << 3)) != 0,
            reset: (change & (1 << 4)) != 0,
        }
    }

    /// Encode as wPortChange
    pub fn to_raw(&self) -> u16 {
        (self.connection as u16)
            | ((self.enabled as u16) << 1)
            | ((self.suspended as u16) << 2)
            | ((self.over_current as u16) << 3)
            | ((self.reset as u16) << 4)
    }
}

impl<H: HostHardware, P: Platform> UsbHost<H, P> {
    fn hub_pipe(&self, hub: u8) -> Result<Pipe> {
        if !self.registry.is_hub(hub) {
            return Err(UsbError::Device);
        }
        self.registry
            .device(hub)
            .map(|d| d.pipe0)
            .ok_or(UsbError::Device)
    }

    fn port_status(&mut self, pipe: &Pipe, port: u8) -> Result<(PortStatus, PortChange)> {
        let raw = self.controller.read_hub_port_status(pipe, port + 1)?;
        Ok((PortStatus::from_raw(raw), PortChange::from_raw(raw)))
    }

    fn clear_port_feature(&mut self, pipe: &Pipe, feature: PortFeature, port: u8) -> Result<()> {
        self.controller
            .change_hub_port_feature(pipe, feature as u16, port + 1, false)
    }

    /// Reset zero-based `port` of `hub` until it reports enabled
    ///
    /// Up to three reset attempts, each polled every 20 ms for up to ten
    /// polls. A connect change or disconnect during reset is
    /// [`UsbError::Device`].
    pub fn hub_port_reset(&mut self, hub: u8, port: u8) -> Result<()> {
        let pipe = self.hub_pipe(hub)?;
        log::debug!("HUB: Resetting device: {} Port: {}", hub, port);

        let mut enabled = false;
        for _ in 0..PORT_RESET_RETRIES {
            if let Err(e) = self.controller.change_hub_port_feature(
                &pipe,
                PortFeature::Reset as u16,
                port + 1,
                true,
            ) {
                log::warn!("HUB: Device {} failed to reset Port{}", hub, port + 1);
                return Err(e);
            }

            let mut polls = 0;
            let (status, change) = loop {
                self.controller.platform.delay_ms(PORT_RESET_POLL_MS);
                let reading = self.port_status(&pipe, port).map_err(|e| {
                    log::warn!("HUB: Hub failed to get status (4) for {}.Port{}", hub, port + 1);
                    e
                })?;
                polls += 1;
                if reading.1.reset || reading.0.enabled || polls >= PORT_RESET_POLLS {
                    break reading;
                }
            };

            if !change.reset && !status.enabled {
                continue;
            }

            log::debug!(
                "HUB: {}.Port{} Status {:#06x}:{:#06x}",
                self.description(hub),
                port + 1,
                status.to_raw(),
                change.to_raw()
            );

            if change.connection || !status.connected {
                return Err(UsbError::Device);
            }

            if status.enabled {
                enabled = true;
                break;
            }
        }

        if !enabled {
            log::warn!(
                "HUB: Cannot enable {}.Port{}. Please verify the hardware is working.",
                self.description(hub),
                port + 1
            );
            return Err(UsbError::Device);
        }

        if self
            .clear_port_feature(&pipe, PortFeature::ResetChange, port)
            .is_err()
        {
            log::warn!("HUB: Failed to clear reset on {}.Port{}", self.description(hub), port + 1);
        }
        Ok(())
    }

    /// React to a connection change on zero-based `port` of `hub`
    ///
    /// A stale child is torn down first. If the port is still connected it is
    /// reset, a new device slot is allocated, and the child is enumerated. On
    /// enumeration failure the child is released and the port disabled.
    pub fn hub_port_connection_changed(&mut self, hub: u8, port: u8) -> Result<()> {
        let pipe = self.hub_pipe(hub)?;

        let (status, change) = self.port_status(&pipe, port).map_err(|e| {
            log::warn!("HUB: Hub failed to get status (2) for {}.Port{}", hub, port + 1);
            e
        })?;
        log::debug!(
            "HUB: {}.Port{} Status {:#06x}:{:#06x}",
            self.description(hub),
            port + 1,
            status.to_raw(),
            change.to_raw()
        );

        if self
            .clear_port_feature(&pipe, PortFeature::ConnectionChange, port)
            .is_err()
        {
            log::warn!("HUB: Failed to clear change on {}.Port{}", self.description(hub), port + 1);
        }

        let existing = self.registry.child(hub, port);
        if (!status.connected && !status.enabled) || existing.is_some() {
            log::info!(
                "HUB: Disconnected {}.Port{} - {}",
                self.description(hub),
                port + 1,
                existing.map_or("empty", |child| self.description(child))
            );
            if let Some(child) = existing {
                self.registry.deallocate_device(child);
            }
            self.registry.set_child(hub, port, None);
            if !status.connected {
                return Ok(());
            }
        }

        if let Err(e) = self.hub_port_reset(hub, port) {
            log::warn!(
                "HUB: Could not reset {}.Port{} for new device",
                self.description(hub),
                port + 1
            );
            return Err(e);
        }

        let child = self.registry.allocate_device().map_err(|e| {
            log::warn!(
                "HUB: Could not allocate a new device entry for {}.Port{}",
                hub,
                port + 1
            );
            e
        })?;
        self.registry.set_child(hub, port, Some(child));

        if let Err(e) = self.attach_child(&pipe, hub, port, child) {
            log::warn!(
                "HUB: Could not connect to new device in {}.Port{}. Disabling.",
                self.description(hub),
                port + 1
            );
            self.registry.deallocate_device(child);
            self.registry.set_child(hub, port, None);
            if self
                .clear_port_feature(&pipe, PortFeature::Enable, port)
                .is_err()
            {
                log::warn!("HUB: Failed to disable {}.Port{}", self.description(hub), port + 1);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Record speed and parent of the freshly allocated `child`, then
    /// enumerate it; the caller releases the slot on failure
    fn attach_child(&mut self, pipe: &Pipe, hub: u8, port: u8, child: u8) -> Result<()> {
        let (status, change) = self.port_status(pipe, port).map_err(|e| {
            log::warn!("HUB: Hub failed to get status (3) for {}.Port{}", hub, port + 1);
            e
        })?;
        log::debug!(
            "HUB: {}. Device:{} Port:{} Status {:#06x}:{:#06x}",
            self.description(hub),
            hub,
            port,
            status.to_raw(),
            change.to_raw()
        );

        let speed = status.device_speed();
        if let Some(device) = self.registry.device_mut(child) {
            device.pipe0.speed = speed;
            if speed == DeviceSpeed::Low {
                device.pipe0.hub_address = hub;
                device.pipe0.hub_port = port;
            }
            device.parent = Some(ParentLink { hub, port });
        }

        self.enumerate_device(child, Some(ParentLink { hub, port }))
    }

    /// Check zero-based `port` of `hub` and react to every change bit
    pub fn hub_check_connection(&mut self, hub: u8, port: u8) -> Result<()> {
        let pipe = self.hub_pipe(hub)?;

        let (status, change) = self.port_status(&pipe, port).map_err(|e| {
            log::warn!("HUB: Failed to get hub port status (1) for {}.Port{}", hub, port + 1);
            e
        })?;

        if change.connection {
            log::debug!("HUB: Device {}, Port: {} changed", hub, port);
            // Failures are logged inside and scoped to the port
            let _ = self.hub_port_connection_changed(hub, port);
        }

        if change.enabled {
            if self
                .clear_port_feature(&pipe, PortFeature::EnableChange, port)
                .is_err()
            {
                log::warn!(
                    "HUB: Failed to clear enable change {}.Port{}",
                    self.description(hub),
                    port + 1
                );
            }

            if !status.enabled && status.connected && self.registry.child(hub, port).is_some() {
                log::warn!(
                    "HUB: {}.Port{} has been disabled, but is connected. Reenabling!",
                    self.description(hub),
                    port + 1
                );
                let _ = self.hub_port_connection_changed(hub, port);
            }
        }

        if status.suspended
            && self
                .clear_port_feature(&pipe, PortFeature::Suspend, port)
                .is_err()
        {
            log::warn!(
                "HUB: Failed to clear suspended port - {}.Port{}",
                self.description(hub),
                port + 1
            );
        }

        if change.over_current
            && self
                .clear_port_feature(&pipe, PortFeature::OverCurrentChange, port)
                .is_err()
        {
            log::warn!(
                "HUB: Failed to clear over current port - {}.Port{}",
                self.description(hub),
                port + 1
            );
        }

        if change.reset
            && self
                .clear_port_feature(&pipe, PortFeature::ResetChange, port)
                .is_err()
        {
            log::warn!(
                "HUB: Failed to clear reset port - {}.Port{}",
                self.description(hub),
                port + 1
            );
        }

        Ok(())
    }

    /// Sweep every port of `hub`, then recurse into its children
    pub(crate) fn hub_check_for_change(&mut self, hub: u8) {
        let Some(ports) = self.registry.hub(hub).map(|h| h.max_children) else {
            return;
        };
        for port in 0..ports {
            if self.hub_check_connection(hub, port).is_err() {
                continue;
            }
            if let Some(child) = self.registry.child(hub, port) {
                self.hub_check_for_change(child);
            }
        }
    }

    /// Hub class continuation of enumeration
    ///
    /// Reads the hub descriptor, powers every port, waits the hub's
    /// power-good delay, then checks each port for an attached device.
    pub(crate) fn enumerate_hub(&mut self, address: u8) -> Result<()> {
        self.registry.add_hub_payload(address).map_err(|e| {
            log::warn!("HUB: Could not allocate hub payload, {}", e);
            e
        })?;
        let pipe = self
            .registry
            .device(address)
            .map(|d| d.pipe0)
            .ok_or(UsbError::Internal)?;

        let mut raw = [0u8; HubDescriptor::SIZE];
        let descriptor = match self.controller.get_descriptor(
            &pipe,
            DescriptorType::Hub as u8,
            0,
            0,
            &mut raw,
            request_type::HUB_IN,
            true,
        ) {
            Ok(n) if n == HubDescriptor::SIZE => HubDescriptor::from_bytes(&raw),
            _ => None,
        };
        let Some(descriptor) = descriptor else {
            log::warn!("HCD: Could not fetch hub descriptor for device: {}", address);
            return Err(UsbError::Device);
        };

        log::debug!("HUB: Hub device {} has {} ports", address, descriptor.b_nbr_ports);
        log::debug!("HUB: Hub power to good: {}ms", descriptor.b_pwr_on_2_pwr_good as u32 * 2);
        log::debug!("HUB: Hub current required: {}mA", descriptor.b_hub_contr_current as u32 * 2);

        let ports = if descriptor.b_nbr_ports as usize > MAX_CHILDREN_PER_DEVICE {
            log::warn!(
                "HUB: Device {} is too big for this driver to handle. Only the first {} ports will be used.",
                address,
                MAX_CHILDREN_PER_DEVICE
            );
            MAX_CHILDREN_PER_DEVICE as u8
        } else {
            descriptor.b_nbr_ports
        };
        if let Some(payload) = self.registry.hub_mut(address) {
            payload.descriptor = descriptor;
            payload.max_children = ports;
        }

        if let Err(e) = self.controller.read_hub_port_status(&pipe, 0) {
            log::warn!("HUB: Device {} failed to get hub status", address);
            return Err(e);
        }

        log::debug!("HUB: Hub powering ports on");
        for port in 0..ports {
            if self
                .controller
                .change_hub_port_feature(&pipe, PortFeature::Power as u16, port + 1, true)
                .is_err()
            {
                log::warn!("HUB: Device {} could not power Port{}", address, port + 1);
            }
        }
        self.controller
            .platform
            .delay_ms(descriptor.b_pwr_on_2_pwr_good as u32 * 2);

        for port in 0..ports {
            let _ = self.hub_check_connection(address, port);
        }

        Ok(())
    }
}
