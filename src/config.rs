//! Host driver configuration
//!
//! Tunables that vary between boards live in [`HostConfig`]; protocol policy
//! (retry caps, pool capacities) is fixed and exposed as constants.

/// Start-split resend cap before a split transaction is declared failed
pub const MAX_SPLIT_TRIES: u8 = 5;
/// Per-packet retry cap for non-split transactions
pub const MAX_PACKET_TRIES: u8 = 3;
/// Hard wire errors tolerated across one transfer before it becomes fatal
pub const MAX_GLOBAL_TRIES: u8 = 3;

/// Channel used for every control transfer
pub const CONTROL_CHANNEL: u8 = 0;
/// Largest data stage accepted by a control message
pub const CONTROL_BUFFER_SIZE: usize = 1024;

/// Device slots, including the emulated root hub in slot 0
pub const MAX_DEVICES: usize = 32;
/// Hub payload slots
pub const MAX_HUBS: usize = 16;
/// HID payload slots
pub const MAX_HIDS: usize = 16;
/// Downstream ports tracked per hub
pub const MAX_CHILDREN_PER_DEVICE: usize = 10;
/// Interfaces recorded per device
pub const MAX_INTERFACES_PER_DEVICE: usize = 8;
/// Endpoints recorded per interface
pub const MAX_ENDPOINTS_PER_INTERFACE: usize = 16;
/// HID descriptors recorded per device
pub const MAX_HID_PER_DEVICE: usize = 4;

/// Attempts at resetting a hub port
pub const PORT_RESET_RETRIES: u8 = 3;
/// Status polls per port reset attempt
pub const PORT_RESET_POLLS: u8 = 10;
/// Delay between port reset status polls (milliseconds)
pub const PORT_RESET_POLL_MS: u32 = 20;

/// Board-level driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostConfig {
    /// Receive FIFO depth in words
    pub receive_fifo_size: u16,
    /// Non-periodic transmit FIFO depth in words
    pub non_periodic_fifo_size: u16,
    /// Periodic transmit FIFO depth in words
    pub periodic_fifo_size: u16,
    /// Ticks a channel may take to halt after launch
    pub channel_timeout: u64,
    /// Ticks allowed for core soft reset and FIFO flushes
    pub core_reset_timeout: u64,
    /// Ticks allowed for a channel to halt during bring-up
    pub channel_halt_timeout: u64,
    /// Root port reset hold time (milliseconds)
    pub port_reset_hold_ms: u32,
    /// Delay between complete-split attempts (microseconds)
    pub split_delay_us: u32,
    /// Delay after a NYET response (microseconds)
    pub split_long_delay_us: u32,
    /// Poll interval while waiting for a channel to halt (microseconds)
    pub poll_interval_us: u32,
}

impl HostConfig {
    /// Default configuration used by most DWC2 integrations
    pub const fn new() -> Self {
        Self {
            receive_fifo_size: 20480,
            non_periodic_fifo_size: 20480,
            periodic_fifo_size: 20480,
            channel_timeout: 5000,
            core_reset_timeout: 100_000,
            channel_halt_timeout: 0x10_0000,
            port_reset_hold_ms: 60,
            split_delay_us: 2500,
            split_long_delay_us: 10_000,
            poll_interval_us: 100,
        }
    }

    /// Set the receive FIFO depth
    pub const fn receive_fifo_size(mut self, words: u16) -> Self {
        self.receive_fifo_size = words;
        self
    }

    /// Set the non-periodic transmit FIFO depth
    pub const fn non_periodic_fifo_size(mut self, words: u16) -> Self {
        self.non_periodic_fifo_size = words;
        self
    }

    /// Set the periodic transmit FIFO depth
    pub const fn periodic_fifo_size(mut self, words: u16) -> Self {
        self.periodic_fifo_size = words;
        self
    }

    /// Set the channel halt timeout in ticks
    pub const fn channel_timeout(mut self, ticks: u64) -> Self {
        self.channel_timeout = ticks;
        self
    }

    /// Set the soft reset and flush timeout in ticks
    pub const fn core_reset_timeout(mut self, ticks: u64) -> Self {
        self.core_reset_timeout = ticks;
        self
    }

    /// Set the bring-up channel halt timeout in ticks
    pub const fn channel_halt_timeout(mut self, ticks: u64) -> Self {
        self.channel_halt_timeout = ticks;
        self
    }

    /// Set the root port reset hold time
    pub const fn port_reset_hold_ms(mut self, ms: u32) -> Self {
        self.port_reset_hold_ms = ms;
        self
    }

    /// Set complete-split pacing
    pub const fn split_delays_us(mut self, normal: u32, not_yet: u32) -> Self {
        self.split_delay_us = normal;
        self.split_long_delay_us = not_yet;
        self
    }

    /// Set the halt poll interval
    pub const fn poll_interval_us(mut self, us: u32) -> Self {
        self.poll_interval_us = us;
        self
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new()
    }
}
