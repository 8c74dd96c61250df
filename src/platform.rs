//! Board services the driver depends on
//!
//! The host driver blocks with short sleeps while polling the controller and
//! measures timeouts against a free-running tick counter. Both come from the
//! board through [`Platform`].

use embedded_hal::delay::DelayNs;

use crate::error::Result;

/// Delay, time base and power control supplied by the board
///
/// Timeouts in [`HostConfig`](crate::config::HostConfig) are expressed in the
/// units of [`Platform::ticks`]; on most boards this is a 1 MHz system timer.
pub trait Platform: DelayNs {
    /// Current value of the free-running tick counter
    fn ticks(&self) -> u64;

    /// Ticks elapsed from `earlier` to `later`, tolerating wrap-around
    fn tick_difference(&self, earlier: u64, later: u64) -> u64 {
        later.wrapping_sub(earlier)
    }

    /// Switch power to the USB block
    fn set_power(&mut self, on: bool) -> Result<()>;
}
