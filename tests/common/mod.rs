//! Shared test utilities for dwc2-usbh tests
//!
//! Provides the simulated controller and bus, a simulated board platform, and
//! descriptor builders used across the integration tests.

#![allow(dead_code)]

pub mod descriptors;
pub mod sim;

pub use sim::{Launch, Outcome, SimController, SimDevice, SimPlatform};

use dwc2_usbh::{HostConfig, UsbHost};

pub type SimHost = UsbHost<SimController, SimPlatform>;

/// Host over `sim` with the default configuration, not yet initialised
pub fn host(sim: SimController) -> SimHost {
    UsbHost::new(sim, SimPlatform::new(), HostConfig::new())
}

/// Host over `sim` with the bus fully enumerated
pub fn enumerated(sim: SimController) -> SimHost {
    let mut usb = host(sim);
    usb.initialize().expect("bus enumeration failed");
    usb
}

/// The simulated core behind `usb`
pub fn bus(usb: &mut SimHost) -> &mut SimController {
    usb.controller_mut().hardware()
}
