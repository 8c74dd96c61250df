//! Register access for memory-mapped DWC2 cores
//!
//! Implements volatile register access with memory barriers for the weakly
//! ordered ARM memory model, and the [`Mmio`] backend that exposes a mapped
//! controller through [`HostHardware`].

use core::cell::UnsafeCell;
use core::ptr::{read_volatile, write_volatile};

use super::{hcchar, ChannelReg, HostHardware, Reg};
use crate::error::{Result, UsbError};
use crate::platform::Platform;

#[inline(always)]
fn barrier() {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    cortex_m::asm::dmb();
    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

#[inline(always)]
fn sync_barrier() {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    cortex_m::asm::dsb();
    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

/// Register access wrapper with memory ordering
#[repr(transparent)]
pub struct Register<T> {
    value: UnsafeCell<T>,
}

unsafe impl<T> Send for Register<T> where T: Send {}
unsafe impl<T> Sync for Register<T> where T: Sync {}

impl Register<u32> {
    /// Read register with barriers on both sides
    #[inline(always)]
    pub fn read(&self) -> u32 {
        barrier();
        // SAFETY: the cell is only reached through volatile access
        let value = unsafe { read_volatile(self.value.get()) };
        barrier();
        value
    }

    /// Write register and wait for the write to complete
    #[inline(always)]
    pub fn write(&self, value: u32) {
        barrier();
        // SAFETY: the cell is only reached through volatile access
        unsafe { write_volatile(self.value.get(), value) };
        sync_barrier();
    }

    /// Read-modify-write with full barriers
    #[inline(always)]
    pub fn modify<F>(&self, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let current = self.read();
        self.write(f(current));
    }
}

/// Memory-mapped DWC2 core
///
/// `bus_address` translates a CPU address into the address the core's DMA
/// engine sees (on BCM283x parts this adds the uncached alias offset).
pub struct Mmio {
    base: usize,
    bus_address: fn(usize) -> u32,
}

impl Mmio {
    /// Create a backend for the core mapped at `base`
    ///
    /// # Safety
    ///
    /// `base` must be the mapped address of a DWC2 core, and the caller must
    /// ensure exclusive access to it for the lifetime of the backend.
    pub const unsafe fn new(base: usize, bus_address: fn(usize) -> u32) -> Self {
        Self { base, bus_address }
    }

    #[inline(always)]
    fn register(&self, reg: Reg) -> &Register<u32> {
        // SAFETY: `new` guarantees `base` maps the core and every `Reg`
        // offset lies inside its register window
        unsafe { &*((self.base + reg.offset()) as *const Register<u32>) }
    }
}

impl HostHardware for Mmio {
    fn read(&mut self, reg: Reg) -> u32 {
        self.register(reg).read()
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.register(reg).write(value);
    }

    fn modify<F>(&mut self, reg: Reg, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        self.register(reg).modify(f);
    }

    fn launch_channel(&mut self, channel: u8, buffer: &mut [u8]) {
        let address = (self.bus_address)(buffer.as_mut_ptr() as usize);
        self.register(Reg::Channel(channel, ChannelReg::DmaAddress))
            .write(address);
        self.register(Reg::Channel(channel, ChannelReg::Characteristic))
            .modify(hcchar::launch);
    }
}

/// Tick-based timeout for register polling
pub struct RegisterTimeout {
    start: u64,
    timeout: u64,
}

impl RegisterTimeout {
    /// Start a timeout of `timeout` platform ticks
    pub fn new<P: Platform>(platform: &P, timeout: u64) -> Self {
        Self {
            start: platform.ticks(),
            timeout,
        }
    }

    /// Check if the timeout has elapsed
    #[inline(always)]
    pub fn is_expired<P: Platform>(&self, platform: &P) -> bool {
        platform.tick_difference(self.start, platform.ticks()) > self.timeout
    }

    /// Poll a register until `condition` holds
    pub fn wait_for<H, P, F>(&self, hw: &mut H, platform: &P, reg: Reg, mut condition: F) -> Result<()>
    where
        H: HostHardware,
        P: Platform,
        F: FnMut(u32) -> bool,
    {
        while !condition(hw.read(reg)) {
            if self.is_expired(platform) {
                return Err(UsbError::Timeout);
            }
        }
        Ok(())
    }
}
