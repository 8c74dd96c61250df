//! Channel transfer engine
//!
//! Drives one host channel through a USB transaction: program the channel,
//! launch it, poll for halt, classify the interrupt flags and retry per a
//! bounded policy. Transactions to full/low-speed devices behind a high-speed
//! hub go out as a start-split followed by complete-splits until the hub's
//! transaction translator hands back the result.

use super::{DeviceSpeed, PacketId, Pipe, PipeControl};
use crate::config::{MAX_GLOBAL_TRIES, MAX_PACKET_TRIES, MAX_SPLIT_TRIES};
use crate::dwc::controller::Dwc2Controller;
use crate::dwc::{hcchar, hcsplt, hctsiz, ChannelInterrupt, ChannelReg, HostHardware, Reg};
use crate::error::{Result, UsbError};
use crate::platform::Platform;

/// Retry counters and next-action flags for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendControl {
    /// Start-split resends in the current split sequence
    pub split_tries: u8,
    /// Resends of a non-split packet
    pub packet_tries: u8,
    /// Hard wire errors seen since the last acknowledgement
    pub global_tries: u8,
    /// Device answered NYET, pace the next complete-split slower
    pub longer_delay: bool,
    /// Next action: issue a complete-split
    pub resend_split: bool,
    /// Next action: relaunch the packet
    pub retry: bool,
    /// Transfer cannot continue
    pub fatal: bool,
    /// Transaction completed
    pub success: bool,
}

/// Classify the halt flags of one transaction and decide what happens next
///
/// Evaluation order matters and is fixed:
///
/// 1. AHB and data toggle errors are fatal immediately.
/// 2. ACK with transfer complete is success; ACK alone asks for a
///    complete-split. Either way the global error count restarts.
/// 3. Anything else counts as a retry, against the split budget for split
///    transactions and the packet budget otherwise.
/// 4. NAK and NYET without a stall, babble or overrun are soft retries and
///    never touch the global count.
/// 5. Everything left is a hard wire error and counts toward the global cap.
///    A stall then ends the transfer; babble, overrun and transaction errors
///    report as transmission errors and stay retryable.
pub fn check_error_and_action(
    interrupts: ChannelInterrupt,
    is_split: bool,
    control: &mut SendControl,
) -> Result<()> {
    control.resend_split = false;
    control.retry = false;

    if interrupts.contains(ChannelInterrupt::AHB_ERROR) {
        control.fatal = true;
        return Err(UsbError::Device);
    }
    if interrupts.contains(ChannelInterrupt::DATA_TOGGLE_ERROR) {
        control.fatal = true;
        return Err(UsbError::Transmission);
    }

    if interrupts.contains(ChannelInterrupt::ACK) {
        if interrupts.contains(ChannelInterrupt::TRANSFER_COMPLETE) {
            control.success = true;
            control.packet_tries = 0;
            control.split_tries = 0;
        } else {
            control.resend_split = true;
        }
        control.global_tries = 0;
        return Ok(());
    }

    if is_split {
        control.split_tries += 1;
        if control.split_tries == MAX_SPLIT_TRIES {
            control.fatal = true;
            return Err(UsbError::Transmission);
        }
        control.resend_split = true;
    } else {
        control.packet_tries += 1;
        if control.packet_tries == MAX_PACKET_TRIES {
            control.fatal = true;
            return Err(UsbError::Transmission);
        }
        control.retry = true;
    }

    let wire_error = ChannelInterrupt::STALL | ChannelInterrupt::BABBLE | ChannelInterrupt::FRAME_OVERRUN;
    if !interrupts.intersects(wire_error) {
        if interrupts.contains(ChannelInterrupt::NAK) {
            return Err(UsbError::Transmission);
        }
        if interrupts.contains(ChannelInterrupt::NOT_YET) {
            control.longer_delay = true;
            return Err(UsbError::Transmission);
        }
        return Err(UsbError::Timeout);
    }

    control.global_tries += 1;
    if control.global_tries == MAX_GLOBAL_TRIES {
        control.retry = false;
        control.resend_split = false;
        control.fatal = true;
        return Err(UsbError::Transmission);
    }

    if interrupts.contains(ChannelInterrupt::STALL) {
        control.retry = false;
        control.resend_split = false;
        control.fatal = true;
        return Err(UsbError::Stall);
    }
    if interrupts.intersects(
        ChannelInterrupt::BABBLE | ChannelInterrupt::FRAME_OVERRUN | ChannelInterrupt::TRANSACTION_ERROR,
    ) {
        return Err(UsbError::Transmission);
    }
    Err(UsbError::General)
}

impl<H: HostHardware, P: Platform> Dwc2Controller<H, P> {
    /// Poll `channel` until it halts, returning the interrupt flags it raised
    ///
    /// On timeout the flags read so far are dropped and the channel is left
    /// as is; callers reprogram it before the next launch.
    pub fn wait_for_halt(&mut self, channel: u8) -> Result<ChannelInterrupt> {
        let start = self.platform.ticks();
        loop {
            self.platform.delay_us(self.config.poll_interval_us);
            let elapsed = self.platform.tick_difference(start, self.platform.ticks());
            if elapsed > self.config.channel_timeout {
                return Err(UsbError::Timeout);
            }
            let flags = ChannelInterrupt::from_bits_retain(
                self.hw.read(Reg::Channel(channel, ChannelReg::Interrupt)),
            );
            if flags.contains(ChannelInterrupt::HALT) {
                return Ok(flags);
            }
        }
    }

    fn clear_channel_interrupts(&mut self, channel: u8) {
        self.hw
            .write(Reg::Channel(channel, ChannelReg::Interrupt), 0xFFFF_FFFF);
        self.hw
            .write(Reg::Channel(channel, ChannelReg::InterruptMask), 0);
    }

    fn split_enabled(&mut self, channel: u8) -> bool {
        self.hw.read(Reg::Channel(channel, ChannelReg::SplitControl)) & hcsplt::SPLIT_ENABLE != 0
    }

    /// Run one transfer of `buffer` on the channel named by `control`
    ///
    /// Each launch resumes at the byte offset the channel reports as not yet
    /// transferred. Returns the number of bytes moved, which is short of
    /// `buffer.len()` when an IN transfer ends on a short packet.
    pub fn channel_transfer(
        &mut self,
        pipe: &Pipe,
        control: &PipeControl,
        buffer: &mut [u8],
        packet_id: PacketId,
    ) -> Result<usize> {
        let channel = control.channel;
        if channel > self.channel_count {
            log::warn!("HCD: Channel {} is not available on this host", channel);
            return Err(UsbError::Argument);
        }

        let length = buffer.len() as u32;
        let max_packet = pipe.max_size.to_number();

        self.clear_channel_interrupts(channel);

        let mut characteristic = ((max_packet << hcchar::MAX_PACKET_SHIFT) & hcchar::MAX_PACKET_MASK)
            | (((pipe.endpoint as u32) << hcchar::ENDPOINT_SHIFT) & hcchar::ENDPOINT_MASK)
            | (((control.transfer_type as u32) << hcchar::TYPE_SHIFT) & hcchar::TYPE_MASK)
            | (((pipe.address as u32) << hcchar::DEVICE_ADDRESS_SHIFT) & hcchar::DEVICE_ADDRESS_MASK);
        if control.direction == super::Direction::In {
            characteristic |= hcchar::DIRECTION_IN;
        }
        if pipe.speed == DeviceSpeed::Low {
            characteristic |= hcchar::LOW_SPEED;
        }
        self.hw
            .write(Reg::Channel(channel, ChannelReg::Characteristic), characteristic);

        let split = if pipe.speed != DeviceSpeed::High {
            log::debug!(
                "HCD: Split control hub: {} port: {} packet size: {}",
                pipe.hub_address,
                pipe.hub_port,
                max_packet
            );
            hcsplt::start_split(pipe.hub_address, pipe.hub_port)
        } else {
            0
        };
        self.hw
            .write(Reg::Channel(channel, ChannelReg::SplitControl), split);

        let packet_count = match pipe.speed {
            DeviceSpeed::Low => (length + 7) / 8,
            _ => length.div_ceil(max_packet),
        }
        .max(1);
        self.hw.write(
            Reg::Channel(channel, ChannelReg::TransferSize),
            hctsiz::encode(length, packet_count, packet_id as u32),
        );

        let mut send = SendControl::default();
        let mut offset = 0usize;
        loop {
            self.clear_channel_interrupts(channel);
            self.hw
                .modify(Reg::Channel(channel, ChannelReg::SplitControl), |v| {
                    v & !hcsplt::COMPLETE_SPLIT
                });

            self.hw.launch_channel(channel, &mut buffer[offset..]);
            let flags = match self.wait_for_halt(channel) {
                Ok(flags) => flags,
                Err(e) => {
                    log::warn!("HCD: Request on channel {} has timed out", channel);
                    return Err(e);
                }
            };

            let is_split = self.split_enabled(channel);
            let result = check_error_and_action(flags, is_split, &mut send);
            if let Err(e) = result {
                log::debug!(
                    "HCD: Result: {} action: {:?} interrupts: {:#010x}",
                    e,
                    send,
                    flags.bits()
                );
            }
            if send.fatal {
                return result.map(|()| offset);
            }

            send.split_tries = 0;
            while send.resend_split {
                self.clear_channel_interrupts(channel);
                self.hw
                    .modify(Reg::Channel(channel, ChannelReg::SplitControl), |v| {
                        v | hcsplt::COMPLETE_SPLIT
                    });

                self.hw.launch_channel(channel, &mut buffer[offset..]);
                let flags = match self.wait_for_halt(channel) {
                    Ok(flags) => flags,
                    Err(e) => {
                        log::warn!(
                            "HCD: Request split completion on channel {} has timed out",
                            channel
                        );
                        return Err(e);
                    }
                };

                let is_split = self.split_enabled(channel);
                let result = check_error_and_action(flags, is_split, &mut send);
                if send.fatal {
                    return result.map(|()| offset);
                }
                let pause = if send.longer_delay {
                    self.config.split_long_delay_us
                } else {
                    self.config.split_delay_us
                };
                self.platform.delay_us(pause);
            }

            let size = self.hw.read(Reg::Channel(channel, ChannelReg::TransferSize));
            if send.success {
                offset = (length - hctsiz::size(size).min(length)) as usize;
            }
            if hctsiz::packet_count(size) == 0 {
                return Ok(offset);
            }
        }
    }
}
