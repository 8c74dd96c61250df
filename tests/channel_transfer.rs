//! Channel transfer engine: retry policy, timeouts and splits on a simulated core

mod common;

use common::{bus, enumerated, Outcome, SimController, SimDevice, SimHost};
use dwc2_usbh::descriptor::DescriptorType;
use dwc2_usbh::dwc::ChannelInterrupt;
use dwc2_usbh::transfer::control::request_type;
use dwc2_usbh::{DeviceSpeed, Pipe, UsbError};

fn single_device() -> (SimHost, Pipe) {
    let usb = enumerated(SimController::with_root(SimDevice::plain(DeviceSpeed::High, 0xFF)));
    let pipe = usb.device_at(2).expect("device slot").pipe0;
    (usb, pipe)
}

fn read_device_descriptor(usb: &mut SimHost, pipe: &Pipe) -> dwc2_usbh::Result<usize> {
    let mut buffer = [0u8; 18];
    usb.controller_mut().get_descriptor(
        pipe,
        DescriptorType::Device as u8,
        0,
        0,
        &mut buffer,
        request_type::DEVICE_IN,
        false,
    )
}

fn force(usb: &mut SimHost, outcomes: &[Outcome]) {
    bus(usb).outcomes.extend(outcomes.iter().copied());
}

fn flags(flags: ChannelInterrupt) -> Outcome {
    Outcome::Flags(flags)
}

#[test]
fn silent_channel_times_out_and_a_retry_succeeds() {
    let (mut usb, pipe) = single_device();
    force(&mut usb, &[Outcome::Silent]);

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Err(UsbError::Timeout));
    // The core halts again on the next launch
    assert_eq!(read_device_descriptor(&mut usb, &pipe), Ok(18));
}

#[test]
fn naks_below_the_packet_cap_are_retried() {
    let (mut usb, pipe) = single_device();
    force(
        &mut usb,
        &[flags(ChannelInterrupt::NAK), flags(ChannelInterrupt::NAK)],
    );
    let before = bus(&mut usb).launches.len();

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Ok(18));
    // Two refused setups, then setup, data and status
    assert_eq!(bus(&mut usb).launches.len() - before, 5);
}

#[test]
fn third_nak_exhausts_the_packet_cap() {
    let (mut usb, pipe) = single_device();
    force(&mut usb, &[flags(ChannelInterrupt::NAK); 3]);

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Err(UsbError::Transmission));
}

#[test]
fn stall_ends_the_message_without_retry() {
    let (mut usb, pipe) = single_device();
    force(&mut usb, &[flags(ChannelInterrupt::STALL)]);
    let before = bus(&mut usb).launches.len();

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Err(UsbError::Stall));
    assert_eq!(bus(&mut usb).launches.len() - before, 1);
}

#[test]
fn data_stage_stall_ends_the_message_before_status() {
    let (mut usb, pipe) = single_device();
    let before = bus(&mut usb).launches.len();
    let mut buffer = [0u8; 9];
    let result = usb.controller_mut().get_descriptor(
        &pipe,
        DescriptorType::Hub as u8,
        0,
        0,
        &mut buffer,
        request_type::DEVICE_IN,
        false,
    );

    assert_eq!(result, Err(UsbError::Stall));
    // Setup accepted, data stage refused, no status stage
    assert_eq!(bus(&mut usb).launches.len() - before, 2);
}

#[test]
fn transaction_errors_below_the_global_cap_recover() {
    let (mut usb, pipe) = single_device();
    force(
        &mut usb,
        &[
            flags(ChannelInterrupt::TRANSACTION_ERROR),
            flags(ChannelInterrupt::TRANSACTION_ERROR),
        ],
    );

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Ok(18));
}

#[test]
fn repeated_babble_is_a_transmission_error() {
    let (mut usb, pipe) = single_device();
    force(&mut usb, &[flags(ChannelInterrupt::BABBLE); 3]);

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Err(UsbError::Transmission));
}

#[test]
fn ahb_error_is_fatal_on_first_sight() {
    let (mut usb, pipe) = single_device();
    force(
        &mut usb,
        &[flags(ChannelInterrupt::AHB_ERROR | ChannelInterrupt::ACK)],
    );
    let before = bus(&mut usb).launches.len();

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Err(UsbError::Device));
    assert_eq!(bus(&mut usb).launches.len() - before, 1);
}

#[test]
fn full_speed_device_behind_high_speed_hub_uses_start_and_complete_splits() {
    let mut hub = SimDevice::hub(DeviceSpeed::High, 2);
    hub.attach(1, SimDevice::plain(DeviceSpeed::Full, 0xFF));
    let mut usb = enumerated(SimController::with_root(hub));
    let pipe = usb.device_at(3).expect("device slot").pipe0;
    bus(&mut usb).launches.clear();

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Ok(18));
    let launches = bus(&mut usb).launches_to(3);
    // Start and complete split for each of setup, data and status
    assert_eq!(launches.len(), 6);
    assert!(launches.iter().all(|l| l.split.is_some() && !l.low_speed));
    let completes = launches.iter().filter(|l| l.complete_split).count();
    assert_eq!(completes, 3);
}

#[test]
fn unknown_channel_is_rejected() {
    let (mut usb, pipe) = single_device();
    let control = dwc2_usbh::PipeControl::control(15, dwc2_usbh::Direction::In);
    let mut buffer = [0u8; 8];
    let result = usb.controller_mut().channel_transfer(
        &pipe,
        &control,
        &mut buffer,
        dwc2_usbh::transfer::PacketId::Data1,
    );
    assert_eq!(result, Err(UsbError::Argument));
}

fn device_behind_hub() -> (SimHost, Pipe) {
    let mut hub = SimDevice::hub(DeviceSpeed::High, 2);
    hub.attach(0, SimDevice::plain(DeviceSpeed::Full, 0xFF));
    let mut usb = enumerated(SimController::with_root(hub));
    let pipe = usb.device_at(3).expect("device slot").pipe0;
    bus(&mut usb).launches.clear();
    (usb, pipe)
}

#[test]
fn stall_on_complete_split_is_reported_as_stall() {
    let (mut usb, pipe) = device_behind_hub();
    force(
        &mut usb,
        &[flags(ChannelInterrupt::ACK), flags(ChannelInterrupt::STALL)],
    );

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Err(UsbError::Stall));
    let launches = bus(&mut usb).launches_to(3);
    assert_eq!(launches.len(), 2);
    assert!(launches[1].complete_split);
}

#[test]
fn ahb_error_on_complete_split_is_fatal() {
    let (mut usb, pipe) = device_behind_hub();
    force(
        &mut usb,
        &[flags(ChannelInterrupt::ACK), flags(ChannelInterrupt::AHB_ERROR)],
    );

    assert_eq!(read_device_descriptor(&mut usb, &pipe), Err(UsbError::Device));
    assert_eq!(bus(&mut usb).launches_to(3).len(), 2);
}
