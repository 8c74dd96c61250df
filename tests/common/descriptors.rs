//! Descriptor builders for simulated devices

/// Standard device descriptor
pub fn device_descriptor(
    class: u8,
    vendor: u16,
    product: u16,
    max_packet: u8,
    strings: (u8, u8, u8),
) -> Vec<u8> {
    let vendor = vendor.to_le_bytes();
    let product = product.to_le_bytes();
    vec![
        0x12,       // bLength
        0x01,       // bDescriptorType (DEVICE)
        0x00, 0x02, // bcdUSB (2.0)
        class,      // bDeviceClass
        0x00,       // bDeviceSubClass
        0x00,       // bDeviceProtocol
        max_packet, // bMaxPacketSize0
        vendor[0], vendor[1],
        product[0], product[1],
        0x00, 0x01, // bcdDevice (1.0)
        strings.0,  // iManufacturer
        strings.1,  // iProduct
        strings.2,  // iSerialNumber
        0x01,       // bNumConfigurations
    ]
}

/// Configuration descriptor wrapping `body` (interfaces, class and endpoint descriptors)
pub fn configuration(value: u8, string: u8, interfaces: u8, body: &[u8]) -> Vec<u8> {
    let total = (9 + body.len()) as u16;
    let total = total.to_le_bytes();
    let mut blob = vec![
        0x09,       // bLength
        0x02,       // bDescriptorType (CONFIGURATION)
        total[0], total[1],
        interfaces, // bNumInterfaces
        value,      // bConfigurationValue
        string,     // iConfiguration
        0x80,       // bmAttributes (bus powered)
        0x32,       // bMaxPower (100mA)
    ];
    blob.extend_from_slice(body);
    blob
}

/// Interface descriptor
pub fn interface(number: u8, endpoints: u8, class: u8, subclass: u8, protocol: u8) -> [u8; 9] {
    [9, 0x04, number, 0, endpoints, class, subclass, protocol, 0]
}

/// Endpoint descriptor
pub fn endpoint(address: u8, attributes: u8, max_packet: u16, interval: u8) -> [u8; 7] {
    let size = max_packet.to_le_bytes();
    [7, 0x05, address, attributes, size[0], size[1], interval]
}

/// HID class descriptor announcing one report descriptor
pub fn hid_descriptor(report_length: u16) -> [u8; 9] {
    let length = report_length.to_le_bytes();
    [9, 0x21, 0x11, 0x01, 0x00, 0x01, 0x22, length[0], length[1]]
}

/// Hub class descriptor for `ports` downstream ports
pub fn hub_descriptor(ports: u8) -> Vec<u8> {
    vec![9, 0x29, ports, 0x00, 0x00, 50, 0, 0x00, 0xFF]
}

/// Language table string descriptor
pub fn languages(ids: &[u16]) -> Vec<u8> {
    let mut blob = vec![(2 + 2 * ids.len()) as u8, 0x03];
    for id in ids {
        blob.extend_from_slice(&id.to_le_bytes());
    }
    blob
}

/// UTF-16 string descriptor
pub fn string(text: &str) -> Vec<u8> {
    let mut blob = vec![0, 0x03];
    for unit in text.encode_utf16() {
        blob.extend_from_slice(&unit.to_le_bytes());
    }
    blob[0] = blob.len() as u8;
    blob
}

/// Boot keyboard report descriptor
pub const KEYBOARD_REPORT: [u8; 63] = [
    0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0x05, 0x07, 0x19, 0xE0, 0x29, 0xE7, 0x15, 0x00, 0x25,
    0x01, 0x75, 0x01, 0x95, 0x08, 0x81, 0x02, 0x95, 0x01, 0x75, 0x08, 0x81, 0x01, 0x95, 0x05,
    0x75, 0x01, 0x05, 0x08, 0x19, 0x01, 0x29, 0x05, 0x91, 0x02, 0x95, 0x01, 0x75, 0x03, 0x91,
    0x01, 0x95, 0x06, 0x75, 0x08, 0x15, 0x00, 0x25, 0x65, 0x05, 0x07, 0x19, 0x00, 0x29, 0x65,
    0x81, 0x00, 0xC0,
];

/// Boot mouse report descriptor
pub const MOUSE_REPORT: [u8; 50] = [
    0x05, 0x01, 0x09, 0x02, 0xA1, 0x01, 0x09, 0x01, 0xA1, 0x00, 0x05, 0x09, 0x19, 0x01, 0x29,
    0x03, 0x15, 0x00, 0x25, 0x01, 0x95, 0x03, 0x75, 0x01, 0x81, 0x02, 0x95, 0x01, 0x75, 0x05,
    0x81, 0x01, 0x05, 0x01, 0x09, 0x30, 0x09, 0x31, 0x15, 0x81, 0x25, 0x7F, 0x75, 0x08, 0x95,
    0x02, 0x81, 0x06, 0xC0, 0xC0,
];
