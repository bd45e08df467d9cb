//! USB descriptor value types.
//!
//! Plain structs mirroring the standard descriptor layouts, with explicit
//! little-endian `encode()` methods producing the exact bytes handed to the
//! device server's configuration blobs. Multi-byte fields are serialized
//! with byte-order primitives, never by casting structs.

/// Descriptor type codes.
pub const USB_DT_DEVICE: u8 = 0x01;
pub const USB_DT_STRING: u8 = 0x03;
pub const USB_DT_INTERFACE: u8 = 0x04;
pub const USB_DT_ENDPOINT: u8 = 0x05;
pub const USB_DT_BOS: u8 = 0x0F;
pub const USB_DT_DEVICE_CAPABILITY: u8 = 0x10;
pub const USB_DT_SS_ENDPOINT_COMPANION: u8 = 0x30;

/// Descriptor sizes on the wire.
pub const USB_DT_DEVICE_SIZE: usize = 0x12;
pub const USB_DT_INTERFACE_SIZE: usize = 9;
pub const USB_DT_ENDPOINT_SIZE: usize = 7;
pub const USB_DT_SS_ENDPOINT_COMPANION_SIZE: usize = 6;

/// Class / transfer-type codes used by the vendor interface.
pub const USB_CLASS_VENDOR_SPEC: u8 = 0xFF;
pub const USB_TRANSFER_TYPE_BULK: u8 = 0x02;

/// Endpoint address direction bits.
pub const USB_ENDPOINT_IN: u8 = 0x80;
pub const USB_ENDPOINT_OUT: u8 = 0x00;

/// Standard device descriptor (18 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub max_packet_size0: u8,
    pub id_vendor: u16,
    pub id_product: u16,
    pub bcd_device: u16,
    pub i_manufacturer: u8,
    pub i_product: u8,
    pub i_serial_number: u8,
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    #[must_use]
    pub fn encode(&self) -> [u8; USB_DT_DEVICE_SIZE] {
        let mut out = [0u8; USB_DT_DEVICE_SIZE];
        out[0] = USB_DT_DEVICE_SIZE as u8;
        out[1] = USB_DT_DEVICE;
        out[2..4].copy_from_slice(&self.bcd_usb.to_le_bytes());
        out[4] = self.device_class;
        out[5] = self.device_subclass;
        out[6] = self.device_protocol;
        out[7] = self.max_packet_size0;
        out[8..10].copy_from_slice(&self.id_vendor.to_le_bytes());
        out[10..12].copy_from_slice(&self.id_product.to_le_bytes());
        out[12..14].copy_from_slice(&self.bcd_device.to_le_bytes());
        out[14] = self.i_manufacturer;
        out[15] = self.i_product;
        out[16] = self.i_serial_number;
        out[17] = self.num_configurations;
        out
    }
}

/// Standard interface descriptor (9 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub i_interface: u8,
}

impl InterfaceDescriptor {
    #[must_use]
    pub fn encode(&self) -> [u8; USB_DT_INTERFACE_SIZE] {
        [
            USB_DT_INTERFACE_SIZE as u8,
            USB_DT_INTERFACE,
            self.interface_number,
            self.alternate_setting,
            self.num_endpoints,
            self.interface_class,
            self.interface_subclass,
            self.interface_protocol,
            self.i_interface,
        ]
    }
}

/// Standard endpoint descriptor (7 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub endpoint_address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    #[must_use]
    pub fn encode(&self) -> [u8; USB_DT_ENDPOINT_SIZE] {
        let mut out = [0u8; USB_DT_ENDPOINT_SIZE];
        out[0] = USB_DT_ENDPOINT_SIZE as u8;
        out[1] = USB_DT_ENDPOINT;
        out[2] = self.endpoint_address;
        out[3] = self.attributes;
        out[4..6].copy_from_slice(&self.max_packet_size.to_le_bytes());
        out[6] = self.interval;
        out
    }

    #[must_use]
    pub fn is_in(&self) -> bool {
        self.endpoint_address & USB_ENDPOINT_IN != 0
    }
}

/// SuperSpeed endpoint companion descriptor (6 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsEndpointCompanion {
    pub max_burst: u8,
    pub attributes: u8,
    pub bytes_per_interval: u16,
}

impl SsEndpointCompanion {
    #[must_use]
    pub fn encode(&self) -> [u8; USB_DT_SS_ENDPOINT_COMPANION_SIZE] {
        let mut out = [0u8; USB_DT_SS_ENDPOINT_COMPANION_SIZE];
        out[0] = USB_DT_SS_ENDPOINT_COMPANION_SIZE as u8;
        out[1] = USB_DT_SS_ENDPOINT_COMPANION;
        out[2] = self.max_burst;
        out[3] = self.attributes;
        out[4..6].copy_from_slice(&self.bytes_per_interval.to_le_bytes());
        out
    }
}

/// Legacy single-shot device identity (firmware generations without
/// explicit descriptor upload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id_vendor: u16,
    pub id_product: u16,
    pub bcd_device: u16,
    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_descriptor_layout() {
        let desc = DeviceDescriptor {
            bcd_usb: 0x0110,
            device_class: 0,
            device_subclass: 0,
            device_protocol: 0,
            max_packet_size0: 0x40,
            id_vendor: 0x057e,
            id_product: 0x3000,
            bcd_device: 0x0100,
            i_manufacturer: 1,
            i_product: 2,
            i_serial_number: 3,
            num_configurations: 1,
        };
        let bytes = desc.encode();
        assert_eq!(bytes[0], 0x12);
        assert_eq!(bytes[1], USB_DT_DEVICE);
        assert_eq!(&bytes[2..4], &[0x10, 0x01]);
        assert_eq!(&bytes[8..10], &[0x7e, 0x05]);
        assert_eq!(&bytes[10..12], &[0x00, 0x30]);
        assert_eq!(bytes[7], 0x40);
    }

    #[test]
    fn test_endpoint_descriptor_layout() {
        let desc = EndpointDescriptor {
            endpoint_address: USB_ENDPOINT_IN | 0x01,
            attributes: USB_TRANSFER_TYPE_BULK,
            max_packet_size: 0x200,
            interval: 0,
        };
        assert!(desc.is_in());
        let bytes = desc.encode();
        assert_eq!(bytes, [0x07, USB_DT_ENDPOINT, 0x81, 0x02, 0x00, 0x02, 0x00]);
    }

    #[test]
    fn test_companion_descriptor_layout() {
        let companion = SsEndpointCompanion {
            max_burst: 0x0F,
            attributes: 0,
            bytes_per_interval: 0,
        };
        let bytes = companion.encode();
        assert_eq!(bytes, [0x06, USB_DT_SS_ENDPOINT_COMPANION, 0x0F, 0x00, 0x00, 0x00]);
    }
}
