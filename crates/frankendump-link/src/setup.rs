//! Descriptor advertisement and interface bring-up.
//!
//! Two firmware generations are supported. The modern path builds every
//! descriptor explicitly: language and string descriptors, one device
//! descriptor per speed, a Binary Object Store advertising USB 2.0 LPM and
//! USB 3.0 SuperSpeed, and per-speed configuration data for one
//! vendor-specific interface with a bulk IN/OUT pair. The legacy path is a
//! single device-info call with the endpoints declared once at High-Speed
//! packet size. Interface enable always follows endpoint registration; on
//! the modern path the device-level enable is the final step.

use log::error;

use frankendump_platform::descriptor::{
    DeviceDescriptor, DeviceInfo, EndpointDescriptor, InterfaceDescriptor, SsEndpointCompanion,
    USB_CLASS_VENDOR_SPEC, USB_DT_BOS, USB_DT_DEVICE_CAPABILITY, USB_ENDPOINT_IN,
    USB_TRANSFER_TYPE_BULK,
};
use frankendump_platform::usb::{Generation, UsbInterface, UsbSetupError, UsbSpeed};

use crate::error::UsbError;
use crate::link::LinkInner;

/// Device identity: console vendor, direct-mode product.
const USB_VID: u16 = 0x057e;
const USB_PID: u16 = 0x3000;
const USB_BCD_DEVICE: u16 = 0x0100;

/// English (US) string-descriptor language.
const LANG_EN_US: u16 = 0x0409;

/// Endpoint max packet sizes per link speed.
const MAX_PACKET_FULL: u16 = 0x40;
const MAX_PACKET_HIGH: u16 = 0x200;
const MAX_PACKET_SUPER: u16 = 0x400;

pub(crate) fn initialize_device(inner: &LinkInner) -> Result<(), UsbError> {
    match inner.server.generation() {
        Generation::Modern => initialize_modern(inner),
        Generation::Legacy => initialize_legacy(inner),
    }
}

fn descriptor_err(stage: &'static str, err: UsbSetupError) -> UsbError {
    error!("descriptor setup failed ({stage}): {err}");
    UsbError::DescriptorFailed(err)
}

fn append(
    iface: &dyn UsbInterface,
    speed: UsbSpeed,
    bytes: &[u8],
    stage: &'static str,
) -> Result<(), UsbError> {
    iface.append_configuration(speed, bytes).map_err(|err| {
        error!("failed to append configuration data ({speed:?}, {stage}): {err}");
        UsbError::DescriptorFailed(err)
    })
}

/// The 0x16-byte Binary Object Store: USB 2.0 extension capability with
/// LPM support, plus the USB 3.0 SuperSpeed capability.
pub(crate) fn build_bos() -> [u8; 0x16] {
    [
        // BOS header: length, type, wTotalLength, two capabilities.
        0x05, USB_DT_BOS, 0x16, 0x00, 0x02,
        // USB 2.0 extension capability: LPM supported.
        0x07, USB_DT_DEVICE_CAPABILITY, 0x02, 0x02, 0x00, 0x00, 0x00,
        // USB 3.0 SuperSpeed capability.
        0x0A, USB_DT_DEVICE_CAPABILITY, 0x03, 0x00, 0x0E, 0x00, 0x03, 0x00, 0x00, 0x00,
    ]
}

fn initialize_modern(inner: &LinkInner) -> Result<(), UsbError> {
    let server = inner.server.as_ref();
    let config = &inner.config;

    server
        .add_language_descriptor(&[LANG_EN_US])
        .map_err(|err| descriptor_err("language descriptor", err))?;
    let manufacturer = server
        .add_string_descriptor(&config.manufacturer)
        .map_err(|err| descriptor_err("manufacturer string", err))?;
    let product = server
        .add_string_descriptor(&config.product)
        .map_err(|err| descriptor_err("product string", err))?;
    let serial_number = server
        .add_string_descriptor(&config.version.to_string())
        .map_err(|err| descriptor_err("serial number string", err))?;

    let mut device = DeviceDescriptor {
        bcd_usb: 0x0110,
        device_class: 0x00,
        device_subclass: 0x00,
        device_protocol: 0x00,
        max_packet_size0: 0x40,
        id_vendor: USB_VID,
        id_product: USB_PID,
        bcd_device: USB_BCD_DEVICE,
        i_manufacturer: manufacturer,
        i_product: product,
        i_serial_number: serial_number,
        num_configurations: 0x01,
    };

    // Full Speed is USB 1.1.
    server
        .set_device_descriptor(UsbSpeed::Full, &device)
        .map_err(|err| descriptor_err("device descriptor (USB 1.1)", err))?;

    // High Speed is USB 2.0.
    device.bcd_usb = 0x0200;
    server
        .set_device_descriptor(UsbSpeed::High, &device)
        .map_err(|err| descriptor_err("device descriptor (USB 2.0)", err))?;

    // Super Speed is USB 3.0; control packet size becomes 2^9.
    device.bcd_usb = 0x0300;
    device.max_packet_size0 = 0x09;
    server
        .set_device_descriptor(UsbSpeed::Super, &device)
        .map_err(|err| descriptor_err("device descriptor (USB 3.0)", err))?;

    server
        .set_binary_object_store(&build_bos())
        .map_err(|err| descriptor_err("binary object store", err))?;

    let iface = server.register_interface().map_err(|err| {
        error!("interface registration failed: {err}");
        UsbError::InterfaceRegisterFailed(err)
    })?;

    let interface_desc = InterfaceDescriptor {
        interface_number: iface.index(),
        alternate_setting: 0,
        num_endpoints: 2,
        interface_class: USB_CLASS_VENDOR_SPEC,
        interface_subclass: USB_CLASS_VENDOR_SPEC,
        interface_protocol: USB_CLASS_VENDOR_SPEC,
        i_interface: 0,
    };
    let addr_in = USB_ENDPOINT_IN | (iface.index() + 1);
    let addr_out = iface.index() + 1;

    let mut ep_in_desc = EndpointDescriptor {
        endpoint_address: addr_in,
        attributes: USB_TRANSFER_TYPE_BULK,
        max_packet_size: MAX_PACKET_FULL,
        interval: 0,
    };
    let mut ep_out_desc = EndpointDescriptor {
        endpoint_address: addr_out,
        attributes: USB_TRANSFER_TYPE_BULK,
        max_packet_size: MAX_PACKET_FULL,
        interval: 0,
    };
    let companion = SsEndpointCompanion {
        max_burst: 0x0F,
        attributes: 0x00,
        bytes_per_interval: 0x00,
    };

    // Full Speed config (USB 1.1).
    append(iface.as_ref(), UsbSpeed::Full, &interface_desc.encode(), "interface")?;
    append(iface.as_ref(), UsbSpeed::Full, &ep_in_desc.encode(), "in endpoint")?;
    append(iface.as_ref(), UsbSpeed::Full, &ep_out_desc.encode(), "out endpoint")?;

    // High Speed config (USB 2.0).
    ep_in_desc.max_packet_size = MAX_PACKET_HIGH;
    ep_out_desc.max_packet_size = MAX_PACKET_HIGH;
    append(iface.as_ref(), UsbSpeed::High, &interface_desc.encode(), "interface")?;
    append(iface.as_ref(), UsbSpeed::High, &ep_in_desc.encode(), "in endpoint")?;
    append(iface.as_ref(), UsbSpeed::High, &ep_out_desc.encode(), "out endpoint")?;

    // Super Speed config (USB 3.0): every endpoint gets a companion.
    ep_in_desc.max_packet_size = MAX_PACKET_SUPER;
    ep_out_desc.max_packet_size = MAX_PACKET_SUPER;
    append(iface.as_ref(), UsbSpeed::Super, &interface_desc.encode(), "interface")?;
    append(iface.as_ref(), UsbSpeed::Super, &ep_in_desc.encode(), "in endpoint")?;
    append(iface.as_ref(), UsbSpeed::Super, &companion.encode(), "in endpoint companion")?;
    append(iface.as_ref(), UsbSpeed::Super, &ep_out_desc.encode(), "out endpoint")?;
    append(iface.as_ref(), UsbSpeed::Super, &companion.encode(), "out endpoint companion")?;

    let ep_in = iface.register_endpoint(addr_in).map_err(|err| {
        error!("in endpoint registration failed: {err}");
        UsbError::EndpointRegisterFailed(err)
    })?;
    let ep_out = iface.register_endpoint(addr_out).map_err(|err| {
        error!("out endpoint registration failed: {err}");
        UsbError::EndpointRegisterFailed(err)
    })?;

    iface.enable().map_err(|err| {
        error!("interface enable failed: {err}");
        UsbError::InterfaceRegisterFailed(err)
    })?;

    // Modern generation: device-level enable is the final step.
    server
        .enable()
        .map_err(|err| descriptor_err("device enable", err))?;

    *inner.iface.iface.write() = Some(iface);
    *inner.iface.ep_in.write() = Some(ep_in);
    *inner.iface.ep_out.write() = Some(ep_out);
    Ok(())
}

fn initialize_legacy(inner: &LinkInner) -> Result<(), UsbError> {
    let server = inner.server.as_ref();
    let config = &inner.config;

    let info = DeviceInfo {
        id_vendor: USB_VID,
        id_product: USB_PID,
        bcd_device: USB_BCD_DEVICE,
        manufacturer: config.manufacturer.clone(),
        product: config.product.clone(),
        serial_number: config.version.to_string(),
    };
    server
        .set_device_info(&info)
        .map_err(|err| descriptor_err("device info", err))?;

    let iface = server.register_interface().map_err(|err| {
        error!("interface registration failed: {err}");
        UsbError::InterfaceRegisterFailed(err)
    })?;

    // The legacy service takes one descriptor set, declared at High-Speed
    // packet size.
    let interface_desc = InterfaceDescriptor {
        interface_number: iface.index(),
        alternate_setting: 0,
        num_endpoints: 2,
        interface_class: USB_CLASS_VENDOR_SPEC,
        interface_subclass: USB_CLASS_VENDOR_SPEC,
        interface_protocol: USB_CLASS_VENDOR_SPEC,
        i_interface: 0,
    };
    let addr_in = USB_ENDPOINT_IN | (iface.index() + 1);
    let addr_out = iface.index() + 1;
    let ep_in_desc = EndpointDescriptor {
        endpoint_address: addr_in,
        attributes: USB_TRANSFER_TYPE_BULK,
        max_packet_size: MAX_PACKET_HIGH,
        interval: 0,
    };
    let ep_out_desc = EndpointDescriptor {
        endpoint_address: addr_out,
        attributes: USB_TRANSFER_TYPE_BULK,
        max_packet_size: MAX_PACKET_HIGH,
        interval: 0,
    };

    append(iface.as_ref(), UsbSpeed::High, &interface_desc.encode(), "interface")?;
    append(iface.as_ref(), UsbSpeed::High, &ep_in_desc.encode(), "in endpoint")?;
    append(iface.as_ref(), UsbSpeed::High, &ep_out_desc.encode(), "out endpoint")?;

    let ep_in = iface.register_endpoint(addr_in).map_err(|err| {
        error!("in endpoint registration failed: {err}");
        UsbError::EndpointRegisterFailed(err)
    })?;
    let ep_out = iface.register_endpoint(addr_out).map_err(|err| {
        error!("out endpoint registration failed: {err}");
        UsbError::EndpointRegisterFailed(err)
    })?;

    iface.enable().map_err(|err| {
        error!("interface enable failed: {err}");
        UsbError::InterfaceRegisterFailed(err)
    })?;

    *inner.iface.iface.write() = Some(iface);
    *inner.iface.ep_in.write() = Some(ep_in);
    *inner.iface.ep_out.write() = Some(ep_out);
    Ok(())
}
