//! USB device-server seam.
//!
//! The platform exposes device-side USB through a service that accepts
//! descriptor uploads, hands out interface and endpoint handles, and posts
//! asynchronous transfers (URBs) whose completion is reported through an
//! event. These traits model exactly that surface. Two firmware
//! generations exist: the modern one takes explicit per-speed descriptors
//! and a Binary Object Store, the legacy one a single device-info call.

use std::time::Duration;

use thiserror::Error;

use crate::descriptor::{DeviceDescriptor, DeviceInfo};
use crate::signal::Signal;

/// Device state reported by [`UsbDeviceServer::state`] once the host has
/// configured the device. Anything else means "no host".
pub const USB_STATE_CONFIGURED: u32 = 5;

/// Link speeds the configuration data is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsbSpeed {
    /// USB 1.1.
    Full,
    /// USB 2.0.
    High,
    /// USB 3.0.
    Super,
}

/// Firmware generation of the device-server API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// Firmware < 5.0: single-shot device info, implicit descriptors.
    Legacy,
    /// Firmware >= 5.0: explicit descriptor construction and BOS.
    Modern,
}

#[derive(Debug, Error)]
pub enum UsbSetupError {
    #[error("device server unavailable")]
    Unavailable,
    #[error("descriptor rejected: {0}")]
    DescriptorRejected(&'static str),
    #[error("operation unsupported on this firmware generation")]
    WrongGeneration,
    #[error("no free interface slot")]
    InterfaceLimit,
    #[error("endpoint address {0:#04x} unavailable")]
    EndpointUnavailable(u8),
}

#[derive(Debug, Error)]
pub enum UsbIoError {
    #[error("endpoint already has urb {0:#x} in flight")]
    Busy(u32),
    #[error("no completed urb report available")]
    NoReport,
    #[error("completion report is for urb {got:#x}, expected {expected:#x}")]
    ReportMismatch { expected: u32, got: u32 },
    #[error("operation does not match endpoint direction")]
    Direction,
    #[error("endpoint has been shut down")]
    Closed,
}

/// Completion report for a finished (or cancelled) URB.
#[derive(Debug, Clone, Copy)]
pub struct UrbReport {
    /// Identifier returned by the post call.
    pub id: u32,
    /// Bytes actually moved across the bus.
    pub transferred: usize,
}

/// One registered bulk endpoint.
///
/// `post_send`/`post_recv` arm a single asynchronous transfer and return
/// immediately; the completion signal fires when the host side has moved
/// the data (or the URB was cancelled), after which [`report`] describes
/// the outcome. At most one URB is in flight per endpoint.
///
/// [`report`]: UsbEndpoint::report
pub trait UsbEndpoint: Send + Sync {
    /// Device-to-host transfer (IN endpoint only).
    fn post_send(&self, data: &[u8]) -> Result<u32, UsbIoError>;

    /// Host-to-device transfer of up to `len` bytes (OUT endpoint only).
    fn post_recv(&self, len: usize) -> Result<u32, UsbIoError>;

    /// Completion event for the URB in flight. Manually reset.
    fn completion(&self) -> &Signal;

    /// Report for the most recently completed URB.
    fn report(&self) -> Result<UrbReport, UsbIoError>;

    /// Copy the payload of the last completed receive into `buf`,
    /// returning the byte count (OUT endpoint only).
    fn drain_recv(&self, buf: &mut [u8]) -> Result<usize, UsbIoError>;

    /// Abort the URB in flight, if any. Always ends with the completion
    /// signal raised so a cancelling waiter cannot hang.
    fn cancel(&self);

    /// Toggle Zero-Length Termination on this endpoint.
    fn set_zlt(&self, enabled: bool);
}

/// One registered vendor interface.
pub trait UsbInterface: Send + Sync {
    /// Interface index assigned by the server.
    fn index(&self) -> u8;

    /// Append raw descriptor bytes to the configuration blob for `speed`.
    fn append_configuration(&self, speed: UsbSpeed, descriptor: &[u8]) -> Result<(), UsbSetupError>;

    /// Register the endpoint at `address` and hand back its handle.
    fn register_endpoint(&self, address: u8) -> Result<Box<dyn UsbEndpoint>, UsbSetupError>;

    /// Enable the interface once its endpoints are registered.
    fn enable(&self) -> Result<(), UsbSetupError>;
}

/// The device-side USB service.
pub trait UsbDeviceServer: Send + Sync {
    fn generation(&self) -> Generation;

    /// Upload the supported-language string descriptor (modern only).
    fn add_language_descriptor(&self, langs: &[u16]) -> Result<(), UsbSetupError>;

    /// Upload one string descriptor, returning its index (modern only).
    fn add_string_descriptor(&self, text: &str) -> Result<u8, UsbSetupError>;

    /// Upload the device descriptor for one speed (modern only).
    fn set_device_descriptor(
        &self,
        speed: UsbSpeed,
        descriptor: &DeviceDescriptor,
    ) -> Result<(), UsbSetupError>;

    /// Upload the raw Binary Object Store (modern only).
    fn set_binary_object_store(&self, bos: &[u8]) -> Result<(), UsbSetupError>;

    /// Single-shot identity setup (legacy only).
    fn set_device_info(&self, info: &DeviceInfo) -> Result<(), UsbSetupError>;

    /// Register the vendor interface.
    fn register_interface(&self) -> Result<Box<dyn UsbInterface>, UsbSetupError>;

    /// Final activation step on the modern generation.
    fn enable(&self) -> Result<(), UsbSetupError>;

    /// Current device state ([`USB_STATE_CONFIGURED`] means host present).
    fn state(&self) -> u32;

    /// Kernel state-change event; auto-clearing.
    fn state_change(&self) -> &Signal;

    /// Tear the whole device session down. Idempotent.
    fn shutdown(&self);
}

/// Convenience host-presence check shared by the link and detection loop.
#[must_use]
pub fn host_available(server: &dyn UsbDeviceServer) -> bool {
    server.state() == USB_STATE_CONFIGURED
}

/// Default in-session completion timeout, re-exported here so platform
/// implementations and the link agree on the magnitude.
pub const USB_TRANSFER_TIMEOUT: Duration = Duration::from_secs(1);
