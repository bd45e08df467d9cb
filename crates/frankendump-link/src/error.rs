//! Error taxonomy of the USB link.

use thiserror::Error;

use frankendump_core::proto::Status;
use frankendump_platform::usb::{UsbIoError, UsbSetupError};

#[derive(Debug, Error)]
pub enum UsbError {
    // Input / state validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("usb link is not initialized")]
    NotInitialized,
    #[error("no host or no active usb session")]
    NotReady,

    // Setup failures; fatal to initialization.
    #[error("failed to allocate the transfer buffer")]
    BufferAllocFailed,
    #[error("descriptor setup failed: {0}")]
    DescriptorFailed(#[source] UsbSetupError),
    #[error("interface registration failed: {0}")]
    InterfaceRegisterFailed(#[source] UsbSetupError),
    #[error("endpoint registration failed: {0}")]
    EndpointRegisterFailed(#[source] UsbSetupError),
    #[error("failed to spawn the detection thread")]
    ThreadSpawnFailed,

    // Transport failures. Timeout and Cancelled are recoverable: the
    // in-flight file transfer is abandoned and the session renegotiated.
    #[error("failed to write command block")]
    WriteCommandFailed(#[source] Box<UsbError>),
    #[error("failed to read status block")]
    ReadStatusFailed(#[source] Box<UsbError>),
    #[error("status block carries an invalid magic word")]
    InvalidMagicWord,
    #[error("transfer moved {got:#x} bytes, expected {expected:#x}")]
    TransferSizeMismatch { expected: usize, got: usize },
    #[error("transfer timed out")]
    Timeout,
    #[error("transfer cancelled by link shutdown")]
    Cancelled,

    // Host protocol responses. The session stays up.
    #[error("host replied with status {0:?}")]
    Host(Status),
    #[error("host replied with unknown status code {0:#x}")]
    HostUnknown(u32),

    #[error("endpoint i/o failed: {0}")]
    Io(#[from] UsbIoError),
}
