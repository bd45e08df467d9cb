//! Link configuration.

use std::time::Duration;

use frankendump_core::proto::AppVersion;
use frankendump_platform::usb::USB_TRANSFER_TIMEOUT;

use crate::USB_TRANSFER_BUFFER_SIZE;

/// Identity and tuning knobs for one [`crate::UsbLink`].
///
/// The defaults advertise this crate's own version and use the standard
/// buffer size and in-session timeout; tests shrink both to keep failure
/// scenarios fast.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Manufacturer string descriptor.
    pub manufacturer: String,
    /// Product string descriptor.
    pub product: String,
    /// Application version; also the serial-number string and the version
    /// triple carried by `StartSession`.
    pub version: AppVersion,
    /// Size of the shared page-aligned transfer buffer.
    pub transfer_buffer_size: usize,
    /// Completion timeout for transfers within an established session.
    pub transfer_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            manufacturer: "FrankenDump Project".to_owned(),
            product: "frankendump".to_owned(),
            version: AppVersion {
                major: version_component(env!("CARGO_PKG_VERSION_MAJOR")),
                minor: version_component(env!("CARGO_PKG_VERSION_MINOR")),
                micro: version_component(env!("CARGO_PKG_VERSION_PATCH")),
            },
            transfer_buffer_size: USB_TRANSFER_BUFFER_SIZE,
            transfer_timeout: USB_TRANSFER_TIMEOUT,
        }
    }
}

fn version_component(raw: &str) -> u8 {
    raw.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_sane() {
        let config = LinkConfig::default();
        assert_eq!(config.transfer_buffer_size, USB_TRANSFER_BUFFER_SIZE);
        assert_eq!(config.transfer_timeout, Duration::from_secs(1));
        assert!(!config.manufacturer.is_empty());
        assert!(!config.product.is_empty());
    }
}
