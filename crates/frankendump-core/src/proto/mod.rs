//! USB command protocol spoken to the companion host application.
//!
//! Every exchange is framed: a 16-byte command header (magic, command
//! code, command-block size) followed by the command block, answered by a
//! 16-byte status frame. The magic word travels big-endian; every other
//! multi-byte field is little-endian. See [`frame`] for the codecs.

pub mod frame;

pub use frame::{
    CommandHeader, FilePropertiesBlock, FrameError, StartSessionBlock, StatusFrame,
    COMMAND_HEADER_SIZE, FILE_PROPERTIES_BLOCK_SIZE, FS_MAX_PATH, START_SESSION_BLOCK_SIZE,
    STATUS_FRAME_SIZE,
};

/// ASCII `"NXDT"`, transmitted big-endian.
pub const COMMAND_MAGIC: u32 = 0x4E58_4454;

/// Protocol ABI revision carried in `StartSession`; the host rejects
/// mismatches.
pub const ABI_VERSION: u8 = 1;

/// Command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    StartSession = 0,
    SendFileProperties = 1,
    /// Reserved code-point; never emitted by the device. Hosts answer it
    /// with [`Status::UnsupportedCommand`].
    SendNspHeader = 2,
    EndSession = 3,
}

impl Command {
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::StartSession),
            1 => Some(Self::SendFileProperties),
            2 => Some(Self::SendNspHeader),
            3 => Some(Self::EndSession),
            _ => None,
        }
    }

    #[must_use]
    pub fn raw(self) -> u32 {
        self as u32
    }
}

/// Status codes carried by the 16-byte status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    /// Expected response code.
    Success = 0,

    // Internal usage.
    InvalidCommandSize = 1,
    WriteCommandFailed = 2,
    ReadStatusFailed = 3,

    // These can be returned by the host.
    InvalidMagicWord = 4,
    UnsupportedCommand = 5,
    UnsupportedAbiVersion = 6,
    MalformedCommand = 7,
    HostIoError = 8,
}

impl Status {
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Success),
            1 => Some(Self::InvalidCommandSize),
            2 => Some(Self::WriteCommandFailed),
            3 => Some(Self::ReadStatusFailed),
            4 => Some(Self::InvalidMagicWord),
            5 => Some(Self::UnsupportedCommand),
            6 => Some(Self::UnsupportedAbiVersion),
            7 => Some(Self::MalformedCommand),
            8 => Some(Self::HostIoError),
            _ => None,
        }
    }

    #[must_use]
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Log line for codes a host can reply with; `None` for the internal
    /// codes, which already produced their own diagnostics.
    #[must_use]
    pub fn host_detail(self) -> Option<&'static str> {
        match self {
            Self::InvalidMagicWord => Some("host replied with Invalid Magic Word status code"),
            Self::UnsupportedCommand => Some("host replied with Unsupported Command status code"),
            Self::UnsupportedAbiVersion => {
                Some("host replied with Unsupported ABI Version status code")
            }
            Self::MalformedCommand => Some("host replied with Malformed Command status code"),
            Self::HostIoError => Some("host replied with I/O Error status code"),
            _ => None,
        }
    }
}

/// Application version triple advertised in `StartSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppVersion {
    pub major: u8,
    pub minor: u8,
    pub micro: u8,
}

impl std::fmt::Display for AppVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_is_ascii_nxdt() {
        assert_eq!(&COMMAND_MAGIC.to_be_bytes(), b"NXDT");
    }

    #[test]
    fn test_command_round_trip() {
        for raw in 0..4 {
            assert_eq!(Command::from_raw(raw).unwrap().raw(), raw);
        }
        assert!(Command::from_raw(4).is_none());
    }

    #[test]
    fn test_status_round_trip() {
        for raw in 0..9 {
            assert_eq!(Status::from_raw(raw).unwrap().raw(), raw);
        }
        assert!(Status::from_raw(9).is_none());
    }

    #[test]
    fn test_host_detail_only_for_host_codes() {
        assert!(Status::Success.host_detail().is_none());
        assert!(Status::WriteCommandFailed.host_detail().is_none());
        assert!(Status::UnsupportedAbiVersion.host_detail().is_some());
    }
}
