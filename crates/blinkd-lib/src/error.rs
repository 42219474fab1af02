//! Unified error type for the blinkd-lib crate.
//!
//! [`BlinkdError`] wraps [`DeviceError`] and the daemon's own failure kinds
//! (`Bind`, `Config`). `From` impls allow `?` to propagate across module
//! boundaries.

use std::fmt;
use std::net::SocketAddr;

use crate::device::DeviceError;

/// Unified error type for blinkd-lib operations.
#[derive(Debug)]
pub enum BlinkdError {
    /// Console LED register error (open, KDGETLED, KDSETLED).
    Device(DeviceError),
    /// Standard I/O error (sockets, thread spawn, config files).
    Io(std::io::Error),
    /// The control socket could not be bound or put into listening state.
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// Configuration validation error.
    Config(String),
    /// A client-side command could not be built or encoded.
    Command(String),
}

impl fmt::Display for BlinkdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlinkdError::Device(e) => write!(f, "{e}"),
            BlinkdError::Io(e) => write!(f, "I/O error: {e}"),
            BlinkdError::Bind { addr, source } => {
                write!(f, "cannot listen on {addr}: {source}")
            }
            BlinkdError::Config(e) => write!(f, "Config error: {e}"),
            BlinkdError::Command(e) => write!(f, "Command error: {e}"),
        }
    }
}

impl std::error::Error for BlinkdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlinkdError::Device(e) => Some(e),
            BlinkdError::Io(e) => Some(e),
            BlinkdError::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DeviceError> for BlinkdError {
    fn from(e: DeviceError) -> Self {
        BlinkdError::Device(e)
    }
}

impl From<std::io::Error> for BlinkdError {
    fn from(e: std::io::Error) -> Self {
        BlinkdError::Io(e)
    }
}

/// Crate-level Result alias using [`BlinkdError`].
pub type Result<T> = std::result::Result<T, BlinkdError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err(kind: std::io::ErrorKind, msg: &str) -> std::io::Error {
        std::io::Error::new(kind, msg)
    }

    #[test]
    fn from_device_error() {
        let e: BlinkdError = DeviceError::Read(io_err(std::io::ErrorKind::Other, "x")).into();
        assert!(matches!(e, BlinkdError::Device(DeviceError::Read(_))));
    }

    #[test]
    fn from_io_error() {
        let e: BlinkdError = io_err(std::io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(e, BlinkdError::Io(_)));
    }

    #[test]
    fn display_bind_error() {
        let e = BlinkdError::Bind {
            addr: "127.0.0.1:12345".parse().unwrap(),
            source: io_err(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(e.to_string(), "cannot listen on 127.0.0.1:12345: in use");
    }

    #[test]
    fn display_config_error() {
        let e = BlinkdError::Config("port must not be 0".into());
        assert_eq!(e.to_string(), "Config error: port must not be 0");
    }

    #[test]
    fn display_command_error() {
        let e = BlinkdError::Command("no LED".into());
        assert_eq!(e.to_string(), "Command error: no LED");
    }

    #[test]
    fn source_chains_device_error() {
        let e = BlinkdError::Device(DeviceError::Write(io_err(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        )));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("denied"));
    }

    #[test]
    fn source_none_for_string_variants() {
        let e = BlinkdError::Config("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_device_to_blinkd() {
        fn inner() -> crate::device::Result<()> {
            Err(DeviceError::Read(io_err(std::io::ErrorKind::Other, "ioctl")))
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, BlinkdError::Device(DeviceError::Read(_))));
    }
}
