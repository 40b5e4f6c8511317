//! Error type shared by connections, the driver base and all drivers

use embedded_hal::i2c::ErrorKind;

/// Result alias used throughout Trellis
pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by bus, connection and driver operations
///
/// Transfer failures abort the enclosing driver method and reach the caller
/// unchanged. Nothing in Trellis retries a transaction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The platform refused to open the bus
    #[error("i2c bus {0} is unavailable")]
    BusUnavailable(u8),
    /// A transport read or write failed
    #[error("i2c transfer failed: {0}")]
    Io(ErrorKind),
    /// A read returned fewer bytes than required
    #[error("not enough bytes read: got {read}, expected {expected}")]
    NotEnoughBytes { read: usize, expected: usize },
    /// Out-of-range pin, channel, address, mode, scale or rate
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Operation issued while the device is in an incompatible mode
    #[error("device is in wrong mode (control 0x{0:02X})")]
    WrongMode(u8),
    /// Device reported that data is not sampled yet
    #[error("device is not ready")]
    NotReady,
    /// Data still looks encrypted (identical byte pairs)
    #[error("encrypted bytes")]
    EncryptedBytes,
    /// Identity register did not match the expected signature
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    /// A polled status bit never asserted
    #[error("timed out waiting for device")]
    Timeout,
    /// Operation attempted while the driver is not running
    #[error("driver is not started")]
    NotStarted,
    /// RAM address plus offset leaves the register space
    #[error("RAM address overflow: 0x{0:X}")]
    RamOverflow(u16),
    /// Command key not known to the driver
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    /// Several independent failures, e.g. from a composite halt
    #[error("{}", join(.0))]
    Aggregate(Vec<Error>),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Fold collected errors into one
    ///
    /// Returns `Ok(())` when nothing failed.
    pub fn aggregate(errors: Vec<Error>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(errors))
        }
    }
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_ok() {
        assert_eq!(Error::aggregate(Vec::new()), Ok(()));
    }

    #[test]
    fn test_aggregate_message_lists_all() {
        let err = Error::aggregate(vec![
            Error::Io(ErrorKind::Other),
            Error::NotStarted,
        ])
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("i2c transfer failed"));
        assert!(msg.contains("not started"));
    }

    #[test]
    fn test_ram_overflow_message() {
        assert_eq!(
            Error::RamOverflow(0x100).to_string(),
            "RAM address overflow: 0x100"
        );
    }
}
