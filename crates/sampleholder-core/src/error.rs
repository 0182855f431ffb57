//! Error handling for SampleHolder
//!
//! Provides error types for every layer of the stack:
//! - Connection errors (device channel and transport)
//! - Protocol errors (`run[...]` framing and response decoding)
//! - Controller errors (state machine and position model)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents errors raised by the device channel and the underlying
/// byte transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The channel is already open
    #[error("Already connected to {port}")]
    AlreadyOpen {
        /// The port the channel is open on.
        port: String,
    },

    /// The channel is not open
    #[error("Not connected")]
    NotOpen,

    /// A connection parameter was changed while the channel is open
    #[error("Can not change {setting} while connected")]
    ConfigurationLocked {
        /// The name of the locked setting.
        setting: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Serial ports could not be enumerated
    #[error("Failed to enumerate ports: {reason}")]
    PortEnumeration {
        /// The reason enumeration failed.
        reason: String,
    },

    /// I/O error on an open port
    #[error("I/O error on {port}: {reason}")]
    IoError {
        /// The port the error occurred on.
        port: String,
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Protocol error type
///
/// Represents errors in the `run[...]` command/response exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// No closing brace arrived before the idle read limit was reached
    #[error(
        "Data read timed out after {attempts} idle reads with response: {:?}",
        String::from_utf8_lossy(.partial)
    )]
    ReadTimeout {
        /// Number of consecutive idle reads performed.
        attempts: u32,
        /// Bytes accumulated before the timeout.
        partial: Vec<u8>,
    },

    /// The framed bytes did not decode to a response object
    #[error("Malformed response {raw:?}: {reason}")]
    MalformedResponse {
        /// The decoder message.
        reason: String,
        /// The raw frame, lossily decoded.
        raw: String,
    },

    /// The firmware reported `status: error`
    #[error("Command failed: {command}")]
    CommandFailed {
        /// The command echoed by the firmware.
        command: String,
    },

    /// A command name or argument can not be framed
    #[error("Invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected.
        reason: String,
    },
}

/// Controller error type
///
/// Represents errors raised by the sample holder controller before or
/// after protocol exchanges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Controller is not connected
    #[error("Controller not connected")]
    NotConnected,

    /// Controller is already connected
    #[error("Controller already connected")]
    AlreadyConnected,

    /// Motion requested while the motor is disabled
    #[error("Motor is not enabled")]
    NotEnabled,

    /// The motor position has not been established yet
    #[error("Motor position is unknown")]
    PositionUnknown,

    /// Goto target outside the holder
    #[error("Invalid sample number {sample}. Must be in range [0, {max}]")]
    InvalidSample {
        /// The requested sample.
        sample: i64,
        /// The largest accepted sample number.
        max: u32,
    },

    /// Steps per revolution could not be read from the device
    #[error("Could not get steps per rotation ({reason}). Using default value of {default_spr} instead")]
    SprQueryFailed {
        /// The SPR in use after the failure.
        default_spr: u32,
        /// The underlying failure.
        reason: String,
    },

    /// Occupied-sample navigation was requested with no occupied samples
    #[error("No samples are occupied")]
    NoOccupiedSamples,

    /// The firmware answered with a payload the controller can not use
    #[error("Unexpected response to {command}: {reason}")]
    UnexpectedResponse {
        /// The command that was invoked.
        command: String,
        /// What was wrong with the payload.
        reason: String,
    },

    /// A motion request does not fit in a signed 64-bit step count
    #[error("Can not move {amount} {unit}: out of range")]
    MotionOutOfRange {
        /// The requested amount.
        amount: i64,
        /// What the amount counts, samples or steps.
        unit: String,
    },

    /// Controller options are inconsistent
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// The reason the configuration is invalid.
        reason: String,
    },
}

/// Main error type for SampleHolder
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a read timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::ReadTimeout { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::ConfigurationLocked {
            setting: "baud".to_string(),
        };
        assert_eq!(err.to_string(), "Can not change baud while connected");

        let err = ConnectionError::AlreadyOpen {
            port: "COM4".to_string(),
        };
        assert_eq!(err.to_string(), "Already connected to COM4");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::CommandFailed {
            command: "move".to_string(),
        };
        assert_eq!(err.to_string(), "Command failed: move");

        let err = ProtocolError::ReadTimeout {
            attempts: 3,
            partial: b"{\"status\"".to_vec(),
        };
        assert!(err.to_string().contains("after 3 idle reads"));
        assert!(err.to_string().contains("status"));
    }

    #[test]
    fn test_controller_error_display() {
        let err = ControllerError::InvalidSample { sample: 11, max: 10 };
        assert_eq!(
            err.to_string(),
            "Invalid sample number 11. Must be in range [0, 10]"
        );
    }

    #[test]
    fn test_error_classification() {
        let err: Error = ProtocolError::ReadTimeout {
            attempts: 3,
            partial: Vec::new(),
        }
        .into();
        assert!(err.is_timeout());
        assert!(err.is_protocol_error());
        assert!(!err.is_connection_error());

        let err: Error = ControllerError::NotEnabled.into();
        assert!(err.is_controller_error());
        assert!(!err.is_timeout());

        let err: Error = ConnectionError::NotOpen.into();
        assert!(err.is_connection_error());
    }
}
