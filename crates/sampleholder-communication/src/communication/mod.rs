//! Device channel and byte transports
//!
//! The device channel owns a duplex byte transport and the connection
//! parameters used to open it. Parameters are locked while the channel
//! is open.

pub mod serial;

use sampleholder_core::{ConnectionError, Result};
use std::time::Duration;

pub use serial::{list_port_names, list_ports, SerialPortInfo, SerialTransport};

/// Default baud rate for sample holder firmware
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default per-byte read timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters used to open a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyACM0", "COM4")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Timeout applied to each single-byte read
    pub timeout: Duration,
}

impl ConnectionParams {
    /// Parameters for `port` with default baud rate and timeout
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Duplex byte stream to a device
///
/// `read_byte` blocks for at most the timeout given at open time and
/// returns `Ok(None)` when nothing arrived.
pub trait ByteTransport: Send {
    /// Open the transport with the given parameters
    fn open(&mut self, params: &ConnectionParams) -> Result<()>;

    /// Close the transport
    fn close(&mut self) -> Result<()>;

    /// Whether the transport is open
    fn is_open(&self) -> bool;

    /// Write bytes, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read a single byte, `None` on timeout
    fn read_byte(&mut self) -> Result<Option<u8>>;
}

/// Exclusive owner of one byte transport
pub struct DeviceChannel {
    params: ConnectionParams,
    transport: Box<dyn ByteTransport>,
}

impl DeviceChannel {
    /// Create a closed channel
    pub fn new(params: ConnectionParams, transport: Box<dyn ByteTransport>) -> Self {
        Self { params, transport }
    }

    /// Current connection parameters
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Port name
    pub fn port(&self) -> &str {
        &self.params.port
    }

    /// Baud rate
    pub fn baud_rate(&self) -> u32 {
        self.params.baud_rate
    }

    /// Per-byte read timeout
    pub fn timeout(&self) -> Duration {
        self.params.timeout
    }

    /// Change the port. Fails while open.
    pub fn set_port(&mut self, port: impl Into<String>) -> Result<()> {
        self.ensure_unlocked("port")?;
        self.params.port = port.into();
        Ok(())
    }

    /// Change the baud rate. Fails while open.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.ensure_unlocked("baud")?;
        self.params.baud_rate = baud_rate;
        Ok(())
    }

    /// Change the read timeout. Fails while open.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.ensure_unlocked("timeout")?;
        self.params.timeout = timeout;
        Ok(())
    }

    /// Open the transport with the current parameters
    pub fn open(&mut self) -> Result<()> {
        if self.transport.is_open() {
            return Err(ConnectionError::AlreadyOpen {
                port: self.params.port.clone(),
            }
            .into());
        }

        tracing::debug!(
            "Opening {} at {} baud (timeout {:?})",
            self.params.port,
            self.params.baud_rate,
            self.params.timeout
        );
        self.transport.open(&self.params)
    }

    /// Close the transport. Closing a closed channel is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if !self.transport.is_open() {
            return Ok(());
        }
        tracing::debug!("Closing {}", self.params.port);
        self.transport.close()
    }

    /// Whether the transport is open
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Write all of `data`
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let mut written = 0;
        while written < data.len() {
            let n = self.transport.write(&data[written..])?;
            if n == 0 {
                return Err(ConnectionError::IoError {
                    port: self.params.port.clone(),
                    reason: "transport accepted no bytes".to_string(),
                }
                .into());
            }
            written += n;
        }
        Ok(())
    }

    /// Read one byte, `None` if the timeout elapsed first
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        self.ensure_open()?;
        self.transport.read_byte()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.transport.is_open() {
            Ok(())
        } else {
            Err(ConnectionError::NotOpen.into())
        }
    }

    fn ensure_unlocked(&self, setting: &str) -> Result<()> {
        if self.transport.is_open() {
            return Err(ConnectionError::ConfigurationLocked {
                setting: setting.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Drop for DeviceChannel {
    fn drop(&mut self) {
        if self.transport.is_open() {
            if let Err(e) = self.transport.close() {
                tracing::warn!("Failed to close {} on drop: {}", self.params.port, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sampleholder_core::Error;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct LoopbackTransport {
        open: bool,
        opened_with: Option<ConnectionParams>,
        rx: VecDeque<u8>,
        chunk: Option<usize>,
    }

    impl ByteTransport for LoopbackTransport {
        fn open(&mut self, params: &ConnectionParams) -> Result<()> {
            self.open = true;
            self.opened_with = Some(params.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.open = false;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn write(&mut self, data: &[u8]) -> Result<usize> {
            let n = self.chunk.unwrap_or(data.len()).min(data.len());
            self.rx.extend(&data[..n]);
            Ok(n)
        }

        fn read_byte(&mut self) -> Result<Option<u8>> {
            Ok(self.rx.pop_front())
        }
    }

    fn channel() -> DeviceChannel {
        DeviceChannel::new(
            ConnectionParams::new("/dev/ttyACM0"),
            Box::new(LoopbackTransport::default()),
        )
    }

    #[test]
    fn test_open_twice_fails() {
        let mut ch = channel();
        ch.open().unwrap();
        let err = ch.open().unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::AlreadyOpen { .. })
        ));
        assert!(ch.is_open());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut ch = channel();
        ch.close().unwrap();
        ch.open().unwrap();
        ch.close().unwrap();
        ch.close().unwrap();
        assert!(!ch.is_open());
    }

    #[test]
    fn test_settings_locked_while_open() {
        let mut ch = channel();
        ch.set_baud_rate(115200).unwrap();
        ch.open().unwrap();

        let err = ch.set_baud_rate(9600).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::ConfigurationLocked { .. })
        ));
        assert_eq!(ch.baud_rate(), 115200);
        assert!(ch.set_port("COM3").is_err());
        assert!(ch.set_timeout(Duration::from_secs(1)).is_err());
        assert_eq!(ch.port(), "/dev/ttyACM0");

        ch.close().unwrap();
        ch.set_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(ch.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_write_and_read_require_open() {
        let mut ch = channel();
        assert!(ch.write(b"x").is_err());
        assert!(ch.read_byte().is_err());
    }

    #[test]
    fn test_write_loops_over_partial_writes() {
        let transport = LoopbackTransport {
            chunk: Some(2),
            ..Default::default()
        };
        let mut ch = DeviceChannel::new(ConnectionParams::new("loop"), Box::new(transport));
        ch.open().unwrap();
        ch.write(b"hello").unwrap();

        let mut echoed = Vec::new();
        while let Some(b) = ch.read_byte().unwrap() {
            echoed.push(b);
        }
        assert_eq!(echoed, b"hello");
    }
}
