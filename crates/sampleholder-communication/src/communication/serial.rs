//! Serial port communication implementation
//!
//! Provides the serial byte transport used to reach sample holder firmware
//! over USB or RS-232, and port enumeration for front ends.

use super::{ByteTransport, ConnectionParams};
use sampleholder_core::{ConnectionError, Result};
use std::io::{self, Read, Write};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyACM0", "COM4")
    pub port_name: String,

    /// Port description (e.g., "USB Arduino Uno")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that could host a microcontroller
///
/// Filters to:
/// - Windows: COM* (e.g., COM1, COM4)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*, /dev/tty.usb*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::PortEnumeration {
            reason: e.to_string(),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_device_port(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, port_description(port));
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb_info) => {
                    let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                    if let Some(ref mfg) = usb_info.manufacturer {
                        info = info.with_manufacturer(mfg);
                    }
                    if let Some(ref serial) = usb_info.serial_number {
                        info = info.with_serial_number(serial);
                    }
                    info
                }
                _ => info,
            }
        })
        .collect())
}

/// Addresses of the ports returned by [`list_ports`]
pub fn list_port_names() -> Result<Vec<String>> {
    Ok(list_ports()?.into_iter().map(|p| p.port_name).collect())
}

fn is_device_port(port_name: &str) -> bool {
    if let Some(num) = port_name.strip_prefix("COM") {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
    }

    const PREFIXES: [&str; 5] = [
        "/dev/ttyUSB",
        "/dev/ttyACM",
        "/dev/cu.usbserial-",
        "/dev/cu.usbmodem",
        "/dev/tty.usb",
    ];
    PREFIXES.iter().any(|prefix| port_name.starts_with(prefix))
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Serial byte transport backed by the `serialport` crate
#[derive(Default)]
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Create a closed transport
    pub fn new() -> Self {
        Self::default()
    }

    fn io_error(&self, e: io::Error) -> ConnectionError {
        ConnectionError::IoError {
            port: self.name.clone(),
            reason: e.to_string(),
        }
    }
}

impl ByteTransport for SerialTransport {
    fn open(&mut self, params: &ConnectionParams) -> Result<()> {
        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(params.timeout)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        self.name = params.port.clone();
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // dropping the handle closes the port
        self.port = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Err(ConnectionError::NotOpen.into());
        };
        let result = port.write(data).and_then(|n| port.flush().map(|_| n));
        result.map_err(|e| self.io_error(e).into())
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let Some(port) = self.port.as_mut() else {
            return Err(ConnectionError::NotOpen.into());
        };
        let mut buf = [0u8; 1];
        match port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(self.io_error(e).into()),
        }
    }
}
