//! # SampleHolder Communication
//!
//! Serial device channel, `run[...]` command protocol, and the sample holder
//! firmware controller for SampleHolder.

pub mod communication;
pub mod firmware;
pub mod protocol;

pub use communication::{
    list_port_names, list_ports, ByteTransport, ConnectionParams, DeviceChannel, SerialPortInfo,
    SerialTransport, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT,
};
pub use firmware::sample_holder::{
    HolderConfig, HolderHandle, HolderStatus, SampleHolderController, SimulatedHolder,
    SimulatorState, SprSource, DEFAULT_SAMPLE_COUNT, DEFAULT_SETTLE_DELAY, DEFAULT_SPR,
};
pub use protocol::{
    ClientConfig, CommandArg, DeviceResponse, InvokeResult, ProtocolClient, RunCommand,
};
