//! `run[...]` request/response protocol
//!
//! Requests are text commands, responses are JSON objects ending at their
//! closing brace.

pub mod client;
pub mod command;
pub mod response;

pub use client::{ClientConfig, ProtocolClient, DEFAULT_READ_ATTEMPTS};
pub use command::{CommandArg, RunCommand};
pub use response::{value_as_i64, value_as_text, DeviceResponse, InvokeResult};
