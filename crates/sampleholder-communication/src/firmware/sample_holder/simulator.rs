//! Sample holder firmware simulator
//!
//! A byte transport that answers `run[...]` requests the way the sample
//! holder firmware does. Used by tests and by the CLI `--simulate` mode.

use crate::communication::{ByteTransport, ConnectionParams};
use crate::protocol::{CommandArg, DeviceResponse, RunCommand};
use parking_lot::Mutex;
use sampleholder_core::{ConnectionError, Result};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Firmware-side state of a simulated holder
#[derive(Debug, Clone)]
pub struct SimulatorState {
    /// Steps per revolution reported by `get_spr`
    pub spr: u32,
    /// Motor driver state
    pub enabled: bool,
    /// Physical motor steps since power-up
    pub physical: i64,
    /// Home reference shift accumulated by `offset`
    pub home_offset: i64,
    /// Every request received, in order
    pub received: Vec<String>,
    /// Commands answered with `status: error`
    pub failing: HashSet<String>,
    /// When set, requests are swallowed without a reply
    pub silent: bool,
}

impl SimulatorState {
    /// Position as reported by `get_pos`
    pub fn reported_position(&self) -> i64 {
        let sum = i128::from(self.physical) + i128::from(self.home_offset);
        // the remainder is below the u32 modulus
        sum.rem_euclid(i128::from(self.spr.max(1))) as i64
    }

    fn handle(&mut self, command: &RunCommand) -> DeviceResponse {
        let name = command.name();
        if self.failing.contains(name) {
            return DeviceResponse::error(name);
        }

        let steps = command.arguments().first().and_then(CommandArg::as_int);
        match (name, steps) {
            ("get_spr", _) => DeviceResponse::ok(name, Some(json!(self.spr))),
            ("get_pos", _) => DeviceResponse::ok(name, Some(json!(self.reported_position()))),
            ("is_enabled", _) => {
                let flag = if self.enabled { "1" } else { "0" };
                DeviceResponse::ok(name, Some(json!(flag)))
            }
            ("enable", _) => {
                self.enabled = true;
                DeviceResponse::ok(name, None)
            }
            ("disable", _) => {
                self.enabled = false;
                DeviceResponse::ok(name, None)
            }
            ("home", _) if self.enabled => {
                self.physical = self.home_offset.wrapping_neg();
                DeviceResponse::ok(name, None)
            }
            ("move", Some(n)) if self.enabled => {
                self.physical = self.physical.wrapping_add(n);
                DeviceResponse::ok(name, None)
            }
            ("offset", Some(n)) => {
                self.home_offset = self.home_offset.wrapping_add(n);
                DeviceResponse::ok(name, None)
            }
            ("echo", _) => {
                let text = command
                    .arguments()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                DeviceResponse::ok(name, Some(json!(text)))
            }
            _ => DeviceResponse::error(name),
        }
    }
}

impl Default for SimulatorState {
    fn default() -> Self {
        Self {
            spr: 200,
            enabled: false,
            physical: 0,
            home_offset: 0,
            received: Vec::new(),
            failing: HashSet::new(),
            silent: false,
        }
    }
}

/// Simulated sample holder reachable as a byte transport
pub struct SimulatedHolder {
    open: bool,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    state: Arc<Mutex<SimulatorState>>,
}

impl SimulatedHolder {
    /// Simulated holder with default firmware state
    pub fn new() -> Self {
        Self::with_state(SimulatorState::default())
    }

    /// Simulated holder starting from `state`
    pub fn with_state(state: SimulatorState) -> Self {
        Self {
            open: false,
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Shared handle to the firmware state, for inspection and fault injection
    pub fn state(&self) -> Arc<Mutex<SimulatorState>> {
        self.state.clone()
    }

    fn process_requests(&mut self) {
        while let Some(end) = self.inbound.iter().position(|b| *b == b']') {
            let request: Vec<u8> = self.inbound.drain(..=end).collect();
            let line = String::from_utf8_lossy(&request).trim().to_string();
            self.respond(&line);
        }
        // drop the terminator left after the last request
        let trailing_whitespace = self.inbound.iter().all(u8::is_ascii_whitespace);
        if trailing_whitespace {
            self.inbound.clear();
        }
    }

    fn respond(&mut self, line: &str) {
        let mut state = self.state.lock();
        state.received.push(line.to_string());
        if state.silent {
            return;
        }

        let response = match RunCommand::parse(line) {
            Ok(command) => state.handle(&command),
            Err(_) => DeviceResponse::error(line),
        };
        drop(state);

        match serde_json::to_vec(&response) {
            Ok(bytes) => {
                self.outbound.extend(bytes);
                self.outbound.extend(b"\r\n");
            }
            Err(e) => tracing::error!("Simulator failed to encode response: {}", e),
        }
    }
}

impl Default for SimulatedHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteTransport for SimulatedHolder {
    fn open(&mut self, params: &ConnectionParams) -> Result<()> {
        tracing::debug!("Simulated holder opened as {}", params.port);
        self.open = true;
        self.inbound.clear();
        self.outbound.clear();
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
        if !self.open {
            return Err(ConnectionError::NotOpen.into());
        }
        self.inbound.extend_from_slice(data);
        self.process_requests();
        Ok(data.len())
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        if !self.open {
            return Err(ConnectionError::NotOpen.into());
        }
        Ok(self.outbound.pop_front())
    }
}
