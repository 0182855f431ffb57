//! Sample Holder Controller Implementation
//!
//! Drives a rotary sample holder through its `run[...]` firmware and keeps a
//! software model of the motor position. The firmware never reports position
//! on its own; the model is seeded by `get_pos` on enable, reset by `home`,
//! and advanced locally after every confirmed move.

use crate::communication::{
    ByteTransport, ConnectionParams, DeviceChannel, SerialTransport, DEFAULT_BAUD_RATE,
    DEFAULT_TIMEOUT,
};
use crate::protocol::{
    ClientConfig, InvokeResult, ProtocolClient, RunCommand, DEFAULT_READ_ATTEMPTS,
};
use sampleholder_core::{
    next_occupied, ControllerError, EventDispatcher, HolderEvent, HolderState, Result,
    SampleGeometry,
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default number of sample slots
pub const DEFAULT_SAMPLE_COUNT: u32 = 10;

/// Default steps per revolution, used when the device can not be queried
pub const DEFAULT_SPR: u32 = 200;

/// Firmware boot grace period after opening the port
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Terminator appended to every request
pub const LINE_TERMINATOR: char = '\n';

/// Sample holder controller options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderConfig {
    /// Serial port name
    pub port: String,
    /// Number of sample slots in the holder
    pub sample_count: u32,
    /// Steps per revolution used if `get_spr` fails
    pub default_spr: u32,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-byte read timeout
    pub timeout: Duration,
    /// Consecutive idle reads before a response times out
    pub read_attempts: u32,
    /// Wait between opening the port and the first command
    pub settle_delay: Duration,
}

impl HolderConfig {
    /// Default options for `port`
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            timeout: self.timeout,
        }
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            read_attempts: self.read_attempts,
            terminator: Some(LINE_TERMINATOR),
        }
    }
}

impl Default for HolderConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            sample_count: DEFAULT_SAMPLE_COUNT,
            default_spr: DEFAULT_SPR,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            read_attempts: DEFAULT_READ_ATTEMPTS,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// Where the steps-per-revolution value in use came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SprSource {
    /// Reported by the device
    Queried {
        /// The reported value
        spr: u32,
    },
    /// The query failed and the configured default is in use
    Fallback {
        /// The configured default
        spr: u32,
        /// Why the query failed
        reason: String,
    },
}

impl SprSource {
    /// The SPR value in use
    pub fn spr(&self) -> u32 {
        match self {
            Self::Queried { spr } | Self::Fallback { spr, .. } => *spr,
        }
    }

    /// True when the configured default is in use
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// The recoverable error to surface for a fallback
    pub fn error(&self) -> Option<ControllerError> {
        match self {
            Self::Queried { .. } => None,
            Self::Fallback { spr, reason } => Some(ControllerError::SprQueryFailed {
                default_spr: *spr,
                reason: reason.clone(),
            }),
        }
    }
}

/// Snapshot of the controller for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolderStatus {
    /// Connection state
    pub state: HolderState,
    /// Motor position model, if known
    pub position: Option<u32>,
    /// Derived sample index, if known
    pub sample: Option<u32>,
    /// Steps per revolution in use
    pub spr: u32,
    /// Number of sample slots
    pub sample_count: u32,
    /// How the SPR was established, once connected
    pub spr_source: Option<SprSource>,
}

/// Controller for a motorized sample holder
pub struct SampleHolderController {
    client: ProtocolClient,
    geometry: SampleGeometry,
    default_spr: u32,
    settle_delay: Duration,
    state: HolderState,
    position: Option<u32>,
    spr_source: Option<SprSource>,
    events: EventDispatcher,
}

impl SampleHolderController {
    /// Create a controller over `transport`
    pub fn new(config: HolderConfig, transport: Box<dyn ByteTransport>) -> Result<Self> {
        let geometry = SampleGeometry::new(config.sample_count, config.default_spr)?;
        let channel = DeviceChannel::new(config.connection_params(), transport);

        Ok(Self {
            client: ProtocolClient::new(channel, config.client_config()),
            geometry,
            default_spr: config.default_spr,
            settle_delay: config.settle_delay,
            state: HolderState::Disconnected,
            position: None,
            spr_source: None,
            events: EventDispatcher::default(),
        })
    }

    /// Create a controller on a serial port
    pub fn serial(config: HolderConfig) -> Result<Self> {
        Self::new(config, Box::new(SerialTransport::new()))
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Open the port, wait for the firmware to boot, and read steps per revolution
    ///
    /// A failed SPR query does not fail the connection; the configured default
    /// is used and reported through [`SprSource::Fallback`].
    pub fn connect(&mut self) -> Result<SprSource> {
        if self.client.is_connected() {
            return Err(ControllerError::AlreadyConnected.into());
        }

        self.client.connect()?;
        self.set_state(HolderState::Disabled);
        let port = self.client.channel().port().to_string();
        tracing::info!("Connected to sample holder on {}", port);
        self.events.publish(HolderEvent::Connected(port));

        if !self.settle_delay.is_zero() {
            tracing::debug!("Waiting {:?} for firmware to start", self.settle_delay);
            std::thread::sleep(self.settle_delay);
        }

        let source = match self.query_spr() {
            Ok(spr) => SprSource::Queried { spr },
            Err(e) => {
                tracing::warn!(
                    "Could not get steps per rotation ({}), using default {}",
                    e,
                    self.default_spr
                );
                SprSource::Fallback {
                    spr: self.default_spr,
                    reason: e.to_string(),
                }
            }
        };

        self.geometry = self.geometry.with_spr(source.spr())?;
        if !self.geometry.is_aligned() {
            tracing::warn!(
                "{} steps per revolution is not a multiple of {} samples; sample positions will be rounded",
                self.geometry.spr(),
                self.geometry.sample_count()
            );
        }

        self.events.publish(HolderEvent::SprResolved {
            spr: source.spr(),
            queried: !source.is_fallback(),
        });
        self.spr_source = Some(source.clone());
        Ok(source)
    }

    /// Close the port and forget the position model
    pub fn disconnect(&mut self) -> Result<()> {
        self.client.disconnect()?;
        self.position = None;
        self.spr_source = None;
        self.geometry = self.geometry.with_spr(self.default_spr)?;
        self.set_state(HolderState::Disconnected);
        self.events.publish(HolderEvent::Disconnected);
        tracing::info!("Disconnected from sample holder");
        Ok(())
    }

    /// Whether the port is open
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Change the port. Fails while connected.
    pub fn set_port(&mut self, port: impl Into<String>) -> Result<()> {
        self.client.channel_mut().set_port(port)
    }

    /// Change the baud rate. Fails while connected.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.client.channel_mut().set_baud_rate(baud_rate)
    }

    /// Change the per-byte read timeout. Fails while connected.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.client.channel_mut().set_timeout(timeout)
    }

    /// Connection parameters of the underlying channel
    pub fn connection_params(&self) -> &ConnectionParams {
        self.client.channel().params()
    }

    // ------------------------------------------------------------------
    // Motor
    // ------------------------------------------------------------------

    /// Enable the motor driver and read the current position
    pub fn enable(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.client.run("enable", no_args())?;
        self.set_state(HolderState::Enabled);

        let result = self.client.run("get_pos", no_args())?;
        let position = expect_integer("get_pos", &result)?;
        self.set_position(self.geometry.normalize(position));
        tracing::info!("Motor enabled at position {}", position);
        Ok(())
    }

    /// Disable the motor driver
    pub fn disable(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.client.run("disable", no_args())?;
        self.set_state(HolderState::Disabled);
        tracing::info!("Motor disabled");
        Ok(())
    }

    /// Run the firmware homing cycle; the position model becomes zero
    pub fn home(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.client.run("home", no_args())?;
        self.set_position(0);
        tracing::info!("Homed");
        Ok(())
    }

    /// Ask the firmware whether the motor is enabled
    pub fn is_enabled(&mut self) -> Result<bool> {
        self.ensure_connected()?;
        let result = self.client.run("is_enabled", no_args())?;
        Ok(result.as_text().as_deref() == Some("1"))
    }

    /// Move the motor by `steps` motor steps
    pub fn move_steps(&mut self, steps: i64) -> Result<()> {
        let position = self.motion_origin()?;
        self.client.run("move", [steps])?;
        self.set_position(self.geometry.advance(position, steps));
        Ok(())
    }

    /// Move by `num` sample widths, returning the motor steps taken
    pub fn step(&mut self, num: i64) -> Result<i64> {
        self.motion_origin()?;
        let steps = self.geometry.steps_for_samples(num).ok_or_else(|| {
            ControllerError::MotionOutOfRange {
                amount: num,
                unit: "samples".to_string(),
            }
        })?;
        self.move_steps(steps)?;
        Ok(steps)
    }

    /// Go to sample `num` the short way round, returning the sample distance taken
    ///
    /// `num` may equal the sample count, which is the same slot as zero.
    pub fn goto(&mut self, num: i64) -> Result<i64> {
        let count = self.geometry.sample_count();
        if num < 0 || num > i64::from(count) {
            return Err(ControllerError::InvalidSample {
                sample: num,
                max: count,
            }
            .into());
        }

        let position = self.motion_origin()?;
        let current = self.geometry.sample_at(i64::from(position));
        let distance = self.geometry.shortest_path(current, num);
        tracing::debug!("Goto {}: at sample {}, stepping {}", num, current, distance);

        self.step(distance)?;
        Ok(distance)
    }

    /// Shift the firmware home reference by `num` steps
    ///
    /// The holder physically moves `num` steps, then the firmware is told to
    /// offset its reference by `-num`, so the modelled position is unchanged.
    /// If the offset command fails the model keeps the moved position.
    pub fn offset(&mut self, num: i64) -> Result<()> {
        let position = self.motion_origin()?;
        let reference = num
            .checked_neg()
            .ok_or_else(|| ControllerError::MotionOutOfRange {
                amount: num,
                unit: "steps".to_string(),
            })?;
        self.move_steps(num)?;
        self.client.run("offset", [reference])?;
        self.set_position(position);
        tracing::info!("Home reference offset by {} steps", num);
        Ok(())
    }

    /// Step `hops` occupied samples from the current one
    ///
    /// Returns the sample moved to, or `None` when `hops` is zero and the
    /// current sample is not occupied.
    pub fn step_occupied(&mut self, occupied: &[u32], hops: i64) -> Result<Option<u32>> {
        let position = self.motion_origin()?;
        if occupied.is_empty() {
            return Err(ControllerError::NoOccupiedSamples.into());
        }

        let current = self.geometry.sample_at(i64::from(position));
        match next_occupied(occupied, current, hops) {
            Some(target) => {
                self.goto(i64::from(target))?;
                Ok(Some(target))
            }
            None => Ok(None),
        }
    }

    /// Run an arbitrary firmware command
    pub fn invoke(&mut self, command: &RunCommand) -> Result<InvokeResult> {
        self.ensure_connected()?;
        let result = self.client.invoke(command)?;
        self.events
            .publish(HolderEvent::CommandComplete(command.name().to_string()));
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Derived sample index, `None` until the position is known
    pub fn sample(&self) -> Option<u32> {
        self.position.map(|p| self.geometry.sample_at(i64::from(p)))
    }

    /// Motor position model
    pub fn position(&self) -> Option<u32> {
        self.position
    }

    /// Steps per revolution in use
    pub fn spr(&self) -> u32 {
        self.geometry.spr()
    }

    /// Number of sample slots
    pub fn sample_count(&self) -> u32 {
        self.geometry.sample_count()
    }

    /// Current geometry
    pub fn geometry(&self) -> SampleGeometry {
        self.geometry
    }

    /// How the SPR was established on the last connect
    pub fn spr_source(&self) -> Option<&SprSource> {
        self.spr_source.as_ref()
    }

    /// Local connection state
    pub fn state(&self) -> HolderState {
        self.state
    }

    /// Largest sensible magnitude for `move_steps` and `offset`
    pub fn trim_limit(&self) -> u32 {
        self.geometry.trim_limit()
    }

    /// Status snapshot
    pub fn status(&self) -> HolderStatus {
        HolderStatus {
            state: self.state,
            position: self.position,
            sample: self.sample(),
            spr: self.spr(),
            sample_count: self.sample_count(),
            spr_source: self.spr_source.clone(),
        }
    }

    /// Event dispatcher
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<HolderEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_connected(&self) -> Result<()> {
        if self.client.is_connected() {
            Ok(())
        } else {
            Err(ControllerError::NotConnected.into())
        }
    }

    /// Position to move from; motion needs an enabled motor with a known position
    fn motion_origin(&self) -> Result<u32> {
        if !self.state.is_enabled() || !self.client.is_connected() {
            return Err(ControllerError::NotEnabled.into());
        }
        self.position
            .ok_or_else(|| ControllerError::PositionUnknown.into())
    }

    fn query_spr(&mut self) -> Result<u32> {
        let result = self.client.run("get_spr", no_args())?;
        let spr = expect_integer("get_spr", &result)?;
        u32::try_from(spr)
            .ok()
            .filter(|spr| *spr > 0)
            .ok_or_else(|| {
                ControllerError::UnexpectedResponse {
                    command: "get_spr".to_string(),
                    reason: format!("{} is not a positive step count", spr),
                }
                .into()
            })
    }

    fn set_state(&mut self, state: HolderState) {
        if self.state != state {
            self.state = state;
            self.events.publish(HolderEvent::StateChanged(state));
        }
    }

    fn set_position(&mut self, position: u32) {
        self.position = Some(position);
        self.events.publish(HolderEvent::PositionChanged {
            position,
            sample: self.geometry.sample_at(i64::from(position)),
        });
    }
}

fn no_args() -> [i64; 0] {
    []
}

fn expect_integer(command: &str, result: &InvokeResult) -> Result<i64> {
    result.as_i64().ok_or_else(|| {
        ControllerError::UnexpectedResponse {
            command: command.to_string(),
            reason: format!("expected an integer, got {}", result),
        }
        .into()
    })
}
