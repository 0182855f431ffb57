//! Event system for holder state changes
//!
//! Provides:
//! - Event types for connection, motor, and position changes
//! - Event dispatcher for publishing events to subscribers

use crate::state::HolderState;
use tokio::sync::broadcast;

/// Holder event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HolderEvent {
    /// Channel opened on the given port
    Connected(String),
    /// Channel closed
    Disconnected,
    /// Holder state changed
    StateChanged(HolderState),
    /// Motor position model changed
    PositionChanged {
        /// Absolute motor steps in `[0, spr)`.
        position: u32,
        /// Sample whose sector contains the position.
        sample: u32,
    },
    /// Steps per revolution settled after connecting
    SprResolved {
        /// The SPR in use.
        spr: u32,
        /// Whether the value came from the device.
        queried: bool,
    },
    /// Firmware command completed
    CommandComplete(String),
}

impl std::fmt::Display for HolderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HolderEvent::Connected(port) => write!(f, "Connected to {}", port),
            HolderEvent::Disconnected => write!(f, "Disconnected"),
            HolderEvent::StateChanged(state) => write!(f, "State: {}", state),
            HolderEvent::PositionChanged { position, sample } => {
                write!(f, "Position: {} (sample {})", position, sample)
            }
            HolderEvent::SprResolved { spr, queried } => {
                let source = if *queried { "device" } else { "default" };
                write!(f, "Steps per revolution: {} ({})", spr, source)
            }
            HolderEvent::CommandComplete(cmd) => write!(f, "Command complete: {}", cmd),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<HolderEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<HolderEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers reached. Having none is not an error.
    pub fn publish(&self, event: HolderEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
