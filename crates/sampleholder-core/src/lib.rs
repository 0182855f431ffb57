//! # SampleHolder Core
//!
//! Core types and utilities for SampleHolder.
//! Provides the error taxonomy, the holder state machine states,
//! circular sample geometry, and the event dispatcher.

pub mod error;
pub mod event;
pub mod geometry;
pub mod state;

pub use error::{ConnectionError, ControllerError, Error, ProtocolError, Result};
pub use event::{EventDispatcher, HolderEvent};
pub use geometry::{next_occupied, SampleGeometry};
pub use state::HolderState;
