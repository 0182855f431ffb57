//! Motorized sample holder
//!
//! A rotary holder with a fixed number of sample slots, driven by a stepper
//! motor behind `run[...]` firmware.

pub mod controller;
pub mod simulator;
pub mod worker;

pub use controller::{
    HolderConfig, HolderStatus, SampleHolderController, SprSource, DEFAULT_SAMPLE_COUNT,
    DEFAULT_SETTLE_DELAY, DEFAULT_SPR, LINE_TERMINATOR,
};
pub use simulator::{SimulatedHolder, SimulatorState};
pub use worker::HolderHandle;
