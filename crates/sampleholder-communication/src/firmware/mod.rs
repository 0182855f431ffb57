//! Firmware implementations for devices speaking the `run[...]` protocol
//!
//! Supported devices:
//! - Sample holder: rotary multi-sample stage with a stepper motor

pub mod sample_holder;

pub use sample_holder::{
    HolderConfig, HolderHandle, HolderStatus, SampleHolderController, SimulatedHolder, SprSource,
};
