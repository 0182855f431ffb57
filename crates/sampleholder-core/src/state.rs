//! Holder connection state

use serde::{Deserialize, Serialize};

/// Connection and motor state of a sample holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderState {
    /// No channel open
    #[default]
    Disconnected,
    /// Channel open, motor driver off
    Disabled,
    /// Channel open, motor driver on
    Enabled,
}

impl HolderState {
    /// True while a channel is open
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// True while the motor accepts motion commands
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl std::fmt::Display for HolderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Disabled => write!(f, "Connected (disabled)"),
            Self::Enabled => write!(f, "Connected (enabled)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_queries() {
        assert!(!HolderState::Disconnected.is_connected());
        assert!(HolderState::Disabled.is_connected());
        assert!(!HolderState::Disabled.is_enabled());
        assert!(HolderState::Enabled.is_enabled());
        assert_eq!(HolderState::default(), HolderState::Disconnected);
    }
}
