use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlindState {
    Open,
    Closed,
    Unknown,
}

impl BlindState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Open,
    Close,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
        }
    }

    /// State the blind is left in once a command in this direction completes.
    pub fn target_state(self) -> BlindState {
        match self {
            Self::Open => BlindState::Open,
            Self::Close => BlindState::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationCommand {
    pub direction: Direction,
    pub steps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorColor {
    Blue,
    Green,
    Red,
}

impl IndicatorColor {
    /// Line levels in red, green, blue order.
    pub fn levels(self) -> [bool; 3] {
        match self {
            Self::Blue => [false, false, true],
            Self::Green => [false, true, false],
            Self::Red => [true, false, false],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blue => "BLUE",
            Self::Green => "GREEN",
            Self::Red => "RED",
        }
    }
}

/// A classified setpoint gesture. Short holds increment, long holds decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressEvent {
    Increment { magnitude: i32, held_ms: u64 },
    Decrement { magnitude: i32, held_ms: u64 },
}

impl PressEvent {
    pub fn signed_delta(&self) -> i32 {
        match *self {
            Self::Increment { magnitude, .. } => magnitude,
            Self::Decrement { magnitude, .. } => -magnitude,
        }
    }

    pub fn held_ms(&self) -> u64 {
        match *self {
            Self::Increment { held_ms, .. } | Self::Decrement { held_ms, .. } => held_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientReading {
    pub lux: f64,
    pub temperature_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_c: f64,
    pub pressure_hpa: f64,
}
