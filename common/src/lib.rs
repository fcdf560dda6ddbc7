pub mod actuator;
pub mod bh1750;
pub mod bmp280;
pub mod compensation;
pub mod config;
pub mod control;
pub mod error;
pub mod leds;
pub mod ports;
pub mod press;
pub mod sim;
pub mod status;
pub mod stepper;
pub mod telemetry;
pub mod topics;
pub mod transport;
pub mod types;

pub use actuator::{BlindStateMachine, DEFAULT_BLIND_STEPS};
pub use config::{
    BlindConfig, BusConfig, ChannelField, PanelConfig, PinConfig, RuntimeConfig, TelemetryConfig,
};
pub use control::{BlindController, Cadence, CycleReport, PanelController, PanelIo};
pub use error::{BlindsError, BlindsResult, PublishFailure};
pub use press::{PressClassifier, Setpoint, ToggleLatch};
pub use telemetry::{GoalSource, RetryPolicy, TelemetryPublisher, Transport};
pub use topics::*;
pub use types::{
    ActuationCommand, AmbientReading, BlindState, ClimateReading, Direction, IndicatorColor,
    PressEvent,
};
