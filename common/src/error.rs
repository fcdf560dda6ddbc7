use thiserror::Error;

pub type BlindsResult<T> = Result<T, BlindsError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlindsError {
    /// Register or calibration data of the wrong shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The bus collaborator failed to read or write.
    #[error("sensor bus failure: {0}")]
    SensorBus(String),

    /// Broker or HTTP endpoint unreachable, or the response was unusable.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),
}

impl BlindsError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn sensor_bus(message: impl Into<String>) -> Self {
        Self::SensorBus(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn from_i2c<E: embedded_hal::i2c::Error>(context: &str, err: E) -> Self {
        Self::SensorBus(format!("{context}: {:?}", err.kind()))
    }

    pub fn from_pin<E: embedded_hal::digital::Error>(context: &str, err: E) -> Self {
        Self::SensorBus(format!("{context}: {:?}", err.kind()))
    }
}

/// Returned by a bounded publish once every attempt has failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("publish gave up after {attempts} attempt(s): {last}")]
pub struct PublishFailure {
    pub attempts: u32,
    pub last: BlindsError,
}
