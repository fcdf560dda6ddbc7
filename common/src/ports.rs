//! Seams between the control loops and the hardware they drive.

use std::{future::Future, time::Duration};

use embedded_hal::{digital::OutputPin, i2c::I2c};
use tracing::debug;

use crate::{
    bh1750::Bh1750,
    bmp280::Bmp280,
    config::BusConfig,
    error::BlindsResult,
    leds::RgbIndicator,
    stepper::StepperDriver,
    types::{ActuationCommand, AmbientReading, ClimateReading, IndicatorColor},
};

/// Light and temperature for the blind node.
pub trait AmbientSensors {
    fn read_ambient(&mut self) -> impl Future<Output = BlindsResult<AmbientReading>>;
}

/// Temperature and pressure for the panel node.
pub trait ClimateSensor {
    fn read_climate(&mut self) -> impl Future<Output = BlindsResult<ClimateReading>>;
}

pub trait BlindDrive {
    /// Runs the command to completion. Coils are released afterwards.
    fn drive(&mut self, command: ActuationCommand) -> impl Future<Output = BlindsResult<()>>;

    fn release(&mut self) -> BlindsResult<()>;
}

pub trait Indicator {
    fn show(&mut self, color: IndicatorColor) -> BlindsResult<()>;

    fn off(&mut self) -> BlindsResult<()>;
}

pub trait StatusDisplay {
    fn render(&mut self, lines: &[String]) -> BlindsResult<()>;
}

/// BH1750 high-resolution conversion takes up to 180 ms.
pub const DEFAULT_LUX_DELAY_MS: u64 = 200;
/// BMP280 forced conversion at the rig's oversampling.
pub const DEFAULT_TEMPERATURE_DELAY_MS: u64 = 500;

/// Owns the I2C bus and lends it to each sensor driver in turn.
pub struct SensorSuite<I: I2c> {
    bus: I,
    light: Bh1750,
    climate: Bmp280,
    lux_delay: Duration,
    temperature_delay: Duration,
}

impl<I: I2c> SensorSuite<I> {
    pub fn new(bus: I, addresses: &BusConfig) -> Self {
        Self {
            bus,
            light: Bh1750::new(addresses.bh1750_address),
            climate: Bmp280::new(addresses.bmp280_address),
            lux_delay: Duration::from_millis(DEFAULT_LUX_DELAY_MS),
            temperature_delay: Duration::from_millis(DEFAULT_TEMPERATURE_DELAY_MS),
        }
    }

    /// Time each sensor is given between the measurement command and the read.
    pub fn with_delays(mut self, lux_delay: Duration, temperature_delay: Duration) -> Self {
        self.lux_delay = lux_delay;
        self.temperature_delay = temperature_delay;
        self
    }

    pub fn bus(&self) -> &I {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut I {
        &mut self.bus
    }
}

impl<I: I2c> AmbientSensors for SensorSuite<I> {
    async fn read_ambient(&mut self) -> BlindsResult<AmbientReading> {
        self.light.start_measurement(&mut self.bus)?;
        tokio::time::sleep(self.lux_delay).await;
        let lux = self.light.read_lux(&mut self.bus)?;

        self.climate.start_measurement(&mut self.bus)?;
        tokio::time::sleep(self.temperature_delay).await;
        let temperature_c = self.climate.read_temperature(&mut self.bus)?;

        debug!("ambient read: {lux:.1} lx, {temperature_c:.2} C");
        Ok(AmbientReading { lux, temperature_c })
    }
}

impl<I: I2c> ClimateSensor for SensorSuite<I> {
    async fn read_climate(&mut self) -> BlindsResult<ClimateReading> {
        self.climate.start_measurement(&mut self.bus)?;
        tokio::time::sleep(self.temperature_delay).await;
        self.climate.read_climate(&mut self.bus)
    }
}

impl<P: OutputPin> BlindDrive for StepperDriver<P> {
    async fn drive(&mut self, command: ActuationCommand) -> BlindsResult<()> {
        self.run(command).await
    }

    fn release(&mut self) -> BlindsResult<()> {
        StepperDriver::release(self)
    }
}

impl<P: OutputPin> Indicator for RgbIndicator<P> {
    fn show(&mut self, color: IndicatorColor) -> BlindsResult<()> {
        RgbIndicator::show(self, color)
    }

    fn off(&mut self) -> BlindsResult<()> {
        RgbIndicator::off(self)
    }
}
