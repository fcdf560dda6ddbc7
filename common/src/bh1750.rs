use embedded_hal::i2c::I2c;

use crate::{
    compensation::lux_from_raw,
    error::{BlindsError, BlindsResult},
};

/// Continuous high-resolution mode, 1 lx resolution, ~120 ms per sample.
pub const CONTINUOUS_HIGH_RES: u8 = 0x10;

/// GY-30 / BH1750 ambient light sensor.
#[derive(Debug, Clone, Copy)]
pub struct Bh1750 {
    address: u8,
}

impl Bh1750 {
    pub fn new(address: u8) -> Self {
        Self { address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn start_measurement<I: I2c>(&self, bus: &mut I) -> BlindsResult<()> {
        bus.write(self.address, &[CONTINUOUS_HIGH_RES])
            .map_err(|err| BlindsError::from_i2c("bh1750 mode write", err))
    }

    pub fn read_lux<I: I2c>(&self, bus: &mut I) -> BlindsResult<f64> {
        let mut data = [0_u8; 2];
        bus.write_read(self.address, &[CONTINUOUS_HIGH_RES], &mut data)
            .map_err(|err| BlindsError::from_i2c("bh1750 read", err))?;
        Ok(lux_from_raw(u16::from_be_bytes(data)))
    }
}
