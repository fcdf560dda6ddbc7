//! BMP280 temperature/pressure sensor over I2C.
//!
//! The bus is not owned here; every call borrows it so one bus can serve
//! several drivers without extra locking.

use embedded_hal::i2c::I2c;

use crate::{
    compensation::{
        assemble_raw_pressure, assemble_raw_temperature, check_len, compensate_pressure,
        compensate_temperature, decode_calibration, decode_pressure_calibration,
        fine_temperature, CalibrationWords, PressureCalibration, CALIBRATION_BLOCK_LEN,
    },
    error::{BlindsError, BlindsResult},
    types::ClimateReading,
};

pub const REG_CALIBRATION: u8 = 0x88;
pub const REG_CTRL_MEAS: u8 = 0xF4;
pub const REG_PRESS_MSB: u8 = 0xF7;
pub const REG_TEMP_MSB: u8 = 0xFA;

/// Temperature x1, pressure x4 oversampling, normal mode.
pub const CTRL_MEAS_NORMAL: u8 = 0x2F;

#[derive(Debug, Clone, Copy)]
struct Trimming {
    temperature: CalibrationWords,
    pressure: PressureCalibration,
}

#[derive(Debug, Clone)]
pub struct Bmp280 {
    address: u8,
    trimming: Option<Trimming>,
}

impl Bmp280 {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            trimming: None,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Reads and caches the factory trimming block.
    pub fn read_calibration<I: I2c>(
        &mut self,
        bus: &mut I,
    ) -> BlindsResult<(CalibrationWords, PressureCalibration)> {
        if let Some(trimming) = self.trimming {
            return Ok((trimming.temperature, trimming.pressure));
        }

        let mut block = [0_u8; CALIBRATION_BLOCK_LEN];
        bus.write_read(self.address, &[REG_CALIBRATION], &mut block)
            .map_err(|err| BlindsError::from_i2c("bmp280 calibration read", err))?;

        let trimming = Trimming {
            temperature: decode_calibration(&block)?,
            pressure: decode_pressure_calibration(&block)?,
        };
        self.trimming = Some(trimming);
        Ok((trimming.temperature, trimming.pressure))
    }

    /// Drops the cached trimming so the next read fetches it again.
    pub fn invalidate_calibration(&mut self) {
        self.trimming = None;
    }

    pub fn start_measurement<I: I2c>(&self, bus: &mut I) -> BlindsResult<()> {
        bus.write(self.address, &[REG_CTRL_MEAS, CTRL_MEAS_NORMAL])
            .map_err(|err| BlindsError::from_i2c("bmp280 ctrl_meas write", err))
    }

    /// Degrees Celsius from the temperature registers alone.
    pub fn read_temperature<I: I2c>(&mut self, bus: &mut I) -> BlindsResult<f64> {
        let (calibration, _) = self.read_calibration(bus)?;

        let mut data = [0_u8; 3];
        if let Err(err) = bus.write_read(self.address, &[REG_TEMP_MSB], &mut data) {
            self.invalidate_calibration();
            return Err(BlindsError::from_i2c("bmp280 temperature read", err));
        }

        temperature_from_registers(&data, &calibration)
    }

    /// Temperature and pressure from one burst read of 0xF7..0xFC.
    pub fn read_climate<I: I2c>(&mut self, bus: &mut I) -> BlindsResult<ClimateReading> {
        let (calibration, pressure_calibration) = self.read_calibration(bus)?;

        let mut data = [0_u8; 6];
        if let Err(err) = bus.write_read(self.address, &[REG_PRESS_MSB], &mut data) {
            self.invalidate_calibration();
            return Err(BlindsError::from_i2c("bmp280 measurement read", err));
        }

        climate_from_registers(&data, &calibration, &pressure_calibration)
    }
}

pub fn temperature_from_registers(data: &[u8], calibration: &CalibrationWords) -> BlindsResult<f64> {
    check_len(data, 3, "temperature registers")?;
    let raw = assemble_raw_temperature(data[0], data[1], data[2]);
    Ok(compensate_temperature(raw, calibration))
}

pub fn climate_from_registers(
    data: &[u8],
    calibration: &CalibrationWords,
    pressure_calibration: &PressureCalibration,
) -> BlindsResult<ClimateReading> {
    check_len(data, 6, "measurement registers")?;
    let raw_pressure = assemble_raw_pressure(data[0], data[1], data[2]);
    let raw_temperature = assemble_raw_temperature(data[3], data[4], data[5]);
    let t_fine = fine_temperature(raw_temperature, calibration);

    Ok(ClimateReading {
        temperature_c: t_fine / 5120.0,
        pressure_hpa: compensate_pressure(raw_pressure, t_fine, pressure_calibration),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sim::SimulatedBus;

    #[test]
    fn reads_reference_temperature() {
        let mut bus = SimulatedBus::reference();
        let mut sensor = Bmp280::new(0x76);

        sensor.start_measurement(&mut bus).unwrap();
        let temp = sensor.read_temperature(&mut bus).unwrap();

        assert!((temp - 25.08).abs() < 0.01, "got {temp}");
        assert_eq!(
            bus.writes().first(),
            Some(&(0x76, vec![REG_CTRL_MEAS, CTRL_MEAS_NORMAL]))
        );
    }

    #[test]
    fn burst_read_matches_separate_compensation() {
        let mut bus = SimulatedBus::reference();
        let mut sensor = Bmp280::new(0x76);

        let climate = sensor.read_climate(&mut bus).unwrap();
        let temp = sensor.read_temperature(&mut bus).unwrap();

        assert_eq!(climate.temperature_c.to_bits(), temp.to_bits());
        assert!((climate.pressure_hpa - 1006.5).abs() < 0.5);
    }

    #[test]
    fn calibration_is_read_once() {
        let mut bus = SimulatedBus::reference();
        let mut sensor = Bmp280::new(0x76);

        let _ = sensor.read_temperature(&mut bus).unwrap();
        let _ = sensor.read_temperature(&mut bus).unwrap();

        let calibration_reads = bus
            .writes()
            .iter()
            .filter(|(_, bytes)| bytes.as_slice() == [REG_CALIBRATION])
            .count();
        assert_eq!(calibration_reads, 1);
    }

    #[test]
    fn absent_device_is_a_bus_failure() {
        let mut bus = SimulatedBus::reference();
        let mut sensor = Bmp280::new(0x77);

        let err = sensor.read_temperature(&mut bus).unwrap_err();
        assert!(matches!(err, BlindsError::SensorBus(_)));
    }

    #[test]
    fn short_register_block_is_invalid_input() {
        let calibration = CalibrationWords {
            t1: 27504,
            t2: 26435,
            t3: -1000,
        };
        let err = temperature_from_registers(&[0x7E, 0xED], &calibration).unwrap_err();
        assert!(matches!(err, BlindsError::InvalidInput(_)));
    }
}
