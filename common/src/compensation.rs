//! Raw register words to physical units for the BMP280 and BH1750.
//!
//! Everything here is a pure function of its inputs. The floating point forms
//! follow the double-precision variant of the BMP280 datasheet, evaluated in the
//! same order so results are reproducible bit for bit.

use crate::error::{BlindsError, BlindsResult};

pub const CALIBRATION_BLOCK_LEN: usize = 24;

const LUX_DIVISOR: f64 = 1.2;

/// Temperature trimming words `dig_T1..dig_T3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationWords {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
}

/// Pressure trimming words `dig_P1..dig_P9`, stored after the temperature words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureCalibration {
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
}

/// 20-bit ADC output, unitless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTemperature(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPressure(pub u32);

pub fn decode_calibration(block: &[u8]) -> BlindsResult<CalibrationWords> {
    check_len(block, CALIBRATION_BLOCK_LEN, "calibration block")?;
    Ok(CalibrationWords {
        t1: unsigned_word(block, 0),
        t2: signed_word(block, 2),
        t3: signed_word(block, 4),
    })
}

pub fn decode_pressure_calibration(block: &[u8]) -> BlindsResult<PressureCalibration> {
    check_len(block, CALIBRATION_BLOCK_LEN, "calibration block")?;
    Ok(PressureCalibration {
        p1: unsigned_word(block, 6),
        p2: signed_word(block, 8),
        p3: signed_word(block, 10),
        p4: signed_word(block, 12),
        p5: signed_word(block, 14),
        p6: signed_word(block, 16),
        p7: signed_word(block, 18),
        p8: signed_word(block, 20),
        p9: signed_word(block, 22),
    })
}

pub fn assemble_raw_temperature(msb: u8, lsb: u8, xlsb: u8) -> RawTemperature {
    RawTemperature(assemble_20bit(msb, lsb, xlsb))
}

pub fn assemble_raw_pressure(msb: u8, lsb: u8, xlsb: u8) -> RawPressure {
    RawPressure(assemble_20bit(msb, lsb, xlsb))
}

/// Intermediate `t_fine` term shared by the temperature and pressure formulas.
pub fn fine_temperature(raw: RawTemperature, cal: &CalibrationWords) -> f64 {
    let raw = f64::from(raw.0);
    let t1 = f64::from(cal.t1);
    let var1 = (raw / 16384.0 - t1 / 1024.0) * f64::from(cal.t2);
    let delta = raw / 131072.0 - t1 / 8192.0;
    let var2 = delta * delta * f64::from(cal.t3);
    var1 + var2
}

/// Degrees Celsius.
pub fn compensate_temperature(raw: RawTemperature, cal: &CalibrationWords) -> f64 {
    fine_temperature(raw, cal) / 5120.0
}

/// Hectopascals. Returns 0.0 when the calibration would divide by zero.
pub fn compensate_pressure(raw: RawPressure, t_fine: f64, cal: &PressureCalibration) -> f64 {
    let mut var1 = t_fine / 2.0 - 64000.0;
    let mut var2 = var1 * var1 * f64::from(cal.p6) / 32768.0;
    var2 += var1 * f64::from(cal.p5) * 2.0;
    var2 = var2 / 4.0 + f64::from(cal.p4) * 65536.0;
    var1 = (f64::from(cal.p3) * var1 * var1 / 524288.0 + f64::from(cal.p2) * var1) / 524288.0;
    var1 = (1.0 + var1 / 32768.0) * f64::from(cal.p1);
    if var1 == 0.0 {
        return 0.0;
    }

    let mut pascals = 1048576.0 - f64::from(raw.0);
    pascals = (pascals - var2 / 4096.0) * 6250.0 / var1;
    var1 = f64::from(cal.p9) * pascals * pascals / 2147483648.0;
    var2 = pascals * f64::from(cal.p8) / 32768.0;
    pascals += (var1 + var2 + f64::from(cal.p7)) / 16.0;
    pascals / 100.0
}

/// Lux from the BH1750 high-resolution measurement word.
pub fn lux_from_raw(raw_word: u16) -> f64 {
    f64::from(raw_word) / LUX_DIVISOR
}

pub(crate) fn check_len(bytes: &[u8], expected: usize, what: &str) -> BlindsResult<()> {
    if bytes.len() != expected {
        return Err(BlindsError::invalid_input(format!(
            "{what} must be {expected} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

fn unsigned_word(block: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([block[offset], block[offset + 1]])
}

fn signed_word(block: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([block[offset], block[offset + 1]])
}

fn assemble_20bit(msb: u8, lsb: u8, xlsb: u8) -> u32 {
    (u32::from(msb) << 12) | (u32::from(lsb) << 4) | (u32::from(xlsb) >> 4)
}
