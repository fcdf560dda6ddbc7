//! Simulated peripherals for host builds and tests.
//!
//! `SimulatedBus` answers like a BMP280 and a BH1750 sharing one I2C bus.
//! `SimPin` is a shared digital line usable as input or output.
//! `ScriptedButton` replays a repeating press pattern.

use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use embedded_hal::{
    digital::{self, InputPin, OutputPin},
    i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation},
};
use tokio::time::Instant;

use crate::{
    bmp280::{REG_CALIBRATION, REG_CTRL_MEAS, REG_PRESS_MSB, REG_TEMP_MSB},
    compensation::CALIBRATION_BLOCK_LEN,
    config::BusConfig,
};

/// Datasheet example trimming words (T1..T3, P1..P9).
const REFERENCE_TRIMMING: [u16; 12] = [
    27504,
    26435,
    0xFC18, // -1000
    36477,
    0xD643, // -10685
    3024,
    2855,
    140,
    0xFFF9, // -7
    15500,
    0xC6F8, // -14600
    6000,
];

const REFERENCE_RAW_TEMPERATURE: u32 = 519_888;
const REFERENCE_RAW_PRESSURE: u32 = 415_148;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    NoDevice,
}

impl i2c::Error for SimError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NoDevice => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedBus {
    bmp280_address: u8,
    bh1750_address: u8,
    calibration: [u8; CALIBRATION_BLOCK_LEN],
    raw_temperature: u32,
    raw_pressure: u32,
    ctrl_meas: u8,
    bmp280_pointer: u8,
    lux_words: Vec<u16>,
    lux_cursor: usize,
    offline: bool,
    writes: Vec<(u8, Vec<u8>)>,
}

impl SimulatedBus {
    /// Datasheet reference device: 25.08 °C, ~1006.5 hPa, 100 lx.
    pub fn reference() -> Self {
        let mut calibration = [0_u8; CALIBRATION_BLOCK_LEN];
        for (index, word) in REFERENCE_TRIMMING.iter().enumerate() {
            calibration[index * 2..index * 2 + 2].copy_from_slice(&word.to_le_bytes());
        }

        let defaults = BusConfig::default();
        Self {
            bmp280_address: defaults.bmp280_address,
            bh1750_address: defaults.bh1750_address,
            calibration,
            raw_temperature: REFERENCE_RAW_TEMPERATURE,
            raw_pressure: REFERENCE_RAW_PRESSURE,
            ctrl_meas: 0,
            bmp280_pointer: 0,
            lux_words: vec![120],
            lux_cursor: 0,
            offline: false,
            writes: Vec::new(),
        }
    }

    /// A slow daylight swing between roughly 40 and 330 lx, one step per read.
    pub fn daylight(bus: &BusConfig) -> Self {
        let rising: Vec<u16> = (0..12).map(|step| 48 + step * 32).collect();
        let falling: Vec<u16> = rising.iter().rev().copied().collect();
        Self::reference()
            .with_addresses(bus)
            .with_lux_words([rising, falling].concat())
    }

    pub fn with_addresses(mut self, bus: &BusConfig) -> Self {
        self.bmp280_address = bus.bmp280_address;
        self.bh1750_address = bus.bh1750_address;
        self
    }

    /// Raw BH1750 words returned in turn, wrapping around.
    pub fn with_lux_words(mut self, words: Vec<u16>) -> Self {
        self.lux_words = if words.is_empty() { vec![0] } else { words };
        self.lux_cursor = 0;
        self
    }

    pub fn set_raw_temperature(&mut self, raw: u32) {
        self.raw_temperature = raw & 0xF_FFFF;
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Every write phase seen so far, as `(address, bytes)`.
    pub fn writes(&self) -> &[(u8, Vec<u8>)] {
        &self.writes
    }

    fn handle_write(&mut self, address: u8, bytes: &[u8]) {
        self.writes.push((address, bytes.to_vec()));
        if address != self.bmp280_address {
            return;
        }
        if let Some((&register, rest)) = bytes.split_first() {
            self.bmp280_pointer = register;
            if register == REG_CTRL_MEAS {
                if let Some(&value) = rest.first() {
                    self.ctrl_meas = value;
                }
            }
        }
    }

    fn handle_read(&mut self, address: u8, buffer: &mut [u8]) {
        if address == self.bh1750_address {
            let word = self.lux_words[self.lux_cursor % self.lux_words.len()];
            self.lux_cursor = self.lux_cursor.wrapping_add(1);
            for (byte, value) in buffer.iter_mut().zip(word.to_be_bytes()) {
                *byte = value;
            }
            return;
        }

        for byte in buffer.iter_mut() {
            *byte = self.bmp280_register(self.bmp280_pointer);
            self.bmp280_pointer = self.bmp280_pointer.wrapping_add(1);
        }
    }

    fn bmp280_register(&self, register: u8) -> u8 {
        let calibration_end = REG_CALIBRATION + CALIBRATION_BLOCK_LEN as u8;
        match register {
            r if (REG_CALIBRATION..calibration_end).contains(&r) => {
                self.calibration[usize::from(r - REG_CALIBRATION)]
            }
            REG_CTRL_MEAS => self.ctrl_meas,
            r if (REG_PRESS_MSB..REG_TEMP_MSB).contains(&r) => {
                split_20bit(self.raw_pressure)[usize::from(r - REG_PRESS_MSB)]
            }
            r if (REG_TEMP_MSB..REG_TEMP_MSB + 3).contains(&r) => {
                split_20bit(self.raw_temperature)[usize::from(r - REG_TEMP_MSB)]
            }
            _ => 0,
        }
    }
}

fn split_20bit(raw: u32) -> [u8; 3] {
    [
        (raw >> 12) as u8,
        ((raw >> 4) & 0xFF) as u8,
        ((raw & 0x0F) << 4) as u8,
    ]
}

impl i2c::ErrorType for SimulatedBus {
    type Error = SimError;
}

impl I2c for SimulatedBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.offline || (address != self.bmp280_address && address != self.bh1750_address) {
            return Err(SimError::NoDevice);
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.handle_write(address, bytes),
                Operation::Read(buffer) => self.handle_read(address, buffer),
            }
        }
        Ok(())
    }
}

/// Shared digital line. Clones observe the same level; every write is kept in
/// the history.
#[derive(Debug, Clone, Default)]
pub struct SimPin {
    level: Arc<AtomicBool>,
    history: Arc<Mutex<Vec<bool>>>,
}

impl SimPin {
    pub fn level(&self) -> bool {
        self.level.load(Ordering::Relaxed)
    }

    /// Drives the line from outside, as a button would.
    pub fn set(&self, high: bool) {
        self.level.store(high, Ordering::Relaxed);
    }

    pub fn history(&self) -> Vec<bool> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    fn write(&self, high: bool) {
        self.set(high);
        if let Ok(mut history) = self.history.lock() {
            history.push(high);
        }
    }
}

impl digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level())
    }
}

/// Button that is held during fixed windows of a repeating period.
#[derive(Debug, Clone)]
pub struct ScriptedButton {
    started: Instant,
    period_ms: u64,
    /// `(start_ms, end_ms)` offsets inside the period.
    holds: Vec<(u64, u64)>,
}

impl ScriptedButton {
    pub fn new(period_ms: u64, holds: Vec<(u64, u64)>) -> Self {
        Self {
            started: Instant::now(),
            period_ms: period_ms.max(1),
            holds,
        }
    }

    fn held_at(&self, elapsed_ms: u64) -> bool {
        let offset = elapsed_ms % self.period_ms;
        self.holds
            .iter()
            .any(|&(start, end)| (start..end).contains(&offset))
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl digital::ErrorType for ScriptedButton {
    type Error = Infallible;
}

impl InputPin for ScriptedButton {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.held_at(self.elapsed_ms()))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.held_at(self.elapsed_ms()))
    }
}
