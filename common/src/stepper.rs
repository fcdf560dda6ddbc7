use std::time::Duration;

use embedded_hal::digital::OutputPin;
use tracing::debug;

use crate::{
    actuator::coil_patterns,
    error::{BlindsError, BlindsResult},
    types::ActuationCommand,
};

/// Four-coil unipolar stepper behind a ULN2003 driver.
///
/// Each pattern is held for at least `step_interval` before the next one is
/// applied. Coils are released after every command and when the driver drops.
pub struct StepperDriver<P: OutputPin> {
    coils: [P; 4],
    step_interval: Duration,
}

impl<P: OutputPin> StepperDriver<P> {
    pub fn new(coils: [P; 4], step_interval: Duration) -> Self {
        Self {
            coils,
            step_interval,
        }
    }

    /// Bit 3 drives IN1, bit 0 drives IN4.
    pub fn apply(&mut self, pattern: u8) -> BlindsResult<()> {
        for (index, coil) in self.coils.iter_mut().enumerate() {
            let energized = pattern & (0b1000 >> index) != 0;
            let result = if energized {
                coil.set_high()
            } else {
                coil.set_low()
            };
            result.map_err(|err| BlindsError::from_pin("stepper coil write", err))?;
        }
        Ok(())
    }

    pub fn release(&mut self) -> BlindsResult<()> {
        self.apply(0)
    }

    pub async fn run(&mut self, command: ActuationCommand) -> BlindsResult<()> {
        debug!(
            "stepping {} x{} at {:?}",
            command.direction.as_str(),
            command.steps,
            self.step_interval
        );

        let outcome = self.walk(command).await;
        let released = self.release();
        outcome.and(released)
    }

    async fn walk(&mut self, command: ActuationCommand) -> BlindsResult<()> {
        let patterns = coil_patterns(command.direction);
        for _ in 0..command.steps {
            for pattern in patterns {
                self.apply(pattern)?;
                tokio::time::sleep(self.step_interval).await;
            }
        }
        Ok(())
    }
}

impl<P: OutputPin> Drop for StepperDriver<P> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    use super::*;
    use crate::{sim::SimPin, types::Direction};

    fn coils() -> [SimPin; 4] {
        [
            SimPin::default(),
            SimPin::default(),
            SimPin::default(),
            SimPin::default(),
        ]
    }

    fn patterns_seen(coils: &[SimPin; 4]) -> Vec<u8> {
        let histories: Vec<Vec<bool>> = coils.iter().map(SimPin::history).collect();
        (0..histories[0].len())
            .map(|i| {
                histories
                    .iter()
                    .enumerate()
                    .fold(0_u8, |acc, (bit, history)| {
                        if history[i] {
                            acc | (0b1000 >> bit)
                        } else {
                            acc
                        }
                    })
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn open_walks_sequence_then_releases() {
        let pins = coils();
        let mut driver = StepperDriver::new(pins.clone(), Duration::from_millis(2));
        let started = Instant::now();

        driver
            .run(ActuationCommand {
                direction: Direction::Open,
                steps: 2,
            })
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(16));
        assert_eq!(
            patterns_seen(&pins),
            vec![0b1100, 0b0110, 0b0011, 0b1001, 0b1100, 0b0110, 0b0011, 0b1001, 0]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn close_walks_sequence_backwards() {
        let pins = coils();
        let mut driver = StepperDriver::new(pins.clone(), Duration::from_millis(2));

        driver
            .run(ActuationCommand {
                direction: Direction::Close,
                steps: 1,
            })
            .await
            .unwrap();

        assert_eq!(patterns_seen(&pins), vec![0b1001, 0b0011, 0b0110, 0b1100, 0]);
        assert!(pins.iter().all(|pin| !pin.level()));
    }

    #[test]
    fn drop_releases_coils() {
        let pins = coils();
        {
            let mut driver = StepperDriver::new(pins.clone(), Duration::from_millis(2));
            driver.apply(0b1111).unwrap();
            assert!(pins.iter().all(SimPin::level));
        }
        assert!(pins.iter().all(|pin| !pin.level()));
    }
}
