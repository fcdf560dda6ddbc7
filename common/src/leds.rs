use embedded_hal::digital::OutputPin;

use crate::{
    error::{BlindsError, BlindsResult},
    types::IndicatorColor,
};

/// Common-cathode RGB LED on three lines. Turns off when dropped.
pub struct RgbIndicator<P: OutputPin> {
    red: P,
    green: P,
    blue: P,
}

impl<P: OutputPin> RgbIndicator<P> {
    pub fn new(red: P, green: P, blue: P) -> Self {
        Self { red, green, blue }
    }

    pub fn show(&mut self, color: IndicatorColor) -> BlindsResult<()> {
        self.write(color.levels())
    }

    pub fn off(&mut self) -> BlindsResult<()> {
        self.write([false; 3])
    }

    fn write(&mut self, [red, green, blue]: [bool; 3]) -> BlindsResult<()> {
        set_level(&mut self.red, red)?;
        set_level(&mut self.green, green)?;
        set_level(&mut self.blue, blue)
    }
}

impl<P: OutputPin> Drop for RgbIndicator<P> {
    fn drop(&mut self) {
        let _ = self.off();
    }
}

/// Single indicator LED. Turns off when dropped.
pub struct StatusLed<P: OutputPin> {
    pin: P,
    lit: bool,
}

impl<P: OutputPin> StatusLed<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, lit: false }
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn set(&mut self, lit: bool) -> BlindsResult<()> {
        set_level(&mut self.pin, lit)?;
        self.lit = lit;
        Ok(())
    }
}

impl<P: OutputPin> Drop for StatusLed<P> {
    fn drop(&mut self) {
        let _ = self.set(false);
    }
}

fn set_level<P: OutputPin>(pin: &mut P, high: bool) -> BlindsResult<()> {
    let result = if high { pin.set_high() } else { pin.set_low() };
    result.map_err(|err| BlindsError::from_pin("led write", err))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sim::SimPin;

    #[test]
    fn colors_drive_one_line_each() {
        let (red, green, blue) = (SimPin::default(), SimPin::default(), SimPin::default());
        let mut indicator = RgbIndicator::new(red.clone(), green.clone(), blue.clone());

        indicator.show(IndicatorColor::Green).unwrap();
        assert_eq!([red.level(), green.level(), blue.level()], [false, true, false]);

        indicator.show(IndicatorColor::Red).unwrap();
        assert_eq!([red.level(), green.level(), blue.level()], [true, false, false]);

        drop(indicator);
        assert_eq!([red.level(), green.level(), blue.level()], [false, false, false]);
    }

    #[test]
    fn status_led_tracks_and_clears() {
        let pin = SimPin::default();
        let mut led = StatusLed::new(pin.clone());

        led.set(true).unwrap();
        assert!(led.is_lit());
        assert!(pin.level());

        drop(led);
        assert!(!pin.level());
    }
}
