use crate::types::PressEvent;

pub const DEFAULT_HOLD_THRESHOLD_MS: u64 = 2_000;
pub const DEFAULT_PRESS_MAGNITUDE: i32 = 10;
pub const DEFAULT_SETPOINT: i32 = 90;

/// Classifies button holds into setpoint gestures on release.
///
/// No debounce is applied here: the caller's polling interval is the filter.
/// A release observed before any press has been recorded (typically the first
/// sample after boot with the button already held) produces nothing.
#[derive(Debug, Clone)]
pub struct PressClassifier {
    hold_threshold_ms: u64,
    magnitude: i32,
    pressed: bool,
    press_start_ms: Option<u64>,
}

impl Default for PressClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD_THRESHOLD_MS, DEFAULT_PRESS_MAGNITUDE)
    }
}

impl PressClassifier {
    pub fn new(hold_threshold_ms: u64, magnitude: i32) -> Self {
        Self {
            hold_threshold_ms,
            magnitude,
            pressed: false,
            press_start_ms: None,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn on_sample(&mut self, level: bool, now_ms: u64) -> Option<PressEvent> {
        match (self.pressed, level) {
            (false, true) => {
                self.pressed = true;
                self.press_start_ms = Some(now_ms);
                None
            }
            (true, false) => {
                self.pressed = false;
                let start = self.press_start_ms.take()?;
                let held_ms = now_ms.saturating_sub(start);
                let magnitude = self.magnitude;
                if held_ms >= self.hold_threshold_ms {
                    Some(PressEvent::Decrement { magnitude, held_ms })
                } else {
                    Some(PressEvent::Increment { magnitude, held_ms })
                }
            }
            _ => None,
        }
    }

    /// Treat the line as already held without a known start, as after a boot
    /// with the button down.
    pub fn assume_pressed(&mut self) {
        self.pressed = true;
        self.press_start_ms = None;
    }
}

/// Flips an output on every rising edge of an input.
#[derive(Debug, Clone, Default)]
pub struct ToggleLatch {
    last_level: bool,
    output: bool,
}

impl ToggleLatch {
    pub fn output(&self) -> bool {
        self.output
    }

    /// Returns the new output level when a rising edge toggled it.
    pub fn on_sample(&mut self, level: bool) -> Option<bool> {
        let rising = level && !self.last_level;
        self.last_level = level;
        if rising {
            self.output = !self.output;
            Some(self.output)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setpoint(i32);

impl Default for Setpoint {
    fn default() -> Self {
        Self(DEFAULT_SETPOINT)
    }
}

impl Setpoint {
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    pub fn value(self) -> i32 {
        self.0
    }

    pub fn apply(&mut self, event: &PressEvent) -> i32 {
        self.0 = self.0.saturating_add(event.signed_delta());
        self.0
    }
}
