//! Presentation rules for the indicator LEDs and the panel display.

use chrono::{FixedOffset, Offset, Timelike, Utc};

use crate::types::{ClimateReading, IndicatorColor};

/// Blue below `cold`, red above `warm`, green in between (both bounds green).
pub fn indicator_color(temperature_c: f64, cold: f64, warm: f64) -> IndicatorColor {
    if temperature_c < cold {
        IndicatorColor::Blue
    } else if temperature_c > warm {
        IndicatorColor::Red
    } else {
        IndicatorColor::Green
    }
}

/// True for `start <= hour < end`.
pub fn daylight_led_on(hour: u32, start: u32, end: u32) -> bool {
    (start..end).contains(&hour)
}

pub fn display_lines(reading: &ClimateReading, hour: u32, minute: u32) -> [String; 3] {
    [
        format!("Temp: {:.2}C", reading.temperature_c),
        format!("Press:{:.2}hPa", reading.pressure_hpa),
        format!("Time:{hour:02}:{minute:02}"),
    ]
}

/// Current `(hour, minute)` at a fixed offset from UTC.
pub fn local_clock(utc_offset_hours: i32) -> (u32, u32) {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3_600)
        .unwrap_or_else(|| Utc.fix());
    let now = Utc::now().with_timezone(&offset);
    (now.hour(), now.minute())
}
