//! Node control loops. Both are polled on a fixed interval and gate their slow
//! work behind elapsed-time cadences, so a long actuation or a slow network call
//! only delays the next poll.

use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    actuator::BlindStateMachine,
    config::{BlindConfig, PanelConfig},
    error::{BlindsError, BlindsResult},
    leds::StatusLed,
    ports::{AmbientSensors, BlindDrive, ClimateSensor, Indicator, StatusDisplay},
    press::{PressClassifier, Setpoint, ToggleLatch},
    status::{daylight_led_on, display_lines, indicator_color},
    telemetry::{GoalSource, TelemetryPublisher, Transport},
    types::{
        ActuationCommand, AmbientReading, BlindState, ClimateReading, IndicatorColor, PressEvent,
    },
};

/// Fires once at least `interval_ms` has passed since it last fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval_ms: u64,
    last_fired_ms: Option<u64>,
}

impl Cadence {
    /// Due on the first check.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fired_ms: None,
        }
    }

    /// First due one full interval after `now_ms`.
    pub fn starting_at(interval_ms: u64, now_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fired_ms: Some(now_ms),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn due(&mut self, now_ms: u64) -> bool {
        let due = match self.last_fired_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        };
        if due {
            self.last_fired_ms = Some(now_ms);
        }
        due
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn poll_interval(interval_ms: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Outcome of one blind sensor cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub goal: f64,
    pub reading: AmbientReading,
    pub color: IndicatorColor,
    pub command: Option<ActuationCommand>,
    pub published: bool,
}

pub struct BlindController<S, D, L, T, G> {
    sensors: S,
    drive: D,
    indicator: L,
    publisher: TelemetryPublisher<T, G>,
    machine: BlindStateMachine,
    cadence: Cadence,
    config: BlindConfig,
    started: Instant,
}

impl<S, D, L, T, G> BlindController<S, D, L, T, G>
where
    S: AmbientSensors,
    D: BlindDrive,
    L: Indicator,
    T: Transport,
    G: GoalSource,
{
    pub fn new(
        sensors: S,
        drive: D,
        indicator: L,
        publisher: TelemetryPublisher<T, G>,
        config: BlindConfig,
    ) -> Self {
        Self {
            sensors,
            drive,
            indicator,
            publisher,
            machine: BlindStateMachine::with_steps(config.blind_steps),
            cadence: Cadence::starting_at(config.sensor_interval_ms, 0),
            config,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> BlindState {
        self.machine.state()
    }

    pub fn publisher(&self) -> &TelemetryPublisher<T, G> {
        &self.publisher
    }

    /// Runs a sensor cycle when one is due. Failures are logged and the cycle
    /// is skipped.
    pub async fn tick(&mut self, now_ms: u64) -> Option<CycleReport> {
        if !self.cadence.due(now_ms) {
            return None;
        }

        match self.sensor_cycle().await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!("blind sensor cycle skipped: {err}");
                None
            }
        }
    }

    /// Goal fetch, sensor read, indicator, decision, actuation, publish.
    pub async fn sensor_cycle(&mut self) -> BlindsResult<CycleReport> {
        let goal = self.publisher.fetch_goal().await;
        let reading = self.sensors.read_ambient().await?;
        info!(
            "lux {:.1}, temp {:.1}C, goal {goal}",
            reading.lux, reading.temperature_c
        );

        let color = indicator_color(
            reading.temperature_c,
            self.config.cold_threshold_c,
            self.config.warm_threshold_c,
        );
        if let Err(err) = self.indicator.show(color) {
            warn!("failed to set indicator {}: {err}", color.as_str());
        }

        let command = self.machine.decide(reading.lux, goal);
        if let Some(command) = command {
            info!(
                "{} blind ({} steps)",
                command.direction.as_str(),
                command.steps
            );
            if let Err(err) = self.drive.drive(command).await {
                warn!("blind actuation failed: {err}");
            }
        }

        let published = match self.publisher.publish(format!("{:.2}", reading.lux)).await {
            Ok(()) => true,
            Err(failure) => {
                warn!("lux not published: {failure}");
                false
            }
        };

        Ok(CycleReport {
            goal,
            reading,
            color,
            command,
            published,
        })
    }

    /// Polls until the future is dropped.
    pub async fn run(&mut self) {
        if let Err(failure) = self.publisher.connect().await {
            warn!("starting without telemetry link: {failure}");
        }

        info!(
            "blind loop started: poll {}ms, sensor cycle every {}ms",
            self.config.poll_interval_ms,
            self.cadence.interval_ms()
        );
        let mut poll = poll_interval(self.config.poll_interval_ms);
        loop {
            poll.tick().await;
            let now_ms = elapsed_ms(self.started);
            self.tick(now_ms).await;
        }
    }

    /// Indicator and coils off, transport closed.
    pub async fn shutdown(&mut self) {
        if let Err(err) = self.indicator.off() {
            warn!("failed to clear indicator: {err}");
        }
        if let Err(err) = self.drive.release() {
            warn!("failed to release stepper coils: {err}");
        }
        self.publisher.shutdown().await;
        info!("blind controller stopped");
    }
}

/// Buttons and LEDs on the panel board.
pub struct PanelIo<B, L: OutputPin> {
    pub toggle_button: B,
    pub setpoint_button: B,
    pub button_led: StatusLed<L>,
    pub daylight_led: StatusLed<L>,
}

impl<B, L: OutputPin> PanelIo<B, L> {
    pub fn new(toggle_button: B, setpoint_button: B, button_led: L, daylight_led: L) -> Self {
        Self {
            toggle_button,
            setpoint_button,
            button_led: StatusLed::new(button_led),
            daylight_led: StatusLed::new(daylight_led),
        }
    }
}

pub struct PanelController<S, B, L: OutputPin, D, T> {
    sensor: S,
    io: PanelIo<B, L>,
    display: D,
    publisher: TelemetryPublisher<T>,
    latch: ToggleLatch,
    classifier: PressClassifier,
    setpoint: Setpoint,
    refresh: Cadence,
    config: PanelConfig,
    started: Instant,
}

impl<S, B, L, D, T> PanelController<S, B, L, D, T>
where
    S: ClimateSensor,
    B: InputPin,
    L: OutputPin,
    D: StatusDisplay,
    T: Transport,
{
    pub fn new(
        sensor: S,
        io: PanelIo<B, L>,
        display: D,
        publisher: TelemetryPublisher<T>,
        config: PanelConfig,
    ) -> Self {
        Self {
            sensor,
            io,
            display,
            publisher,
            latch: ToggleLatch::default(),
            classifier: PressClassifier::new(config.hold_threshold_ms, config.press_magnitude),
            setpoint: Setpoint::new(config.initial_setpoint),
            refresh: Cadence::new(config.refresh_interval_ms),
            config,
            started: Instant::now(),
        }
    }

    pub fn setpoint(&self) -> i32 {
        self.setpoint.value()
    }

    pub fn publisher(&self) -> &TelemetryPublisher<T> {
        &self.publisher
    }

    /// A setpoint button already held at boot has no known press start, so its
    /// release is ignored.
    pub fn prime_inputs(&mut self) -> BlindsResult<()> {
        let held = self
            .io
            .setpoint_button
            .is_high()
            .map_err(|err| BlindsError::from_pin("setpoint button read", err))?;
        if held {
            debug!("setpoint button held at boot");
            self.classifier.assume_pressed();
        }
        Ok(())
    }

    /// Samples both buttons once. The toggle button flips its LED on every
    /// press; the setpoint button yields an event on release.
    pub fn poll_inputs(&mut self, now_ms: u64) -> BlindsResult<Option<PressEvent>> {
        let toggle = self
            .io
            .toggle_button
            .is_high()
            .map_err(|err| BlindsError::from_pin("toggle button read", err))?;
        if let Some(lit) = self.latch.on_sample(toggle) {
            self.io.button_led.set(lit)?;
            info!("button LED {}", if lit { "on" } else { "off" });
        }

        let held = self
            .io
            .setpoint_button
            .is_high()
            .map_err(|err| BlindsError::from_pin("setpoint button read", err))?;
        Ok(self.classifier.on_sample(held, now_ms))
    }

    /// Applies the event and publishes the new setpoint.
    pub async fn apply_press(&mut self, event: PressEvent) -> i32 {
        let value = self.setpoint.apply(&event);
        info!(
            "setpoint button held {}ms, setpoint now {value}",
            event.held_ms()
        );
        if let Err(failure) = self.publisher.publish(value).await {
            warn!("setpoint not published: {failure}");
        }
        value
    }

    /// Daylight LED from the local hour, then a fresh display from the sensor.
    pub async fn refresh(&mut self, hour: u32, minute: u32) -> BlindsResult<ClimateReading> {
        let daylight = daylight_led_on(
            hour,
            self.config.daylight_start_hour,
            self.config.daylight_end_hour,
        );
        if daylight != self.io.daylight_led.is_lit() {
            info!("daylight LED {}", if daylight { "on" } else { "off" });
        }
        self.io.daylight_led.set(daylight)?;

        let reading = self.sensor.read_climate().await?;
        debug!(
            "temp {:.2}C, pressure {:.2}hPa at {hour:02}:{minute:02}",
            reading.temperature_c, reading.pressure_hpa
        );
        self.display.render(&display_lines(&reading, hour, minute))?;
        Ok(reading)
    }

    /// One poll: refresh when due, then the buttons.
    pub async fn tick(&mut self, now_ms: u64, local_time: (u32, u32)) -> Option<PressEvent> {
        if self.refresh.due(now_ms) {
            let (hour, minute) = local_time;
            if let Err(err) = self.refresh(hour, minute).await {
                warn!("panel refresh skipped: {err}");
            }
        }

        match self.poll_inputs(now_ms) {
            Ok(Some(event)) => {
                self.apply_press(event).await;
                Some(event)
            }
            Ok(None) => None,
            Err(err) => {
                warn!("panel input poll failed: {err}");
                None
            }
        }
    }

    /// Polls until the future is dropped. `clock` yields the local `(hour, minute)`.
    pub async fn run(&mut self, mut clock: impl FnMut() -> (u32, u32)) {
        if let Err(err) = self.prime_inputs() {
            warn!("failed to sample buttons at boot: {err}");
        }
        if let Err(failure) = self.publisher.connect().await {
            warn!("starting without telemetry link: {failure}");
        }

        info!(
            "panel loop started: poll {}ms, refresh every {}ms, setpoint {}",
            self.config.poll_interval_ms,
            self.refresh.interval_ms(),
            self.setpoint.value()
        );
        let mut poll = poll_interval(self.config.poll_interval_ms);
        loop {
            poll.tick().await;
            let now_ms = elapsed_ms(self.started);
            self.tick(now_ms, clock()).await;
        }
    }

    /// LEDs off, transport closed.
    pub async fn shutdown(&mut self) {
        for led in [&mut self.io.button_led, &mut self.io.daylight_led] {
            if let Err(err) = led.set(false) {
                warn!("failed to clear panel LED: {err}");
            }
        }
        if let Err(err) = self.display.render(&[]) {
            warn!("failed to clear display: {err}");
        }
        self.publisher.shutdown().await;
        info!("panel controller stopped");
    }
}
