use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use blinds_common::{
    config::config_path,
    ports::{SensorSuite, StatusDisplay},
    sim::{ScriptedButton, SimPin, SimulatedBus},
    status::local_clock,
    transport::MqttTransport,
    BlindsResult, PanelController, PanelIo, RetryPolicy, RuntimeConfig, TelemetryPublisher,
};

/// BMP280 conversion time in normal mode with x4 pressure oversampling.
const CLIMATE_SETTLE: Duration = Duration::from_millis(20);

/// Stands in for the LCD: logs each frame that differs from the last one.
#[derive(Default)]
struct LogDisplay {
    shown: Vec<String>,
}

impl StatusDisplay for LogDisplay {
    fn render(&mut self, lines: &[String]) -> BlindsResult<()> {
        if self.shown != lines {
            info!("display: {}", lines.join(" | "));
            self.shown = lines.to_vec();
        }
        Ok(())
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = RuntimeConfig::load(&config_path()).await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err}");
        RuntimeConfig::default()
    });
    runtime
        .telemetry
        .apply_env_overrides(|key| std::env::var(key).ok());
    runtime.sanitize();

    info!(
        "toggle button on pin {}, setpoint button on pin {}, leds on pins {} and {}",
        runtime.pins.toggle_button,
        runtime.pins.setpoint_button,
        runtime.pins.button_led,
        runtime.pins.daylight_led
    );

    // Hardware integration point:
    // swap the simulated bus, scripted buttons and pins for the board HAL types.
    let sensor = SensorSuite::new(
        SimulatedBus::reference().with_addresses(&runtime.bus),
        &runtime.bus,
    )
    .with_delays(Duration::ZERO, CLIMATE_SETTLE);
    let io = PanelIo::new(
        ScriptedButton::new(30_000, vec![(5_000, 5_300)]),
        ScriptedButton::new(20_000, vec![(3_000, 3_800), (12_000, 14_500)]),
        SimPin::default(),
        SimPin::default(),
    );

    let transport = MqttTransport::start(&runtime.telemetry, "blinds-panel-rust");
    let publisher = TelemetryPublisher::new(
        transport,
        runtime.telemetry.setpoint.clone(),
        RetryPolicy::from_config(&runtime.telemetry),
    );
    info!("publishing setpoint to {}", publisher.topic());

    let utc_offset_hours = runtime.panel.utc_offset_hours;
    let mut controller = PanelController::new(
        sensor,
        io,
        LogDisplay::default(),
        publisher,
        runtime.panel.clone(),
    );

    let stop = tokio::select! {
        () = controller.run(move || local_clock(utc_offset_hours)) => Ok(()),
        signal = tokio::signal::ctrl_c() => signal,
    };

    info!("stopping panel");
    controller.shutdown().await;
    stop.context("failed to listen for shutdown signal")
}
