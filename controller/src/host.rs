use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use blinds_common::{
    config::config_path,
    leds::RgbIndicator,
    ports::SensorSuite,
    sim::{SimPin, SimulatedBus},
    stepper::StepperDriver,
    transport::{HttpGoalSource, MqttTransport},
    BlindController, RetryPolicy, RuntimeConfig, TelemetryPublisher,
};

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
        "stepper on pins {:?}, rgb on pins {:?}, bmp280 at {:#04x}, bh1750 at {:#04x}",
        runtime.pins.stepper,
        runtime.pins.rgb,
        runtime.bus.bmp280_address,
        runtime.bus.bh1750_address
    );

    // Hardware integration point:
    // swap the simulated bus and pins for the board HAL's I2c and OutputPin types.
    let sensors = SensorSuite::new(SimulatedBus::daylight(&runtime.bus), &runtime.bus).with_delays(
        Duration::from_millis(runtime.blind.lux_measurement_delay_ms),
        Duration::from_millis(runtime.blind.temperature_measurement_delay_ms),
    );
    let stepper = StepperDriver::new(
        [
            SimPin::default(),
            SimPin::default(),
            SimPin::default(),
            SimPin::default(),
        ],
        Duration::from_millis(runtime.blind.step_interval_ms),
    );
    let indicator = RgbIndicator::new(SimPin::default(), SimPin::default(), SimPin::default());

    let goal_source =
        HttpGoalSource::new(&runtime.telemetry).context("failed to build goal client")?;
    info!("reading lux goal from {}", goal_source.url());

    let transport = MqttTransport::start(&runtime.telemetry, "blinds-controller-rust");
    let publisher = TelemetryPublisher::new(
        transport,
        runtime.telemetry.lux.clone(),
        RetryPolicy::from_config(&runtime.telemetry),
    )
    .with_goal_source(goal_source, runtime.telemetry.fallback_goal);
    info!("publishing lux to {}", publisher.topic());

    let mut controller =
        BlindController::new(sensors, stepper, indicator, publisher, runtime.blind.clone());

    let stop = tokio::select! {
        () = controller.run() => Ok(()),
        signal = tokio::signal::ctrl_c() => signal,
    };

    info!("stopping blind controller");
    controller.shutdown().await;
    stop.context("failed to listen for shutdown signal")
}
