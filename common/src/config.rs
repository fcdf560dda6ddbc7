use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    actuator::DEFAULT_BLIND_STEPS,
    error::{BlindsError, BlindsResult},
    ports::{DEFAULT_LUX_DELAY_MS, DEFAULT_TEMPERATURE_DELAY_MS},
    press::{DEFAULT_HOLD_THRESHOLD_MS, DEFAULT_PRESS_MAGNITUDE, DEFAULT_SETPOINT},
};

/// Environment variable naming the runtime config file.
pub const CONFIG_PATH_ENV: &str = "BLINDS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./.blinds/runtime.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlindConfig {
    pub poll_interval_ms: u64,
    pub sensor_interval_ms: u64,
    pub blind_steps: u32,
    pub step_interval_ms: u64,
    pub cold_threshold_c: f64,
    pub warm_threshold_c: f64,
    pub lux_measurement_delay_ms: u64,
    pub temperature_measurement_delay_ms: u64,
}

impl Default for BlindConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            sensor_interval_ms: 20_000,
            blind_steps: DEFAULT_BLIND_STEPS,
            step_interval_ms: 2,
            cold_threshold_c: 18.0,
            warm_threshold_c: 22.0,
            lux_measurement_delay_ms: DEFAULT_LUX_DELAY_MS,
            temperature_measurement_delay_ms: DEFAULT_TEMPERATURE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub poll_interval_ms: u64,
    pub refresh_interval_ms: u64,
    pub hold_threshold_ms: u64,
    pub press_magnitude: i32,
    pub initial_setpoint: i32,
    pub utc_offset_hours: i32,
    pub daylight_start_hour: u32,
    pub daylight_end_hour: u32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            refresh_interval_ms: 1_000,
            hold_threshold_ms: DEFAULT_HOLD_THRESHOLD_MS,
            press_magnitude: DEFAULT_PRESS_MAGNITUDE,
            initial_setpoint: DEFAULT_SETPOINT,
            utc_offset_hours: 1,
            daylight_start_hour: 7,
            daylight_end_hour: 19,
        }
    }
}

/// One ThingSpeak field on one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelField {
    pub channel_id: String,
    pub field: u8,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub keep_alive_secs: u64,
    /// Where the blind node publishes its lux readings.
    pub lux: ChannelField,
    /// Where the panel node publishes its setpoint.
    pub setpoint: ChannelField,
    /// Where the blind node reads its goal from.
    pub goal: ChannelField,
    pub api_base_url: String,
    pub fetch_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    /// `None` retries a failed publish until it goes through.
    #[serde(default)]
    pub max_publish_attempts: Option<u32>,
    pub fallback_goal: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "mqtt3.thingspeak.com".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: String::new(),
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            keep_alive_secs: 60,
            lux: ChannelField {
                channel_id: "2792379".to_string(),
                field: 8,
                api_key: None,
            },
            setpoint: ChannelField {
                channel_id: "2792381".to_string(),
                field: 8,
                api_key: None,
            },
            goal: ChannelField {
                channel_id: "2792381".to_string(),
                field: 8,
                api_key: None,
            },
            api_base_url: "https://api.thingspeak.com".to_string(),
            fetch_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
            retry_backoff_ms: 5_000,
            max_publish_attempts: None,
            fallback_goal: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusConfig {
    pub bmp280_address: u8,
    pub bh1750_address: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bmp280_address: 0x76,
            bh1750_address: 0x23,
        }
    }
}

/// Board wiring. Only reported at startup by the host builds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinConfig {
    pub stepper: [u8; 4],
    pub rgb: [u8; 3],
    pub toggle_button: u8,
    pub setpoint_button: u8,
    pub button_led: u8,
    pub daylight_led: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            stepper: [10, 11, 12, 14],
            rgb: [6, 13, 9],
            toggle_button: 14,
            setpoint_button: 12,
            button_led: 13,
            daylight_led: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub blind: BlindConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub pins: PinConfig,
}

/// `BLINDS_CONFIG` when set, otherwise the default location.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl RuntimeConfig {
    /// Reads the config file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> BlindsResult<Self> {
        match tokio::fs::read(path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|err| {
                BlindsError::config(format!("invalid runtime config in {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(BlindsError::config(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    pub fn sanitize(&mut self) {
        self.blind.sanitize();
        self.panel.sanitize();
        self.telemetry.sanitize();
    }
}

impl BlindConfig {
    pub fn sanitize(&mut self) {
        self.poll_interval_ms = self.poll_interval_ms.clamp(10, 1_000);
        self.sensor_interval_ms = self.sensor_interval_ms.max(self.poll_interval_ms);
        self.blind_steps = self.blind_steps.clamp(1, 4_096);
        self.step_interval_ms = self.step_interval_ms.max(1);
        if self.cold_threshold_c > self.warm_threshold_c {
            std::mem::swap(&mut self.cold_threshold_c, &mut self.warm_threshold_c);
        }
    }
}

impl PanelConfig {
    pub fn sanitize(&mut self) {
        self.poll_interval_ms = self.poll_interval_ms.clamp(10, 1_000);
        self.refresh_interval_ms = self.refresh_interval_ms.max(self.poll_interval_ms);
        self.hold_threshold_ms = self.hold_threshold_ms.max(self.poll_interval_ms);
        self.utc_offset_hours = self.utc_offset_hours.clamp(-12, 14);
        self.daylight_start_hour = self.daylight_start_hour.min(23);
        self.daylight_end_hour = self.daylight_end_hour.min(24);
    }
}

impl TelemetryConfig {
    /// Broker settings from `MQTT_HOST`, `MQTT_PORT`, `MQTT_USER` and
    /// `MQTT_PASS` take precedence over the file. An unparsable port is ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt_host = host;
        }
        if let Some(port) = lookup("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
            self.mqtt_port = port;
        }
        if let Some(user) = lookup("MQTT_USER") {
            self.mqtt_user = user;
        }
        if let Some(pass) = lookup("MQTT_PASS") {
            self.mqtt_pass = pass;
        }
    }

    pub fn sanitize(&mut self) {
        self.fetch_timeout_ms = self.fetch_timeout_ms.max(100);
        self.connect_timeout_ms = self.connect_timeout_ms.max(100);
        self.keep_alive_secs = self.keep_alive_secs.clamp(5, 3_600);
        if self.max_publish_attempts == Some(0) {
            self.max_publish_attempts = Some(1);
        }
        if !self.fallback_goal.is_finite() {
            self.fallback_goal = 100.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_rig_constants() {
        let config = RuntimeConfig::default();
        assert_eq!(config.blind.sensor_interval_ms, 20_000);
        assert_eq!(config.blind.blind_steps, 512);
        assert_eq!(config.panel.hold_threshold_ms, 2_000);
        assert_eq!(config.telemetry.retry_backoff_ms, 5_000);
        assert_eq!(config.telemetry.fetch_timeout_ms, 5_000);
        assert_eq!(config.telemetry.fallback_goal, 100.0);
        assert_eq!(config.bus, BusConfig::default());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let raw = r#"{ "telemetry": {
            "mqtt_host": "broker.local", "mqtt_port": 1884, "mqtt_client_id": "blind",
            "mqtt_user": "u", "mqtt_pass": "p", "keep_alive_secs": 30,
            "lux": { "channel_id": "1", "field": 1 },
            "goal": { "channel_id": "2", "field": 8, "api_key": "READ" },
            "api_base_url": "http://localhost", "fetch_timeout_ms": 1000,
            "connect_timeout_ms": 1000, "retry_backoff_ms": 10, "fallback_goal": 50.0
        } }"#;
        let config: RuntimeConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.telemetry.mqtt_host, "broker.local");
        assert_eq!(config.telemetry.max_publish_attempts, None);
        assert_eq!(config.telemetry.goal.api_key.as_deref(), Some("READ"));
        assert_eq!(config.telemetry.setpoint.channel_id, "2792381");
        assert_eq!(config.blind.blind_steps, 512);
    }

    #[test]
    fn partial_node_sections_keep_the_rest_of_the_file() {
        let raw = r#"{
            "blind": { "blind_steps": 256 },
            "panel": { "utc_offset_hours": -5 },
            "telemetry": { "mqtt_user": "rig", "mqtt_pass": "secret" }
        }"#;
        let config: RuntimeConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.blind.blind_steps, 256);
        assert_eq!(config.blind.sensor_interval_ms, 20_000);
        assert_eq!(config.panel.utc_offset_hours, -5);
        assert_eq!(config.panel.hold_threshold_ms, 2_000);
        assert_eq!(config.telemetry.mqtt_user, "rig");
        assert_eq!(config.telemetry.mqtt_pass, "secret");
    }

    #[tokio::test]
    async fn load_reads_file_and_defaults_when_missing() {
        let dir = std::env::temp_dir().join(format!("blinds-config-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let missing = RuntimeConfig::load(&dir.join("absent.json")).await.unwrap();
        assert_eq!(missing.blind.blind_steps, 512);

        let present = dir.join("runtime.json");
        tokio::fs::write(&present, r#"{ "blind": { "blind_steps": 64 } }"#)
            .await
            .unwrap();
        assert_eq!(RuntimeConfig::load(&present).await.unwrap().blind.blind_steps, 64);

        let broken = dir.join("broken.json");
        tokio::fs::write(&broken, "{ not json").await.unwrap();
        let err = RuntimeConfig::load(&broken).await.unwrap_err();
        assert!(matches!(err, BlindsError::Config(_)));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn sanitize_repairs_out_of_range_values() {
        let mut config = RuntimeConfig::default();
        config.blind.cold_threshold_c = 25.0;
        config.blind.warm_threshold_c = 15.0;
        config.blind.step_interval_ms = 0;
        config.telemetry.max_publish_attempts = Some(0);
        config.telemetry.fallback_goal = f64::NAN;
        config.panel.utc_offset_hours = 40;

        config.sanitize();

        assert_eq!(config.blind.cold_threshold_c, 15.0);
        assert_eq!(config.blind.warm_threshold_c, 25.0);
        assert_eq!(config.blind.step_interval_ms, 1);
        assert_eq!(config.telemetry.max_publish_attempts, Some(1));
        assert_eq!(config.telemetry.fallback_goal, 100.0);
        assert_eq!(config.panel.utc_offset_hours, 14);
    }

    #[test]
    fn env_overrides_replace_broker_settings() {
        let mut telemetry = TelemetryConfig::default();
        telemetry.apply_env_overrides(|key| match key {
            "MQTT_HOST" => Some("10.0.0.2".to_string()),
            "MQTT_PORT" => Some("not-a-port".to_string()),
            "MQTT_USER" => Some("blind".to_string()),
            _ => None,
        });

        assert_eq!(telemetry.mqtt_host, "10.0.0.2");
        assert_eq!(telemetry.mqtt_port, 1883);
        assert_eq!(telemetry.mqtt_user, "blind");
        assert_eq!(telemetry.mqtt_pass, "");
    }
}
