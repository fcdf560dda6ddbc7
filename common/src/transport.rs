use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    config::TelemetryConfig,
    error::{BlindsError, BlindsResult},
    telemetry::{GoalSource, Transport},
    topics::last_value_url,
};

/// MQTT publisher backed by rumqttc. The event loop runs on its own task and
/// reports broker link state through a watch channel.
pub struct MqttTransport {
    client: AsyncClient,
    link: watch::Receiver<bool>,
    poller: JoinHandle<()>,
    connect_timeout: Duration,
}

impl MqttTransport {
    pub fn start(config: &TelemetryConfig, default_client_id: &str) -> Self {
        let client_id = if config.mqtt_client_id.is_empty() {
            default_client_id.to_string()
        } else {
            config.mqtt_client_id.clone()
        };

        let mut options = MqttOptions::new(client_id, config.mqtt_host.clone(), config.mqtt_port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if !config.mqtt_user.is_empty() {
            options.set_credentials(config.mqtt_user.clone(), config.mqtt_pass.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, 32);
        let (link_tx, link) = watch::channel(false);
        let poller = tokio::spawn(poll_events(eventloop, link_tx));

        Self {
            client,
            link,
            poller,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.link.borrow()
    }
}

impl Transport for MqttTransport {
    async fn connect(&mut self) -> BlindsResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        match tokio::time::timeout(self.connect_timeout, self.link.wait_for(|up| *up)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(BlindsError::transport("mqtt event loop stopped")),
            Err(_) => Err(BlindsError::transport(format!(
                "no broker connection within {}ms",
                self.connect_timeout.as_millis()
            ))),
        }
    }

    async fn send(&mut self, topic: &str, payload: &str) -> BlindsResult<()> {
        if !self.is_connected() {
            return Err(BlindsError::transport("mqtt broker not connected"));
        }

        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|err| BlindsError::transport(format!("mqtt publish failed: {err}")))
    }

    /// Sends DISCONNECT and waits for the event loop to flush it. A link that
    /// is already down is left alone, so no stale request reaches the next
    /// session.
    async fn close(&mut self) {
        if !self.is_connected() {
            return;
        }
        if let Err(err) = self.client.disconnect().await {
            debug!("mqtt disconnect request failed: {err}");
            return;
        }

        match tokio::time::timeout(self.connect_timeout, self.link.wait_for(|up| !*up)).await {
            Ok(Ok(_)) => debug!("mqtt disconnect flushed"),
            Ok(Err(_)) => debug!("mqtt event loop stopped before disconnect"),
            Err(_) => warn!(
                "mqtt disconnect not flushed within {}ms",
                self.connect_timeout.as_millis()
            ),
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

async fn poll_events(mut eventloop: EventLoop, link: watch::Sender<bool>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("mqtt connected");
                link.send_replace(true);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("mqtt disconnect sent");
                link.send_replace(false);
            }
            Ok(_) => {}
            Err(err) => {
                link.send_replace(false);
                warn!("mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Fetches the goal field's last value over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGoalSource {
    client: reqwest::Client,
    url: String,
}

impl HttpGoalSource {
    pub fn new(config: &TelemetryConfig) -> BlindsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .build()
            .map_err(|err| BlindsError::transport(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            url: last_value_url(&config.api_base_url, &config.goal),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl GoalSource for HttpGoalSource {
    async fn fetch_last(&self) -> BlindsResult<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| BlindsError::transport(format!("goal request failed: {err}")))?;

        let response = response
            .error_for_status()
            .map_err(|err| BlindsError::transport(format!("goal request rejected: {err}")))?;

        response
            .text()
            .await
            .map_err(|err| BlindsError::transport(format!("failed to read goal body: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    use super::*;
    use crate::{
        config::ChannelField,
        telemetry::{RetryPolicy, TelemetryPublisher},
    };

    fn config() -> TelemetryConfig {
        TelemetryConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            fetch_timeout_ms: 500,
            goal: ChannelField {
                channel_id: "7".to_string(),
                field: 8,
                api_key: Some("READ".to_string()),
            },
            ..TelemetryConfig::default()
        }
    }

    #[test]
    fn goal_source_targets_last_value_endpoint() {
        let source = HttpGoalSource::new(&config()).unwrap();
        assert_eq!(
            source.url(),
            "http://127.0.0.1:9/channels/7/fields/8/last.txt?api_key=READ"
        );
    }

    #[tokio::test]
    async fn unreachable_goal_endpoint_uses_fallback() {
        let config = config();
        let source = HttpGoalSource::new(&config).unwrap();
        assert!(source.fetch_last().await.is_err());

        let publisher = TelemetryPublisher::new(
            crate::telemetry::tests::ScriptedTransport::default(),
            config.lux.clone(),
            RetryPolicy::from_config(&config),
        )
        .with_goal_source(source, config.fallback_goal);
        assert_eq!(publisher.fetch_goal().await, 100.0);
    }

    #[tokio::test]
    async fn send_before_connack_is_rejected() {
        let config = TelemetryConfig {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 9,
            connect_timeout_ms: 100,
            ..TelemetryConfig::default()
        };
        let mut transport = MqttTransport::start(&config, "blinds-test");

        assert!(!transport.is_connected());
        assert!(transport.send("channels/1/publish", "field8=1").await.is_err());
        assert!(transport.connect().await.is_err());
    }

    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const DISCONNECT: [u8; 2] = [0xe0, 0x00];

    fn broker_config(listener: &TcpListener) -> TelemetryConfig {
        TelemetryConfig {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: listener.local_addr().unwrap().port(),
            connect_timeout_ms: 5_000,
            ..TelemetryConfig::default()
        }
    }

    /// Reads the client's CONNECT and accepts the session.
    async fn accept_session(listener: &TcpListener) -> TcpStream {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut connect = [0u8; 256];
        let read = socket.read(&mut connect).await.unwrap();
        assert!(read > 0);
        assert_eq!(connect[0], 0x10);
        socket.write_all(&CONNACK).await.unwrap();
        socket
    }

    /// Everything the client sends until it hangs up.
    async fn drain(socket: &mut TcpStream) -> Vec<u8> {
        let mut received = Vec::new();
        let mut chunk = [0u8; 256];
        while let Ok(Ok(read)) =
            tokio::time::timeout(Duration::from_secs(5), socket.read(&mut chunk)).await
        {
            if read == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..read]);
        }
        received
    }

    #[tokio::test]
    async fn close_flushes_disconnect_before_returning() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut transport = MqttTransport::start(&broker_config(&listener), "blinds-test");
        let mut session = accept_session(&listener).await;

        transport.connect().await.unwrap();
        transport.close().await;
        assert!(!transport.is_connected());
        drop(transport);

        assert_eq!(drain(&mut session).await, DISCONNECT.to_vec());
    }

    #[tokio::test]
    async fn publish_after_outage_goes_out_on_the_new_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = broker_config(&listener);
        let policy = RetryPolicy {
            backoff: Duration::from_millis(100),
            max_attempts: Some(5),
        };
        let field = ChannelField {
            channel_id: "42".to_string(),
            field: 8,
            api_key: None,
        };
        let mut publisher =
            TelemetryPublisher::new(MqttTransport::start(&config, "blinds-test"), field, policy);

        let first = accept_session(&listener).await;
        publisher.connect().await.unwrap();
        drop(first);
        while publisher.transport().is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let second = tokio::spawn(async move {
            let mut session = accept_session(&listener).await;
            drain(&mut session).await
        });
        publisher.publish(42).await.unwrap();
        publisher.shutdown().await;
        drop(publisher);

        let received = second.await.unwrap();
        assert_eq!(received[0], 0x30);
        assert!(received.windows(9).any(|window| window == b"field8=42"));
        assert!(received.ends_with(&DISCONNECT));
        assert_eq!(
            received.windows(2).filter(|window| *window == DISCONNECT).count(),
            1
        );
    }
}
