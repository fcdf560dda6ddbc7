//! Outbound publish with reconnect/backoff and inbound goal fetch with fallback.

use std::{fmt::Display, future::Future, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    config::{ChannelField, TelemetryConfig},
    error::{BlindsError, BlindsResult, PublishFailure},
    topics::{field_payload, publish_topic},
};

pub const DEFAULT_FALLBACK_GOAL: f64 = 100.0;

/// Outbound message channel, typically an MQTT client.
pub trait Transport {
    fn connect(&mut self) -> impl Future<Output = BlindsResult<()>>;

    fn send(&mut self, topic: &str, payload: &str) -> impl Future<Output = BlindsResult<()>>;

    fn close(&mut self) -> impl Future<Output = ()>;
}

/// Reads the last reported value of the goal field as raw text.
pub trait GoalSource {
    fn fetch_last(&self) -> impl Future<Output = BlindsResult<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            backoff: Duration::from_millis(config.retry_backoff_ms),
            max_attempts: config.max_publish_attempts,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

pub struct TelemetryPublisher<T, G = ()> {
    transport: T,
    goal_source: G,
    field: ChannelField,
    topic: String,
    policy: RetryPolicy,
    fallback_goal: f64,
}

impl<T: Transport> TelemetryPublisher<T> {
    pub fn new(transport: T, field: ChannelField, policy: RetryPolicy) -> Self {
        Self {
            transport,
            goal_source: (),
            topic: publish_topic(&field),
            field,
            policy,
            fallback_goal: DEFAULT_FALLBACK_GOAL,
        }
    }

    pub fn with_goal_source<G: GoalSource>(
        self,
        goal_source: G,
        fallback_goal: f64,
    ) -> TelemetryPublisher<T, G> {
        TelemetryPublisher {
            transport: self.transport,
            goal_source,
            field: self.field,
            topic: self.topic,
            policy: self.policy,
            fallback_goal,
        }
    }
}

impl<T: Transport, G> TelemetryPublisher<T, G> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Establishes the initial connection, waiting the backoff between attempts.
    pub async fn connect(&mut self) -> Result<(), PublishFailure> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.transport.connect().await {
                Ok(()) => {
                    info!("telemetry connected after {attempts} attempt(s)");
                    return Ok(());
                }
                Err(err) => {
                    warn!("telemetry connect attempt {attempts} failed: {err}");
                    if self.policy.exhausted(attempts) {
                        return Err(PublishFailure {
                            attempts,
                            last: err,
                        });
                    }
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }

    /// Sends `value` to the configured field. A failed send closes the
    /// transport, waits the backoff, reconnects and sends again until it goes
    /// through or the attempt limit is reached.
    pub async fn publish(&mut self, value: impl Display) -> Result<(), PublishFailure> {
        let payload = field_payload(&self.field, value);
        let mut attempts = 1;
        let mut outcome = self.transport.send(&self.topic, &payload).await;

        loop {
            let err = match outcome {
                Ok(()) => {
                    info!("published `{payload}` to {}", self.topic);
                    return Ok(());
                }
                Err(err) => err,
            };

            warn!("publish attempt {attempts} to {} failed: {err}", self.topic);
            if self.policy.exhausted(attempts) {
                return Err(PublishFailure {
                    attempts,
                    last: err,
                });
            }

            self.transport.close().await;
            tokio::time::sleep(self.policy.backoff).await;
            attempts += 1;

            debug!("reconnecting telemetry transport");
            outcome = match self.transport.connect().await {
                Ok(()) => self.transport.send(&self.topic, &payload).await,
                Err(err) => Err(err),
            };
        }
    }

    pub async fn shutdown(&mut self) {
        self.transport.close().await;
        info!("telemetry transport closed");
    }
}

impl<T, G: GoalSource> TelemetryPublisher<T, G> {
    /// Last reported goal, or the fallback when it cannot be fetched or parsed.
    pub async fn fetch_goal(&self) -> f64 {
        let parsed = match self.goal_source.fetch_last().await {
            Ok(body) => body.trim().parse::<f64>().map_err(|err| {
                BlindsError::transport(format!("goal body {body:?} is not numeric: {err}"))
            }),
            Err(err) => Err(err),
        };

        match parsed {
            Ok(goal) => goal,
            Err(err) => {
                warn!("failed to fetch goal, using {}: {err}", self.fallback_goal);
                self.fallback_goal
            }
        }
    }
}
