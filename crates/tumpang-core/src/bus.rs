use anyhow::{Context as _, Result};
use async_nats::jetstream::{self, consumer, stream, AckKind};
use async_nats::HeaderMap;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::events::EventEnvelope;

pub mod subject {
    pub const USER_BEACON: &str = "user.beacon";
    pub const USER_FINDER: &str = "user.finder";
    pub const MATCH_FOUND: &str = "match.found";
    pub const MATCH_REJECTED: &str = "match.rejected";
    pub const MATCH_ACCEPTED: &str = "match.accepted";
    pub const RIDE_PICKUP: &str = "ride.pickup";
    pub const RIDE_STARTED: &str = "ride.started";
    pub const RIDE_ARRIVED: &str = "ride.arrived";
    pub const RIDE_COMPLETED: &str = "ride.completed";
    pub const LOCATION_UPDATE: &str = "location.update";
    pub const LOCATION_AGGREGATE: &str = "location.aggregate";
}

pub const STREAM_USER: &str = "USER";
pub const STREAM_MATCH: &str = "MATCH";
pub const STREAM_RIDE: &str = "RIDE";
pub const STREAM_LOCATION: &str = "LOCATION";

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
const ACK_WAIT: Duration = Duration::from_secs(30);
const MAX_DELIVER: i64 = 5;
const DEDUP_WINDOW: Duration = Duration::from_secs(5 * 60);

struct StreamDef {
    name: &'static str,
    subjects: &'static [&'static str],
    retention: stream::RetentionPolicy,
    storage: stream::StorageType,
    max_age: Duration,
}

const STREAMS: &[StreamDef] = &[
    StreamDef {
        name: STREAM_USER,
        subjects: &[subject::USER_BEACON, subject::USER_FINDER],
        retention: stream::RetentionPolicy::Interest,
        storage: stream::StorageType::File,
        max_age: Duration::from_secs(24 * 3600),
    },
    StreamDef {
        name: STREAM_MATCH,
        subjects: &[
            subject::MATCH_FOUND,
            subject::MATCH_REJECTED,
            subject::MATCH_ACCEPTED,
        ],
        retention: stream::RetentionPolicy::Interest,
        storage: stream::StorageType::File,
        max_age: Duration::from_secs(3600),
    },
    StreamDef {
        name: STREAM_RIDE,
        subjects: &[
            subject::RIDE_PICKUP,
            subject::RIDE_STARTED,
            subject::RIDE_ARRIVED,
            subject::RIDE_COMPLETED,
        ],
        retention: stream::RetentionPolicy::Limits,
        storage: stream::StorageType::File,
        max_age: Duration::from_secs(7 * 24 * 3600),
    },
    StreamDef {
        name: STREAM_LOCATION,
        subjects: &[subject::LOCATION_UPDATE, subject::LOCATION_AGGREGATE],
        retention: stream::RetentionPolicy::Interest,
        storage: stream::StorageType::Memory,
        max_age: Duration::from_secs(2 * 3600),
    },
];

/// Connect to NATS and return a JetStream context. Startup fails (and the
/// process exits non-zero) if the server is unreachable.
pub async fn connect(url: &str) -> Result<jetstream::Context> {
    let client = async_nats::connect(url)
        .await
        .with_context(|| format!("failed to connect to NATS at {url}"))?;
    Ok(jetstream::new(client))
}

/// Idempotently create the four streams with their retention table.
/// Every service calls this on startup; the first one wins, later calls
/// are no-ops against the existing definitions.
pub async fn ensure_streams(js: &jetstream::Context) -> Result<()> {
    for def in STREAMS {
        js.get_or_create_stream(stream::Config {
            name: def.name.to_string(),
            subjects: def.subjects.iter().map(|s| s.to_string()).collect(),
            retention: def.retention,
            storage: def.storage,
            max_age: def.max_age,
            duplicate_window: DEDUP_WINDOW,
            ..Default::default()
        })
        .await
        .map_err(|err| anyhow::anyhow!("failed to ensure stream {}: {err}", def.name))?;
    }
    Ok(())
}

/// Envelope-aware JetStream publisher. Every publish carries the envelope
/// id as `Nats-Msg-Id` so the broker's duplicate window absorbs retries,
/// and is bounded by a 10 s deadline.
#[derive(Clone)]
pub struct Publisher {
    js: jetstream::Context,
}

impl Publisher {
    pub fn new(js: jetstream::Context) -> Self {
        Self { js }
    }

    pub async fn publish<T: Serialize>(
        &self,
        subject: &'static str,
        envelope: &EventEnvelope<T>,
    ) -> Result<()> {
        let payload =
            serde_json::to_vec(envelope).context("failed to serialize event envelope")?;
        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", envelope.id.to_string().as_str());

        let ack = tokio::time::timeout(
            PUBLISH_TIMEOUT,
            self.js.publish_with_headers(subject, headers, payload.into()),
        )
        .await
        .with_context(|| format!("publish to {subject} timed out"))?
        .map_err(|err| anyhow::anyhow!("publish to {subject} failed: {err}"))?;

        tokio::time::timeout(PUBLISH_TIMEOUT, ack)
            .await
            .with_context(|| format!("publish ack for {subject} timed out"))?
            .map_err(|err| anyhow::anyhow!("publish to {subject} was not acked: {err}"))?;
        Ok(())
    }
}

/// One durable pull subscription: which stream, which subject, and the
/// consumer group name. `deliver_new_only` skips pre-existing messages at
/// first creation (fan-out consumers that must not replay history).
#[derive(Debug, Clone, Copy)]
pub struct ConsumerSpec {
    pub stream: &'static str,
    pub durable: &'static str,
    pub subject: &'static str,
    pub deliver_new_only: bool,
}

async fn consume_once<H, Fut>(
    js: &jetstream::Context,
    spec: &ConsumerSpec,
    cancel: &CancellationToken,
    handler: &H,
) -> Result<()>
where
    H: Fn(Vec<u8>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let stream = js
        .get_stream(spec.stream)
        .await
        .map_err(|err| anyhow::anyhow!("failed to open stream {}: {err}", spec.stream))?;

    let deliver_policy = if spec.deliver_new_only {
        consumer::DeliverPolicy::New
    } else {
        consumer::DeliverPolicy::All
    };
    let consumer = stream
        .get_or_create_consumer(
            spec.durable,
            consumer::pull::Config {
                durable_name: Some(spec.durable.to_string()),
                filter_subject: spec.subject.to_string(),
                ack_policy: consumer::AckPolicy::Explicit,
                ack_wait: ACK_WAIT,
                max_deliver: MAX_DELIVER,
                deliver_policy,
                ..Default::default()
            },
        )
        .await
        .map_err(|err| anyhow::anyhow!("failed to create consumer {}: {err}", spec.durable))?;

    let mut messages = consumer
        .messages()
        .await
        .map_err(|err| anyhow::anyhow!("failed to subscribe {}: {err}", spec.durable))?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = messages.next() => {
                let message = match next {
                    Some(Ok(message)) => message,
                    Some(Err(err)) => anyhow::bail!("consumer {} stream error: {err}", spec.durable),
                    None => anyhow::bail!("consumer {} stream ended", spec.durable),
                };
                match handler(message.payload.to_vec()).await {
                    Ok(()) => {
                        if let Err(err) = message.ack().await {
                            tracing::warn!(durable = spec.durable, error = %err, "ack failed");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            durable = spec.durable,
                            subject = spec.subject,
                            error = format!("{err:#}"),
                            "handler failed; nacking for redelivery"
                        );
                        if let Err(err) = message.ack_with(AckKind::Nak(None)).await {
                            tracing::warn!(durable = spec.durable, error = %err, "nak failed");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Run a durable consumer until cancelled, reconnecting with a short
/// backoff on subscription failures. Handler errors nak the message and
/// rely on redelivery; they never tear the loop down.
pub async fn consume<H, Fut>(
    js: jetstream::Context,
    spec: ConsumerSpec,
    cancel: CancellationToken,
    handler: H,
) where
    H: Fn(Vec<u8>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(err) = consume_once(&js, &spec, &cancel, &handler).await {
            tracing::warn!(durable = spec.durable, error = format!("{err:#}"), "consumer loop failed");
            tokio::time::sleep(Duration::from_secs(2)).await;
        } else {
            break;
        }
    }
}

/// Decode a raw bus payload into a typed envelope.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<EventEnvelope<T>> {
    serde_json::from_slice(payload).context("malformed event envelope")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BeaconEvent, EventEnvelope};
    use crate::domain::Location;

    #[test]
    fn stream_table_covers_every_subject_once() {
        let mut seen = std::collections::HashSet::new();
        for def in STREAMS {
            for subject in def.subjects {
                assert!(seen.insert(*subject), "subject {subject} mapped twice");
            }
        }
        assert_eq!(seen.len(), 11);
    }

    #[test]
    fn decode_round_trips_publisher_payload() {
        let envelope = EventEnvelope::new(BeaconEvent {
            user_id: uuid::Uuid::new_v4(),
            is_active: true,
            location: Location::new(-6.2, 106.8),
        });
        let bytes = serde_json::to_vec(&envelope).unwrap();
        let decoded: EventEnvelope<BeaconEvent> = decode(&bytes).unwrap();
        assert_eq!(decoded.id, envelope.id);
        assert_eq!(decoded.data.is_active, envelope.data.is_active);
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert!(decode::<BeaconEvent>(b"{not json").is_err());
        assert!(decode::<BeaconEvent>(b"{\"id\":\"nope\"}").is_err());
    }
}
