use crate::engine::MatchEngine;
use async_nats::jetstream;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tumpang_core::bus::{self, ConsumerSpec};

/// Durable subscriptions feeding the engine: driver beacons and passenger
/// finders.
pub fn spawn(
    js: jetstream::Context,
    engine: Arc<MatchEngine>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let beacon_engine = engine.clone();
    let beacon = tokio::spawn(bus::consume(
        js.clone(),
        ConsumerSpec {
            stream: bus::STREAM_USER,
            durable: "match-engine-beacon",
            subject: bus::subject::USER_BEACON,
            deliver_new_only: false,
        },
        cancel.clone(),
        move |payload| {
            let engine = beacon_engine.clone();
            async move {
                let envelope = bus::decode(&payload)?;
                engine.handle_beacon(envelope.data).await
            }
        },
    ));

    let finder_engine = engine;
    let finder = tokio::spawn(bus::consume(
        js,
        ConsumerSpec {
            stream: bus::STREAM_USER,
            durable: "match-engine-finder",
            subject: bus::subject::USER_FINDER,
            deliver_new_only: false,
        },
        cancel,
        move |payload| {
            let engine = finder_engine.clone();
            async move {
                let envelope = bus::decode(&payload)?;
                engine.handle_finder(envelope.id, envelope.data).await
            }
        },
    ));

    vec![beacon, finder]
}
