use crate::lifecycle::RideLifecycle;
use async_nats::jetstream;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tumpang_core::bus::{self, ConsumerSpec};
use tumpang_core::events::{LocationAggregateEvent, MatchEvent};

/// Durable subscriptions feeding the lifecycle: accepted matches become
/// rides, per-km aggregates become ledger entries.
pub fn spawn(
    js: jetstream::Context,
    lifecycle: Arc<RideLifecycle>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let create_lifecycle = lifecycle.clone();
    let accepted = tokio::spawn(bus::consume(
        js.clone(),
        ConsumerSpec {
            stream: bus::STREAM_MATCH,
            durable: "rides-match-accepted",
            subject: bus::subject::MATCH_ACCEPTED,
            deliver_new_only: false,
        },
        cancel.clone(),
        move |payload| {
            let lifecycle = create_lifecycle.clone();
            async move {
                let envelope = bus::decode::<MatchEvent>(&payload)?;
                lifecycle.create_ride(&envelope.data).await?;
                Ok(())
            }
        },
    ));

    let billing_lifecycle = lifecycle;
    let aggregates = tokio::spawn(bus::consume(
        js,
        ConsumerSpec {
            stream: bus::STREAM_LOCATION,
            durable: "rides-location-aggregate",
            subject: bus::subject::LOCATION_AGGREGATE,
            deliver_new_only: false,
        },
        cancel,
        move |payload| {
            let lifecycle = billing_lifecycle.clone();
            async move {
                let envelope = bus::decode::<LocationAggregateEvent>(&payload)?;
                lifecycle
                    .process_billing(envelope.id, &envelope.data)
                    .await
            }
        },
    ));

    vec![accepted, aggregates]
}
