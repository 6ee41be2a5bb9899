use crate::ports::MatchNotifier;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tumpang_core::bus::{subject, Publisher};
use tumpang_core::events::{EventEnvelope, MatchEvent};
use uuid::Uuid;

/// Envelope ids derive from (event kind, match id), so a replayed publish
/// collapses in the broker's duplicate window.
fn envelope(kind: &str, event: &MatchEvent) -> EventEnvelope<MatchEvent> {
    let name = format!("{kind}:{}", event.match_id);
    EventEnvelope {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
        ts: Utc::now(),
        data: event.clone(),
    }
}

/// Bus-backed match notifications.
pub struct BusMatchNotifier {
    publisher: Publisher,
}

impl BusMatchNotifier {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl MatchNotifier for BusMatchNotifier {
    async fn match_found(&self, event: &MatchEvent) -> Result<()> {
        self.publisher
            .publish(subject::MATCH_FOUND, &envelope("match.found", event))
            .await
    }

    async fn match_accepted(&self, event: &MatchEvent) -> Result<()> {
        self.publisher
            .publish(subject::MATCH_ACCEPTED, &envelope("match.accepted", event))
            .await
    }

    async fn match_rejected(&self, event: &MatchEvent) -> Result<()> {
        self.publisher
            .publish(subject::MATCH_REJECTED, &envelope("match.rejected", event))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tumpang_core::domain::{Location, MatchStatus};

    #[test]
    fn envelope_ids_are_stable_per_kind_and_match() {
        let event = MatchEvent {
            match_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            driver_location: Location::new(-6.2, 106.8),
            passenger_location: Location::new(-6.21, 106.84),
            target_location: Location::new(-6.17, 106.86),
            status: MatchStatus::Pending,
        };
        assert_eq!(
            envelope("match.found", &event).id,
            envelope("match.found", &event).id
        );
        assert_ne!(
            envelope("match.found", &event).id,
            envelope("match.rejected", &event).id
        );
    }
}
