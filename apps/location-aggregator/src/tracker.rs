use anyhow::{Context, Result};
use redis::AsyncCommands;
use std::collections::HashMap;
use tumpang_core::bus::{subject, Publisher};
use tumpang_core::domain::Location;
use tumpang_core::events::{EventEnvelope, LocationAggregateEvent, LocationUpdateEvent};
use tumpang_core::geo::haversine_km;
use tumpang_core::keys::active_ride_key;
use uuid::Uuid;

const TRACKER_TTL_SECS: i64 = 24 * 3600;
const SEGMENT_KM: f64 = 1.0;

/// Rolling per-ride state: the last point seen, the distance accumulated
/// since the last emitted segment, and how many segments have been
/// emitted so far. The segment counter keys deterministic aggregate ids,
/// so reprocessing a redelivered update can only re-emit an aggregate the
/// rides service has already recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackState {
    pub latitude: f64,
    pub longitude: f64,
    pub accumulated_km: f64,
    pub segments_emitted: u64,
}

/// Advance the rolling state with a new point. Returns the new state and
/// the number of whole-kilometer segments that became due.
pub fn advance(previous: Option<&TrackState>, point: &Location) -> (TrackState, u64) {
    let Some(prev) = previous else {
        return (
            TrackState {
                latitude: point.latitude,
                longitude: point.longitude,
                accumulated_km: 0.0,
                segments_emitted: 0,
            },
            0,
        );
    };

    let prev_point = Location {
        latitude: prev.latitude,
        longitude: prev.longitude,
        ts: point.ts,
    };
    let mut accumulated = prev.accumulated_km + haversine_km(&prev_point, point);
    let mut due = 0u64;
    while accumulated >= SEGMENT_KM {
        accumulated -= SEGMENT_KM;
        due += 1;
    }

    (
        TrackState {
            latitude: point.latitude,
            longitude: point.longitude,
            accumulated_km: accumulated,
            segments_emitted: prev.segments_emitted + due,
        },
        due,
    )
}

/// Deterministic aggregate id for a ride's n-th kilometer. Redeliveries
/// recompute the same id, which the rides ledger dedups.
pub fn segment_id(ride_id: Uuid, segment_no: u64) -> Uuid {
    let name = format!("ride:{ride_id}:segment:{segment_no}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

pub fn segment_cost(distance_km: f64, rate_per_km: i64) -> i64 {
    (distance_km * rate_per_km as f64).round() as i64
}

pub struct Tracker {
    redis: redis::aio::ConnectionManager,
    publisher: Publisher,
    rate_per_km: i64,
}

impl Tracker {
    pub fn new(
        redis: redis::aio::ConnectionManager,
        publisher: Publisher,
        rate_per_km: i64,
    ) -> Self {
        Self {
            redis,
            publisher,
            rate_per_km,
        }
    }

    /// Handle one `location.update`. Updates for users without an active
    /// ride carry nothing to bill and are skipped.
    pub async fn handle_update(&self, envelope: EventEnvelope<LocationUpdateEvent>) -> Result<()> {
        let update = envelope.data;
        let mut conn = self.redis.clone();

        let active: Option<String> = conn
            .get(active_ride_key(update.user_id))
            .await
            .context("active ride lookup failed")?;
        let Some(ride_id) = active.as_deref().and_then(|v| Uuid::parse_str(v).ok()) else {
            tracing::debug!(user_id = %update.user_id, "location update without active ride; skipping");
            return Ok(());
        };

        let key = tracker_key(ride_id);
        let stored: HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .context("tracker state read failed")?;
        let previous = parse_state(&stored);

        let (next, due) = advance(previous.as_ref(), &update.location);

        // Publish before persisting: a failure here leaves the state
        // unadvanced, and the redelivered update recomputes the same
        // segment ids.
        let first_segment = next.segments_emitted - due;
        for offset in 0..due {
            let segment_no = first_segment + offset + 1;
            let aggregate = EventEnvelope {
                id: segment_id(ride_id, segment_no),
                ts: chrono::Utc::now(),
                data: LocationAggregateEvent {
                    ride_id,
                    distance_km: SEGMENT_KM,
                    cost: segment_cost(SEGMENT_KM, self.rate_per_km),
                },
            };
            self.publisher
                .publish(subject::LOCATION_AGGREGATE, &aggregate)
                .await?;
            tracing::info!(
                ride_id = %ride_id,
                segment = segment_no,
                cost = aggregate.data.cost,
                "emitted billing aggregate"
            );
        }

        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    ("lat", next.latitude.to_string()),
                    ("lng", next.longitude.to_string()),
                    ("accum_km", next.accumulated_km.to_string()),
                    ("segments", next.segments_emitted.to_string()),
                ],
            )
            .await
            .context("tracker state write failed")?;
        let _: () = conn
            .expire(&key, TRACKER_TTL_SECS)
            .await
            .context("tracker state expire failed")?;

        Ok(())
    }
}

fn tracker_key(ride_id: Uuid) -> String {
    format!("tracker:{ride_id}")
}

fn parse_state(fields: &HashMap<String, String>) -> Option<TrackState> {
    let latitude = fields.get("lat")?.parse().ok()?;
    let longitude = fields.get("lng")?.parse().ok()?;
    let accumulated_km = fields.get("accum_km")?.parse().ok()?;
    let segments_emitted = fields.get("segments")?.parse().ok()?;
    Some(TrackState {
        latitude,
        longitude,
        accumulated_km,
        segments_emitted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lng: f64) -> Location {
        Location::new(lat, lng)
    }

    #[test]
    fn first_point_initializes_without_emitting() {
        let (state, due) = advance(None, &loc(-6.2088, 106.8456));
        assert_eq!(due, 0);
        assert_eq!(state.accumulated_km, 0.0);
        assert_eq!(state.segments_emitted, 0);
    }

    #[test]
    fn short_hop_accumulates_without_emitting() {
        let (state, _) = advance(None, &loc(-6.2088, 106.8456));
        // Roughly 550 m north.
        let (state, due) = advance(Some(&state), &loc(-6.2038, 106.8456));
        assert_eq!(due, 0);
        assert!(state.accumulated_km > 0.5 && state.accumulated_km < 0.6);
    }

    #[test]
    fn crossing_a_kilometer_emits_once_and_carries_remainder() {
        let start = TrackState {
            latitude: -6.2088,
            longitude: 106.8456,
            accumulated_km: 0.8,
            segments_emitted: 2,
        };
        // ~550 m hop on top of 0.8 km accumulated.
        let (state, due) = advance(Some(&start), &loc(-6.2038, 106.8456));
        assert_eq!(due, 1);
        assert_eq!(state.segments_emitted, 3);
        assert!(state.accumulated_km > 0.3 && state.accumulated_km < 0.4);
    }

    #[test]
    fn long_jump_emits_one_segment_per_kilometer() {
        let start = TrackState {
            latitude: -6.2088,
            longitude: 106.8456,
            accumulated_km: 0.0,
            segments_emitted: 0,
        };
        // ~2.5 km hop (0.0225 degrees of latitude).
        let (state, due) = advance(Some(&start), &loc(-6.1863, 106.8456));
        assert_eq!(due, 2);
        assert_eq!(state.segments_emitted, 2);
        assert!(state.accumulated_km < 1.0);
    }

    #[test]
    fn repeated_point_adds_nothing() {
        let start = TrackState {
            latitude: -6.2088,
            longitude: 106.8456,
            accumulated_km: 0.4,
            segments_emitted: 1,
        };
        let (state, due) = advance(Some(&start), &loc(-6.2088, 106.8456));
        assert_eq!(due, 0);
        assert_eq!(state.accumulated_km, 0.4);
        assert_eq!(state.segments_emitted, 1);
    }

    #[test]
    fn segment_ids_are_deterministic_per_ride_and_index() {
        let ride = Uuid::new_v4();
        assert_eq!(segment_id(ride, 3), segment_id(ride, 3));
        assert_ne!(segment_id(ride, 3), segment_id(ride, 4));
        assert_ne!(segment_id(ride, 3), segment_id(Uuid::new_v4(), 3));
    }

    #[test]
    fn segment_cost_rounds_to_integer_idr() {
        assert_eq!(segment_cost(1.0, 3000), 3000);
        assert_eq!(segment_cost(0.5, 3333), 1667);
    }
}
