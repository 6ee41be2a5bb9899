use uuid::Uuid;

/// Active-ride index entries expire after 24 h; completion and
/// cancellation clear them explicitly before that.
pub const ACTIVE_RIDE_TTL_SECS: u64 = 24 * 3600;

/// Key/value-store slot recording that a user is engaged in a ride.
/// Written by the match engine at acceptance (check-and-take) and
/// overwritten with the ride id when the ride row is created.
pub fn active_ride_key(user_id: Uuid) -> String {
    format!("activeride:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_embeds_the_user_id() {
        let id = Uuid::new_v4();
        assert_eq!(active_ride_key(id), format!("activeride:{id}"));
    }
}
