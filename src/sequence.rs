use chrono::{DateTime, Utc};

use crate::models::HostAggregate;

/// Hosts are ordered by the change time of their first service problem, or
/// by their own change time if they have none. Most recent first; ties keep
/// their input order.
pub fn order(aggregates: impl IntoIterator<Item = HostAggregate>) -> Vec<HostAggregate> {
    let mut ordered: Vec<HostAggregate> = aggregates.into_iter().collect();
    ordered.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    ordered
}

// The first service is the most recent one only because services arrive
// sorted by hard state change, newest first.
pub fn sort_key(aggregate: &HostAggregate) -> Option<DateTime<Utc>> {
    match aggregate.services.first() {
        Some(service) => Some(service.change_time),
        None => aggregate.change_time,
    }
}
