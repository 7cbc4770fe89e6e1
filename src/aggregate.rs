use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;

use crate::error::IntegrityError;
use crate::models::{HostAggregate, RawHostProblem, RawServiceProblem, ServiceAggregate};

/// Groups service problems under their hosts.
///
/// Hosts that are unhandled problems are seeded first; services are then
/// folded in, in the order given, synthesizing an aggregate for hosts that
/// only own service problems. `now` fixes the time zone and the calendar day
/// used for `change_time_display`.
///
/// The result iterates in discovery order: problem hosts in the order of
/// `hosts`, then service-only hosts in the order their first service appears.
pub fn aggregate<Tz>(
    hosts: &IndexMap<String, RawHostProblem>,
    services: &[RawServiceProblem],
    now: &DateTime<Tz>,
) -> Result<IndexMap<String, HostAggregate>, IntegrityError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut aggregates: IndexMap<String, HostAggregate> = hosts
        .values()
        .filter(|host| host.is_problem && !host.is_handled)
        .map(|host| (host.host_id.clone(), problem_host(host, now)))
        .collect();

    for service in services {
        let host = hosts
            .get(&service.host_id)
            .ok_or_else(|| IntegrityError::OrphanService {
                service: service.display_name.clone(),
                host_id: service.host_id.clone(),
            })?;

        aggregates
            .entry(service.host_id.clone())
            .or_insert_with(|| default_host(host, now))
            .services
            .push(ServiceAggregate {
                display_name: service.display_name.clone(),
                severity_state: service.last_check_state,
                change_time: service.last_hard_state_change,
                change_time_display: display_time(&service.last_hard_state_change, now),
                output: service.last_check_output.clone(),
            });
    }

    Ok(aggregates)
}

fn problem_host<Tz>(host: &RawHostProblem, now: &DateTime<Tz>) -> HostAggregate
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    HostAggregate {
        change_time: Some(host.last_hard_state_change),
        output: host.last_check_output.clone(),
        ..default_host(host, now)
    }
}

// A host that only owns service problems: its own state is just the last
// check, with no change time or output of its own.
fn default_host<Tz>(host: &RawHostProblem, now: &DateTime<Tz>) -> HostAggregate
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    HostAggregate {
        host_id: host.host_id.clone(),
        display_name: host.display_name.clone(),
        address: host.address.clone(),
        severity_state: host.last_check_state,
        recipients: host.recipients_config.clone(),
        change_time: None,
        change_time_display: display_time(&host.last_hard_state_change, now),
        output: None,
        services: Vec::new(),
    }
}

/// `HH:MM` for timestamps on the same calendar day as `now`, `DD-Mon-YY`
/// otherwise, both in `now`'s time zone.
pub fn display_time<Tz>(timestamp: &DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let local = timestamp.with_timezone(&now.timezone());
    if local.date_naive() == now.date_naive() {
        local.format("%H:%M").to_string()
    } else {
        local.format("%d-%b-%y").to_string()
    }
}
