//! Backend snapshot sources and the decoding of Icinga 2 API objects.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::SourceError;
use crate::models::{NotificationConfig, RawHostProblem, RawServiceProblem, Snapshot, User};

/// Supplies the users, hosts and service problems for one run.
#[async_trait]
pub trait ProblemSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, SourceError>;
}

/// An object as returned by `/v1/objects/<type>`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiObject<T> {
    pub name: String,
    pub attrs: T,
}

#[derive(Debug, Deserialize)]
pub struct ApiResults<T> {
    pub results: Vec<ApiObject<T>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckResult {
    #[serde(default)]
    pub state: f64,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostAttrs {
    #[serde(default)]
    pub address: String,
    pub display_name: String,
    #[serde(default)]
    pub handled: bool,
    #[serde(default)]
    pub last_check_result: Option<CheckResult>,
    pub last_hard_state_change: f64,
    #[serde(default)]
    pub problem: bool,
    #[serde(default)]
    pub vars: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAttrs {
    pub display_name: String,
    pub host_name: String,
    #[serde(default)]
    pub last_check_result: Option<CheckResult>,
    pub last_hard_state_change: f64,
    // Only present in snapshot files; the API filters on these server side.
    #[serde(default = "default_true")]
    pub problem: bool,
    #[serde(default)]
    pub handled: bool,
    #[serde(default = "default_true")]
    pub last_reachable: bool,
}

fn default_true() -> bool {
    true
}

impl ServiceAttrs {
    pub fn is_open_problem(&self) -> bool {
        self.problem && !self.handled && self.last_reachable
    }
}

/// Icinga reports fractional unix seconds. `object` names the owner in the
/// error for values chrono cannot represent.
pub fn timestamp(object: &str, seconds: f64) -> Result<DateTime<Utc>, SourceError> {
    let out_of_range = || SourceError::Timestamp {
        object: object.to_string(),
        seconds,
    };
    if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
        return Err(out_of_range());
    }

    let whole = seconds.trunc() as i64;
    let nanos = (seconds.fract() * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole, nanos).ok_or_else(out_of_range)
}

fn state(check: Option<&CheckResult>) -> u8 {
    check.map(|c| c.state.clamp(0.0, 3.0) as u8).unwrap_or(0)
}

fn output(check: Option<&CheckResult>) -> Option<String> {
    check.and_then(|c| c.output.clone())
}

/// Pulls `vars.notification` out of a host's custom variables. A shape we
/// cannot read is treated like no notification config at all.
fn notification_config(host: &str, vars: Option<&serde_json::Value>) -> Option<NotificationConfig> {
    let notification = vars?.get("notification")?;
    if notification.is_null() {
        return None;
    }

    match serde_json::from_value(notification.clone()) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!(host, error = %err, "Ignoring malformed notification vars.");
            None
        }
    }
}

pub fn decode_users(objects: Vec<ApiObject<User>>) -> crate::models::UserDirectory {
    objects
        .into_iter()
        .map(|object| (object.name, object.attrs))
        .collect()
}

/// Keys hosts by name, keeping the order the backend returned them in.
pub fn decode_hosts(
    objects: Vec<ApiObject<HostAttrs>>,
) -> Result<IndexMap<String, RawHostProblem>, SourceError> {
    objects
        .into_iter()
        .map(|object| {
            let attrs = object.attrs;
            let check = attrs.last_check_result.as_ref();
            let host = RawHostProblem {
                recipients_config: notification_config(&object.name, attrs.vars.as_ref()),
                last_hard_state_change: timestamp(&object.name, attrs.last_hard_state_change)?,
                host_id: object.name.clone(),
                display_name: attrs.display_name,
                address: attrs.address,
                is_problem: attrs.problem,
                is_handled: attrs.handled,
                last_check_state: state(check),
                last_check_output: output(check),
            };
            Ok::<_, SourceError>((object.name, host))
        })
        .collect()
}

/// Keeps open problems only and orders them by hard state change, newest
/// first. Equal timestamps keep the order the backend returned.
pub fn decode_services(
    objects: Vec<ApiObject<ServiceAttrs>>,
) -> Result<Vec<RawServiceProblem>, SourceError> {
    let mut services = objects
        .into_iter()
        .filter(|object| object.attrs.is_open_problem())
        .map(|object| {
            let attrs = object.attrs;
            let check = attrs.last_check_result.as_ref();
            Ok::<_, SourceError>(RawServiceProblem {
                last_hard_state_change: timestamp(&object.name, attrs.last_hard_state_change)?,
                last_check_state: state(check),
                last_check_output: output(check),
                host_id: attrs.host_name,
                display_name: attrs.display_name,
            })
        })
        .collect::<Result<Vec<_>, SourceError>>()?;

    services.sort_by(|a, b| b.last_hard_state_change.cmp(&a.last_hard_state_change));
    Ok(services)
}

/// A JSON capture of the three API result lists.
#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    users: Vec<ApiObject<User>>,
    #[serde(default)]
    hosts: Vec<ApiObject<HostAttrs>>,
    #[serde(default)]
    services: Vec<ApiObject<ServiceAttrs>>,
}

/// Reads backend state from a file instead of a live API.
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(content: &str) -> Result<Snapshot, SourceError> {
        let document: SnapshotDocument = serde_json::from_str(content)?;
        Ok(Snapshot {
            users: decode_users(document.users),
            hosts: decode_hosts(document.hosts)?,
            services: decode_services(document.services)?,
        })
    }
}

#[async_trait]
impl ProblemSource for SnapshotFile {
    async fn fetch(&self) -> Result<Snapshot, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let snapshot = Self::parse(&content)?;
        tracing::debug!(path = %self.path.display(), "Loaded snapshot file.");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const SNAPSHOT: &str = r#"{
      "users": [
        {"name": "ops", "attrs": {"email": "ops@example.com, oncall@example.com"}},
        {"name": "nomail", "attrs": {"email": null}}
      ],
      "hosts": [
        {"name": "db-01", "attrs": {
          "address": "10.0.0.5", "display_name": "Database 1", "handled": false,
          "problem": true, "last_hard_state_change": 1710331200.25,
          "last_check_result": {"state": 2.0, "output": "CRITICAL - Host Unreachable"},
          "vars": {"os": "Linux", "notification": {"mail": {"users": ["ops"]}}}
        }},
        {"name": "web-01", "attrs": {
          "address": "10.0.0.7", "display_name": "Web 1", "handled": false,
          "problem": false, "last_hard_state_change": 1710000000,
          "last_check_result": null, "vars": null
        }},
        {"name": "web-02", "attrs": {
          "address": "10.0.0.8", "display_name": "Web 2",
          "last_hard_state_change": 1710000000,
          "vars": {"notification": {"mail": "broken"}}
        }}
      ],
      "services": [
        {"name": "web-01!http", "attrs": {"display_name": "http", "host_name": "web-01",
          "last_hard_state_change": 1710000100, "last_check_result": {"state": 1.0, "output": "slow"}}},
        {"name": "web-01!disk", "attrs": {"display_name": "disk", "host_name": "web-01",
          "last_hard_state_change": 1710000300, "last_check_result": {"state": 2.0, "output": "full"}}},
        {"name": "web-01!ssh", "attrs": {"display_name": "ssh", "host_name": "web-01",
          "last_hard_state_change": 1710000900, "handled": true}},
        {"name": "db-01!ping", "attrs": {"display_name": "ping", "host_name": "db-01",
          "last_hard_state_change": 1710000200, "last_reachable": false}}
      ]
    }"#;

    #[test]
    fn parses_users_hosts_and_services() {
        let snapshot = SnapshotFile::parse(SNAPSHOT).unwrap();

        assert_eq!(snapshot.users.len(), 2);
        assert_eq!(
            snapshot.users["ops"].email.as_deref(),
            Some("ops@example.com, oncall@example.com")
        );
        assert_eq!(snapshot.users["nomail"].email, None);

        let db = &snapshot.hosts["db-01"];
        assert!(db.is_problem);
        assert_eq!(db.last_check_state, 2);
        assert_eq!(db.last_check_output.as_deref(), Some("CRITICAL - Host Unreachable"));
        assert_eq!(db.recipients_config.as_ref().unwrap().mail_users(), ["ops"]);
        assert_eq!(db.last_hard_state_change.timestamp(), 1710331200);
        assert_eq!(db.last_hard_state_change.timestamp_subsec_millis(), 250);

        let web = &snapshot.hosts["web-01"];
        assert_eq!(web.last_check_state, 0);
        assert_eq!(web.last_check_output, None);
        assert!(web.recipients_config.is_none());

        assert!(snapshot.hosts["web-02"].recipients_config.is_none());
    }

    #[test]
    fn services_are_filtered_and_newest_first() {
        let snapshot = SnapshotFile::parse(SNAPSHOT).unwrap();
        let names: Vec<&str> = snapshot
            .services
            .iter()
            .map(|s| s.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["disk", "http"]);
        assert_eq!(snapshot.services[0].last_check_state, 2);
        assert_eq!(snapshot.services[1].last_check_output.as_deref(), Some("slow"));
    }

    #[test]
    fn equal_change_times_keep_backend_order() {
        let objects = ["first", "second", "third"]
            .into_iter()
            .map(|name| ApiObject {
                name: format!("h!{name}"),
                attrs: ServiceAttrs {
                    display_name: name.to_string(),
                    host_name: "h".to_string(),
                    last_check_result: None,
                    last_hard_state_change: 1700000000.0,
                    problem: true,
                    handled: false,
                    last_reachable: true,
                },
            })
            .collect();

        let names: Vec<String> = decode_services(objects)
            .unwrap()
            .into_iter()
            .map(|s| s.display_name)
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn converts_fractional_timestamps() {
        assert_eq!(
            timestamp("h", 1710331200.5).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(500)
        );
    }

    #[test]
    fn out_of_range_timestamps_are_rejected() {
        for seconds in [1e300, f64::NAN, f64::INFINITY, -1e18] {
            let err = timestamp("db-01", seconds).unwrap_err();
            assert!(matches!(err, SourceError::Timestamp { ref object, .. } if object == "db-01"));
        }
    }

    #[test]
    fn snapshot_with_unrepresentable_change_time_fails_to_parse() {
        let content = r#"{"hosts": [{"name": "db-01", "attrs": {
            "display_name": "Database 1", "last_hard_state_change": 1e300}}]}"#;
        let err = SnapshotFile::parse(content).unwrap_err();
        assert!(matches!(err, SourceError::Timestamp { ref object, .. } if object == "db-01"));
    }

    #[test]
    fn hosts_keep_backend_order() {
        let snapshot = SnapshotFile::parse(SNAPSHOT).unwrap();
        let names: Vec<&str> = snapshot.hosts.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["db-01", "web-01", "web-02"]);
    }

    #[tokio::test]
    async fn reads_snapshot_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let snapshot = SnapshotFile::new(&path).fetch().await.unwrap();
        assert_eq!(snapshot.hosts.len(), 3);
        assert_eq!(snapshot.services.len(), 2);
    }

    #[tokio::test]
    async fn missing_snapshot_is_an_io_error() {
        let result = SnapshotFile::new("/nonexistent/snapshot.json").fetch().await;
        assert!(matches!(result, Err(SourceError::Io(_))));
    }
}
