use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A user known to the monitoring backend, keyed by its object name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub email: Option<String>,
}

pub type UserDirectory = HashMap<String, User>;

/// The `vars.notification.mail.users` branch of a host's custom variables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub mail: Option<MailNotification>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MailNotification {
    #[serde(default)]
    pub users: Option<Vec<String>>,
}

impl NotificationConfig {
    pub fn mail_users(&self) -> &[String] {
        self.mail
            .as_ref()
            .and_then(|mail| mail.users.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct RawHostProblem {
    pub host_id: String,
    pub display_name: String,
    pub address: String,
    pub is_problem: bool,
    pub is_handled: bool,
    pub last_hard_state_change: DateTime<Utc>,
    pub last_check_state: u8,
    pub last_check_output: Option<String>,
    pub recipients_config: Option<NotificationConfig>,
}

#[derive(Debug, Clone)]
pub struct RawServiceProblem {
    pub host_id: String,
    pub display_name: String,
    pub last_hard_state_change: DateTime<Utc>,
    pub last_check_state: u8,
    pub last_check_output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceAggregate {
    pub display_name: String,
    pub severity_state: u8,
    pub change_time: DateTime<Utc>,
    pub change_time_display: String,
    pub output: Option<String>,
}

/// One host worth reporting: either a problem itself or the owner of at
/// least one unhandled service problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostAggregate {
    pub host_id: String,
    pub display_name: String,
    pub address: String,
    pub severity_state: u8,
    #[serde(skip)]
    pub recipients: Option<NotificationConfig>,
    /// Only set when the host itself is in a problem state.
    pub change_time: Option<DateTime<Utc>>,
    pub change_time_display: String,
    pub output: Option<String>,
    pub services: Vec<ServiceAggregate>,
}

impl HostAggregate {
    pub fn is_host_problem(&self) -> bool {
        self.change_time.is_some()
    }
}

/// The backend state captured for a single run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub users: UserDirectory,
    /// Keyed by host name, in the order the backend returned them.
    pub hosts: IndexMap<String, RawHostProblem>,
    /// Unhandled, reachable service problems, most recent hard state change
    /// first.
    pub services: Vec<RawServiceProblem>,
}
