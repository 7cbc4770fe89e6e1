use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::IcingaConfig;
use crate::error::SourceError;
use crate::models::{Snapshot, User};
use crate::source::{self, ApiObject, ApiResults, HostAttrs, ProblemSource, ServiceAttrs};

const USER_ATTRS: &[&str] = &["email"];

const HOST_ATTRS: &[&str] = &[
    "address",
    "display_name",
    "handled",
    "last_check_result",
    "last_hard_state_change",
    "problem",
    "vars",
];

const SERVICE_ATTRS: &[&str] = &[
    "display_name",
    "host_name",
    "last_check_result",
    "last_hard_state_change",
];

pub const OPEN_SERVICE_PROBLEMS: &str =
    "service.problem == true && service.handled == false && service.last_reachable == true";

/// Client for the Icinga 2 REST API object queries.
pub struct IcingaClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl IcingaClient {
    pub fn new(config: &IcingaConfig) -> Result<Self, SourceError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(SourceError::InvalidUrl(config.url.clone()));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|source| SourceError::Request {
                endpoint: base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn endpoint(&self, object_type: &str) -> String {
        format!("{}/v1/objects/{}", self.base_url, object_type)
    }

    /// Queries are sent as POST with a method override so filters can travel
    /// in the body.
    async fn list<T: DeserializeOwned>(
        &self,
        object_type: &str,
        attrs: &[&str],
        filter: Option<&str>,
    ) -> Result<Vec<ApiObject<T>>, SourceError> {
        let endpoint = self.endpoint(object_type);
        let mut body = json!({ "attrs": attrs });
        if let Some(filter) = filter {
            body["filter"] = json!(filter);
        }

        tracing::debug!(%endpoint, ?filter, "Querying Icinga API.");
        let response = self
            .client
            .post(&endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .header("X-HTTP-Method-Override", "GET")
            .json(&body)
            .send()
            .await
            .map_err(|source| SourceError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status { endpoint, status });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| SourceError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;
        let results: ApiResults<T> = serde_json::from_slice(&bytes)?;
        Ok(results.results)
    }
}

#[async_trait]
impl ProblemSource for IcingaClient {
    async fn fetch(&self) -> Result<Snapshot, SourceError> {
        let users = self.list::<User>("users", USER_ATTRS, None).await?;
        let hosts = self.list::<HostAttrs>("hosts", HOST_ATTRS, None).await?;
        let services = self
            .list::<ServiceAttrs>("services", SERVICE_ATTRS, Some(OPEN_SERVICE_PROBLEMS))
            .await?;

        tracing::info!(
            users = users.len(),
            hosts = hosts.len(),
            services = services.len(),
            "Fetched objects from Icinga."
        );

        Ok(Snapshot {
            users: source::decode_users(users),
            hosts: source::decode_hosts(hosts)?,
            services: source::decode_services(services)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> IcingaConfig {
        IcingaConfig {
            url: url.to_string(),
            username: "root".to_string(),
            password: "icinga".to_string(),
            accept_invalid_certs: true,
            timeout_secs: 5,
        }
    }

    #[test]
    fn builds_object_endpoints() {
        let client = IcingaClient::new(&config("https://icinga.example.com:5665/")).unwrap();
        assert_eq!(
            client.endpoint("services"),
            "https://icinga.example.com:5665/v1/objects/services"
        );
    }

    #[test]
    fn rejects_urls_without_scheme() {
        let result = IcingaClient::new(&config("icinga.example.com:5665"));
        assert!(matches!(result, Err(SourceError::InvalidUrl(_))));
    }

    #[test]
    fn host_attrs_include_notification_vars() {
        assert!(HOST_ATTRS.contains(&"vars"));
        assert!(OPEN_SERVICE_PROBLEMS.contains("service.last_reachable == true"));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_request_error() {
        let client = IcingaClient::new(&config("http://127.0.0.1:1")).unwrap();
        let result = client.fetch().await;
        assert!(matches!(result, Err(SourceError::Request { .. })));
    }
}
