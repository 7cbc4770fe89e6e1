//! HTML rendering of a recipient's digest with minijinja.

use minijinja::{context, Environment, UndefinedBehavior};

use crate::config::ColorConfig;
use crate::error::DeliveryError;
use crate::models::HostAggregate;

const TEMPLATE_NAME: &str = "email.html";
const DEFAULT_TEMPLATE: &str = include_str!("../templates/email.html");

/// Host state labels by ordinal.
pub const HOST_STATES: [&str; 4] = ["UP", "UP", "DOWN", "DOWN"];

/// Service state labels by ordinal.
pub const SERVICE_STATES: [&str; 4] = ["OK", "WARNING", "CRITICAL", "UNKNOWN"];

pub struct DigestRenderer {
    env: Environment<'static>,
    colors: ColorConfig,
    subject: String,
}

impl DigestRenderer {
    /// Uses the built-in template.
    pub fn new(colors: ColorConfig, subject: &str) -> Result<Self, minijinja::Error> {
        Self::with_template(DEFAULT_TEMPLATE.to_string(), colors, subject)
    }

    pub fn with_template(
        source: String,
        colors: ColorConfig,
        subject: &str,
    ) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        // The `.html` name turns on autoescaping.
        env.add_template_owned(TEMPLATE_NAME, source)?;

        Ok(Self {
            env,
            colors,
            subject: subject.to_string(),
        })
    }

    pub fn render(&self, hosts: &[&HostAggregate]) -> Result<String, DeliveryError> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let body = template.render(context! {
            subject => &self.subject,
            hosts => hosts,
            host_colors => self.colors.host.by_state(),
            service_colors => self.colors.service.by_state(),
            host_states => HOST_STATES,
            service_states => SERVICE_STATES,
        })?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::ServiceAggregate;

    fn host(name: &str, state: u8, output: Option<&str>, services: Vec<ServiceAggregate>) -> HostAggregate {
        HostAggregate {
            host_id: name.to_string(),
            display_name: name.to_string(),
            address: "10.1.1.1".to_string(),
            severity_state: state,
            recipients: None,
            change_time: output.map(|_| Utc.with_ymd_and_hms(2024, 3, 13, 9, 15, 0).unwrap()),
            change_time_display: "09:15".to_string(),
            output: output.map(str::to_string),
            services,
        }
    }

    fn service(name: &str, state: u8, output: &str) -> ServiceAggregate {
        ServiceAggregate {
            display_name: name.to_string(),
            severity_state: state,
            change_time: Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap(),
            change_time_display: "10-Mar-24".to_string(),
            output: Some(output.to_string()),
        }
    }

    #[test]
    fn renders_hosts_in_given_order_with_labels() {
        let renderer = DigestRenderer::new(ColorConfig::default(), "Icinga Summary").unwrap();
        let down = host("db-01", 2, Some("PING CRITICAL"), Vec::new());
        let web = host("web-01", 0, None, vec![service("disk", 1, "85% used")]);

        let body = renderer.render(&[&web, &down]).unwrap();

        let web_at = body.find("web-01").unwrap();
        let db_at = body.find("db-01").unwrap();
        assert!(web_at < db_at);
        assert!(body.contains("2 hosts with open problems."));
        assert!(body.contains(">DOWN<"));
        assert!(body.contains(">WARNING<"));
        assert!(body.contains("PING CRITICAL"));
        assert!(body.contains("10-Mar-24"));
        assert!(body.contains(&ColorConfig::default().service.warning));
    }

    #[test]
    fn escapes_plugin_output() {
        let renderer = DigestRenderer::new(ColorConfig::default(), "Icinga Summary").unwrap();
        let web = host("web-01", 0, None, vec![service("http", 2, "<b>502</b> & down")]);

        let body = renderer.render(&[&web]).unwrap();
        assert!(body.contains("&lt;b&gt;502&lt;"));
        assert!(body.contains("&amp; down"));
        assert!(!body.contains("<b>502</b>"));
    }

    #[test]
    fn custom_template_receives_state_maps() {
        let template = "{% for h in hosts %}{{ h.display_name }}={{ host_states[h.severity_state] }};{% endfor %}";
        let renderer =
            DigestRenderer::with_template(template.to_string(), ColorConfig::default(), "s").unwrap();
        let a = host("a", 3, Some("down"), Vec::new());
        let b = host("b", 1, None, Vec::new());

        assert_eq!(renderer.render(&[&a, &b]).unwrap(), "a=DOWN;b=UP;");
    }

    #[test]
    fn unknown_variables_fail_rendering() {
        let renderer =
            DigestRenderer::with_template("{{ missing.field }}".to_string(), ColorConfig::default(), "s")
                .unwrap();
        let result = renderer.render(&[]);
        assert!(matches!(result, Err(DeliveryError::Render(_))));
    }

    #[test]
    fn invalid_template_is_rejected_up_front() {
        let result =
            DigestRenderer::with_template("{% for %}".to_string(), ColorConfig::default(), "s");
        assert!(result.is_err());
    }
}
