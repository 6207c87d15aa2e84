use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DbConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between two status polls.
    pub interval_secs: u64,
    /// Timeout applied by the HTTP client to every status request.
    pub request_timeout_secs: u64,
    /// Minimum spacing between two delivered notifications.
    pub notification_gap_secs: u64,
    /// Soft-deleted projects are purged once they have been deleted this long.
    pub purge_after_hours: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 20,
            request_timeout_secs: 60,
            notification_gap_secs: 5,
            purge_after_hours: 24,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs) }

    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

    pub fn notification_gap(&self) -> time::Duration {
        time::Duration::seconds(self.notification_gap_secs as i64)
    }

    pub fn purge_after(&self) -> time::Duration {
        time::Duration::hours(self.purge_after_hours as i64)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// Receives a JSON POST for every delivered notification. Notifications are only logged
    /// when unset.
    pub webhook_url: Option<Url>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_defaults_apply_to_missing_sections() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "server": { "port": 8080 },
            "db": { "url": "sqlite:buildwatch.db" },
            "poll": { "interval_secs": 30 },
        }))
        .unwrap();
        assert_eq!(config.poll.interval(), Duration::from_secs(30));
        assert_eq!(config.poll.notification_gap(), time::Duration::seconds(5));
        assert_eq!(config.poll.purge_after(), time::Duration::hours(24));
        assert!(config.notify.webhook_url.is_none());
    }
}
