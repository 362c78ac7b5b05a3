//! Session configuration.

use std::time::Duration;

/// Configuration for session behavior.
///
/// Sensible defaults are provided; deployments tune the timing knobs
/// through the environment without recompiling.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Period of the transport-level liveness probe. A peer that fails
    /// to answer one full period is terminated on the next tick.
    ///
    /// Default: 30 seconds. Env: `TETHER_PING_INTERVAL_SECS`.
    pub ping_interval: Duration,

    /// How long before token expiry the `renewAuthentication` push is
    /// sent, nudging the client to re-authenticate in time.
    ///
    /// Default: 60 seconds.
    pub renew_lead: Duration,

    /// The audience assumed by `send_message` when the caller names
    /// none.
    ///
    /// Default: `"user"`. Env: `TETHER_DEFAULT_AUDIENCE`.
    pub default_audience: String,

    /// Grace period between the shutdown close broadcast and forced
    /// termination of sessions that have not finished closing.
    ///
    /// Default: 5 seconds. Env: `TETHER_SHUTDOWN_GRACE_SECS`.
    pub shutdown_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            renew_lead: Duration::from_secs(60),
            default_audience: "user".to_string(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

const PING_INTERVAL_ENV: &str = "TETHER_PING_INTERVAL_SECS";
const DEFAULT_AUDIENCE_ENV: &str = "TETHER_DEFAULT_AUDIENCE";
const SHUTDOWN_GRACE_ENV: &str = "TETHER_SHUTDOWN_GRACE_SECS";

impl SessionConfig {
    /// Builds a config from defaults plus environment overrides.
    ///
    /// An unparseable value logs a warning and keeps the default; it
    /// never panics and never fails.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok());
        config
    }

    /// Applies overrides from a lookup function. Separated from
    /// `from_env` so tests can inject values without touching process
    /// environment.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(PING_INTERVAL_ENV) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => {
                    self.ping_interval = Duration::from_secs(secs);
                }
                _ => tracing::warn!(
                    var = PING_INTERVAL_ENV,
                    value = %raw,
                    "ignoring unparseable ping interval"
                ),
            }
        }
        if let Some(audience) = lookup(DEFAULT_AUDIENCE_ENV) {
            if audience.is_empty() {
                tracing::warn!(
                    var = DEFAULT_AUDIENCE_ENV,
                    "ignoring empty default audience"
                );
            } else {
                self.default_audience = audience;
            }
        }
        if let Some(raw) = lookup(SHUTDOWN_GRACE_ENV) {
            match raw.parse::<u64>() {
                Ok(secs) => self.shutdown_grace = Duration::from_secs(secs),
                Err(_) => tracing::warn!(
                    var = SHUTDOWN_GRACE_ENV,
                    value = %raw,
                    "ignoring unparseable shutdown grace"
                ),
            }
        }
    }
}
