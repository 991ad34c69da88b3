//! Dispatcher configuration.

use std::env;
use std::time::Duration;

/// Environment variable holding the request timeout in milliseconds.
pub const ENV_REQUEST_TIMEOUT_MS: &str = "RPCBRIDGE_REQUEST_TIMEOUT_MS";
/// Environment variable holding a fixed request id prefix.
pub const ENV_ID_PREFIX: &str = "RPCBRIDGE_ID_PREFIX";

/// What to do when two identities map to the same method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// The latest registration wins; the previous mapping is dropped with a warning.
    #[default]
    Replace,
    /// Registration fails with `RpcError::MethodCollision`.
    Reject,
}

#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Fixed prefix for generated request ids. `None` seeds the prefix from
    /// the current time.
    pub id_prefix: Option<String>,
    /// Upper bound on how long `Dispatcher::request` waits for a remote
    /// answer. `None` waits until the answer arrives or the call is cancelled.
    pub request_timeout: Option<Duration>,
    pub collision_policy: CollisionPolicy,
}

impl DispatcherConfig {
    /// Defaults overridden by `RPCBRIDGE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var(ENV_REQUEST_TIMEOUT_MS) {
            match value.parse::<u64>() {
                Ok(ms) => config.request_timeout = Some(Duration::from_millis(ms)),
                Err(_) => log::warn!("Ignoring invalid {}={}", ENV_REQUEST_TIMEOUT_MS, value),
            }
        }
        if let Ok(prefix) = env::var(ENV_ID_PREFIX) {
            if !prefix.is_empty() {
                config.id_prefix = Some(prefix);
            }
        }

        config
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert!(config.id_prefix.is_none());
        assert!(config.request_timeout.is_none());
        assert_eq!(config.collision_policy, CollisionPolicy::Replace);
    }

    #[test]
    fn test_builder() {
        let config = DispatcherConfig::default()
            .with_id_prefix("client-")
            .with_request_timeout(Duration::from_millis(250))
            .with_collision_policy(CollisionPolicy::Reject);

        assert_eq!(config.id_prefix.as_deref(), Some("client-"));
        assert_eq!(config.request_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.collision_policy, CollisionPolicy::Reject);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var(ENV_REQUEST_TIMEOUT_MS, "1500");
        env::set_var(ENV_ID_PREFIX, "env-");
        let config = DispatcherConfig::from_env();
        env::remove_var(ENV_REQUEST_TIMEOUT_MS);
        env::remove_var(ENV_ID_PREFIX);

        assert_eq!(config.request_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.id_prefix.as_deref(), Some("env-"));
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_invalid_timeout() {
        env::set_var(ENV_REQUEST_TIMEOUT_MS, "soon");
        let config = DispatcherConfig::from_env();
        env::remove_var(ENV_REQUEST_TIMEOUT_MS);

        assert!(config.request_timeout.is_none());
    }
}
