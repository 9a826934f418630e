use std::time::Duration;

pub use graphca_domain::{DEFAULT_GRAPH_ENDPOINT, DEFAULT_LOGIN_ENDPOINT};

/// How the provider authenticates. Resolved from the config file and
/// `ARM_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    ClientSecret { client_id: String, client_secret: String },
    ManagedIdentity { client_id: Option<String> },
    AzureCli,
    /// A pre-issued Graph access token, used as is.
    AccessToken(String),
}

/// Per-operation deadlines for resource lifecycle calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read:   Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        let five_minutes = Duration::from_secs(5 * 60);
        Self {
            create: five_minutes,
            read:   five_minutes,
            update: five_minutes,
            delete: five_minutes,
        }
    }
}

/// Transport retry tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub transient_attempts:   u32,
    pub consistency_attempts: u32,
    pub base_delay:           Duration,
    pub max_delay:            Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transient_attempts:   4,
            consistency_attempts: 8,
            base_delay:           Duration::from_secs(1),
            max_delay:            Duration::from_secs(30),
        }
    }
}

/// Cadence of post-write convergence and post-delete confirmation polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub update_interval:    Duration,
    pub update_occurrences: u32,
    pub delete_interval:    Duration,
    pub delete_occurrences: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            update_interval:    Duration::from_secs(5),
            update_occurrences: 5,
            delete_interval:    Duration::from_secs(1),
            delete_occurrences: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub tenant_id:      Option<String>,
    pub auth:           AuthMethod,
    pub graph_endpoint: String,
    pub login_endpoint: String,
    pub timeouts:       Timeouts,
    pub retry:          RetryConfig,
    pub polling:        PollConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            tenant_id:      None,
            auth:           AuthMethod::AzureCli,
            graph_endpoint: DEFAULT_GRAPH_ENDPOINT.to_string(),
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.to_string(),
            timeouts:       Timeouts::default(),
            retry:          RetryConfig::default(),
            polling:        PollConfig::default(),
        }
    }
}
