use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawProviderConfig;
use crate::settings::{
    AuthMethod, PollConfig, ProviderConfig, RetryConfig, Timeouts, DEFAULT_GRAPH_ENDPOINT,
    DEFAULT_LOGIN_ENDPOINT,
};

/// Load provider settings from an optional YAML file, then apply `ARM_*`
/// and `GRAPHCA_*` overrides from the process environment.
pub fn load_provider_config(path: Option<&Path>) -> Result<ProviderConfig, ConfigError> {
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|e| ConfigError::Io {
                path: p.display().to_string(),
                source: e,
            })?;
            debug!("Loading provider config from {}", p.display());
            resolve_provider_config(Some(&content), &p.display().to_string(), |k| {
                std::env::var(k).ok()
            })
        }
        None => resolve_provider_config(None, "<environment>", |k| std::env::var(k).ok()),
    }
}

/// Build a [`ProviderConfig`] from YAML text (if any) and an environment lookup.
/// Environment values win over the file.
pub fn resolve_provider_config(
    yaml: Option<&str>,
    source: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ProviderConfig, ConfigError> {
    let mut raw: RawProviderConfig = match yaml {
        Some(text) if !text.trim().is_empty() => {
            serde_yaml::from_str(text).map_err(|e| ConfigError::YamlParse {
                path: source.to_string(),
                source: e,
            })?
        }
        _ => RawProviderConfig::default(),
    };

    let non_empty = |k: &str| env(k).filter(|v| !v.is_empty());
    if let Some(v) = non_empty("ARM_TENANT_ID") {
        raw.tenant_id = Some(v);
    }
    if let Some(v) = non_empty("ARM_CLIENT_ID") {
        raw.client_id = Some(v);
    }
    if let Some(v) = non_empty("ARM_CLIENT_SECRET") {
        raw.client_secret = Some(v);
    }
    if let Some(v) = non_empty("ARM_ACCESS_TOKEN") {
        raw.access_token = Some(v);
    }
    if let Some(v) = non_empty("ARM_USE_MSI") {
        raw.use_msi = parse_bool("ARM_USE_MSI", &v, source)?;
    }
    if let Some(v) = non_empty("ARM_USE_CLI") {
        raw.use_cli = parse_bool("ARM_USE_CLI", &v, source)?;
    }
    if let Some(v) = non_empty("GRAPHCA_GRAPH_ENDPOINT") {
        raw.graph_endpoint = Some(v);
    }

    convert(raw, source)
}

fn parse_bool(key: &str, value: &str, source: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::Conversion {
            path: source.to_string(),
            message: format!("{} must be a boolean, got '{}'", key, other),
        }),
    }
}

fn convert(raw: RawProviderConfig, source: &str) -> Result<ProviderConfig, ConfigError> {
    let err = |message: String| ConfigError::Conversion { path: source.to_string(), message };

    let auth = match (raw.access_token, raw.client_id, raw.client_secret) {
        (Some(token), _, _) => AuthMethod::AccessToken(token),
        (None, Some(client_id), Some(client_secret)) if !raw.use_cli => {
            if raw.tenant_id.is_none() {
                return Err(err("tenant_id is required when using a client secret".into()));
            }
            AuthMethod::ClientSecret { client_id, client_secret }
        }
        (None, None, Some(_)) => {
            return Err(err("client_secret is set but client_id is missing".into()))
        }
        (None, client_id, _) if raw.use_msi => AuthMethod::ManagedIdentity { client_id },
        _ => AuthMethod::AzureCli,
    };

    let graph_endpoint = raw.graph_endpoint.unwrap_or_else(|| DEFAULT_GRAPH_ENDPOINT.into());
    let login_endpoint = raw.login_endpoint.unwrap_or_else(|| DEFAULT_LOGIN_ENDPOINT.into());
    for (name, url) in [("graph_endpoint", &graph_endpoint), ("login_endpoint", &login_endpoint)] {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(err(format!("{} must be an http(s) URL, got '{}'", name, url)));
        }
    }

    let defaults = Timeouts::default();
    let secs = |v: Option<u64>, d: Duration, name: &str| -> Result<Duration, ConfigError> {
        match v {
            Some(0) => Err(err(format!("timeouts.{} must be greater than zero", name))),
            Some(s) => Ok(Duration::from_secs(s)),
            None => Ok(d),
        }
    };
    let timeouts = Timeouts {
        create: secs(raw.timeouts.create, defaults.create, "create")?,
        read:   secs(raw.timeouts.read, defaults.read, "read")?,
        update: secs(raw.timeouts.update, defaults.update, "update")?,
        delete: secs(raw.timeouts.delete, defaults.delete, "delete")?,
    };

    let r = RetryConfig::default();
    let retry = RetryConfig {
        transient_attempts:   raw.retry.transient_attempts.unwrap_or(r.transient_attempts),
        consistency_attempts: raw.retry.consistency_attempts.unwrap_or(r.consistency_attempts),
        base_delay:           raw.retry.base_delay_ms.map(Duration::from_millis).unwrap_or(r.base_delay),
        max_delay:            raw.retry.max_delay_ms.map(Duration::from_millis).unwrap_or(r.max_delay),
    };
    if retry.base_delay > retry.max_delay {
        return Err(err("retry.base_delay_ms must not exceed retry.max_delay_ms".into()));
    }

    let p = PollConfig::default();
    let polling = PollConfig {
        update_interval:    raw.polling.update_interval_ms.map(Duration::from_millis).unwrap_or(p.update_interval),
        update_occurrences: raw.polling.update_occurrences.unwrap_or(p.update_occurrences),
        delete_interval:    raw.polling.delete_interval_ms.map(Duration::from_millis).unwrap_or(p.delete_interval),
        delete_occurrences: raw.polling.delete_occurrences.unwrap_or(p.delete_occurrences),
    };
    if polling.update_occurrences == 0 || polling.delete_occurrences == 0 {
        return Err(err("polling occurrences must be at least 1".into()));
    }

    Ok(ProviderConfig {
        tenant_id: raw.tenant_id,
        auth,
        graph_endpoint,
        login_endpoint,
        timeouts,
        retry,
        polling,
    })
}
