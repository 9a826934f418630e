mod raw;
mod loader;
mod manifest;
pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use loader::{load_provider_config, resolve_provider_config};
pub use manifest::{load_manifest, load_manifests, Manifest};
pub use settings::{AuthMethod, PollConfig, ProviderConfig, RetryConfig, Timeouts};
