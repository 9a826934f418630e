pub mod auth;
pub mod authentication_strength_policies;
pub mod client;
pub mod conditional_access_policies;
pub mod error;
pub mod models;
pub mod named_locations;

pub use auth::{Credentials, StaticToken, TokenProvider, DEFAULT_LOGIN_ENDPOINT};
pub use authentication_strength_policies::AuthenticationStrengthPoliciesClient;
pub use client::{
    retry_on_404, ApiVersion, ConsistencyFailureFn, GraphClient, GraphResponse, Query, RequestInput,
    RetryMode, RetrySettings, Uri, DEFAULT_GRAPH_ENDPOINT,
};
pub use conditional_access_policies::ConditionalAccessPoliciesClient;
pub use error::GraphError;
pub use named_locations::NamedLocationsClient;
