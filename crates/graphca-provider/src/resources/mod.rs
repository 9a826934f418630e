mod authentication_strength;
mod conditional_access_policy;
mod named_location;

pub use authentication_strength::AuthenticationStrengthPolicyResource;
pub use conditional_access_policy::ConditionalAccessPolicyResource;
pub use named_location::NamedLocationResource;

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use graphca_config::{PollConfig, Timeouts};
    use graphca_graph::{GraphClient, RetrySettings};
    use serde_json::{Map, Value};
    use wiremock::MockServer;

    pub(crate) fn graph_client(server: &MockServer) -> GraphClient {
        let retry = RetrySettings {
            transient_attempts:   2,
            consistency_attempts: 3,
            base_delay:           Duration::from_millis(1),
            max_delay:            Duration::from_millis(5),
        };
        GraphClient::with_static_token(server.uri(), "fake-token", retry)
    }

    pub(crate) fn polling() -> PollConfig {
        PollConfig {
            update_interval:    Duration::from_millis(10),
            update_occurrences: 2,
            delete_interval:    Duration::from_millis(10),
            delete_occurrences: 1,
        }
    }

    pub(crate) fn timeouts() -> Timeouts {
        let t = Duration::from_secs(5);
        Timeouts { create: t, read: t, update: t, delete: t }
    }

    pub(crate) fn fields(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            other => panic!("expected an object, got {}", other),
        }
    }
}
