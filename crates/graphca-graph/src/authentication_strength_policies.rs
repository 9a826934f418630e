use serde_json::json;

use crate::client::{retry_on_404, ApiVersion, GraphClient, Query, RequestInput, RetryMode, Uri};
use crate::error::GraphError;
use crate::models::AuthenticationStrengthPolicy;

const ENTITY: &str = "/policies/authenticationStrengthPolicies";

/// Operations on `authenticationStrengthPolicy` (beta API).
#[derive(Clone)]
pub struct AuthenticationStrengthPoliciesClient {
    base: GraphClient,
}

impl AuthenticationStrengthPoliciesClient {
    pub fn new(base: GraphClient) -> Self {
        Self { base }
    }

    fn uri(path: impl AsRef<str>) -> Uri {
        Uri::entity(ApiVersion::Beta, format!("{}{}", ENTITY, path.as_ref()))
    }

    pub async fn list(
        &self,
        query: &Query,
    ) -> Result<(Vec<AuthenticationStrengthPolicy>, u16), GraphError> {
        self.base.list(Self::uri(""), query).await
    }

    pub async fn create(
        &self,
        policy: &AuthenticationStrengthPolicy,
    ) -> Result<(AuthenticationStrengthPolicy, u16), GraphError> {
        let input = RequestInput::new(Self::uri(""))
            .json(policy)?
            .valid_status(&[201]);
        let resp = self.base.post(input).await?;
        Ok((resp.decode()?, resp.status))
    }

    pub async fn get(
        &self,
        id: &str,
        query: &Query,
        mode: RetryMode,
    ) -> Result<(AuthenticationStrengthPolicy, u16), GraphError> {
        let input = RequestInput::new(Self::uri(format!("/{}", id)))
            .query(query)
            .valid_status(&[200])
            .consistency_failure(retry_on_404);
        let resp = self.base.get(input, mode).await?;
        Ok((resp.decode()?, resp.status))
    }

    /// PATCH display name and description. Allowed combinations are not
    /// writable here; see [`update_allowed_combinations`](Self::update_allowed_combinations).
    pub async fn update(&self, policy: &AuthenticationStrengthPolicy) -> Result<u16, GraphError> {
        let id = policy.id.as_deref().ok_or(GraphError::MissingId {
            operation: "update",
            entity:    "AuthenticationStrengthPolicy",
        })?;
        let body = AuthenticationStrengthPolicy {
            allowed_combinations: None,
            ..policy.clone()
        };
        let input = RequestInput::new(Self::uri(format!("/{}", id)))
            .json(&body)?
            .valid_status(&[204])
            .consistency_failure(retry_on_404);
        Ok(self.base.patch(input).await?.status)
    }

    pub async fn update_allowed_combinations(
        &self,
        id: &str,
        combinations: &[String],
    ) -> Result<u16, GraphError> {
        let input = RequestInput::new(Self::uri(format!("/{}/updateAllowedCombinations", id)))
            .json(&json!({ "allowedCombinations": combinations }))?
            .valid_status(&[200])
            .consistency_failure(retry_on_404);
        Ok(self.base.post(input).await?.status)
    }

    pub async fn delete(&self, id: &str) -> Result<u16, GraphError> {
        let input = RequestInput::new(Self::uri(format!("/{}", id)))
            .valid_status(&[204])
            .consistency_failure(retry_on_404);
        Ok(self.base.delete(input).await?.status)
    }
}
