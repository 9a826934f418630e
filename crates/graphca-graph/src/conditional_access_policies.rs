use crate::client::{retry_on_404, ApiVersion, GraphClient, Query, RequestInput, RetryMode, Uri};
use crate::error::GraphError;
use crate::models::ConditionalAccessPolicy;

const ENTITY: &str = "/identity/conditionalAccess/policies";

#[derive(Clone)]
pub struct ConditionalAccessPoliciesClient {
    base: GraphClient,
}

impl ConditionalAccessPoliciesClient {
    pub fn new(base: GraphClient) -> Self {
        Self { base }
    }

    fn uri(path: impl AsRef<str>) -> Uri {
        Uri::entity(ApiVersion::V1, format!("{}{}", ENTITY, path.as_ref()))
    }

    pub async fn list(&self, query: &Query) -> Result<(Vec<ConditionalAccessPolicy>, u16), GraphError> {
        self.base.list(Self::uri(""), query).await
    }

    pub async fn create(
        &self,
        policy: &ConditionalAccessPolicy,
    ) -> Result<(ConditionalAccessPolicy, u16), GraphError> {
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
    ) -> Result<(ConditionalAccessPolicy, u16), GraphError> {
        let input = RequestInput::new(Self::uri(format!("/{}", id)))
            .query(query)
            .valid_status(&[200])
            .consistency_failure(retry_on_404);
        let resp = self.base.get(input, mode).await?;
        Ok((resp.decode()?, resp.status))
    }

    pub async fn update(&self, policy: &ConditionalAccessPolicy) -> Result<u16, GraphError> {
        let id = policy.id.as_deref().ok_or(GraphError::MissingId {
            operation: "update",
            entity:    "ConditionalAccessPolicy",
        })?;
        let input = RequestInput::new(Self::uri(format!("/{}", id)))
            .json(policy)?
            .valid_status(&[204])
            .consistency_failure(retry_on_404);
        Ok(self.base.patch(input).await?.status)
    }

    pub async fn delete(&self, id: &str) -> Result<u16, GraphError> {
        let input = RequestInput::new(Self::uri(format!("/{}", id)))
            .valid_status(&[204])
            .consistency_failure(retry_on_404);
        Ok(self.base.delete(input).await?.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::client;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn list_passes_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.0/identity/conditionalAccess/policies"))
            .and(query_param("$filter", "displayName eq 'Require MFA'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "pol-1",
                    "displayName": "Require MFA",
                    "state": "enabledForReportingButNotEnforced",
                    "grantControls": { "operator": "OR", "builtInControls": ["mfa"] },
                }]
            })))
            .mount(&server)
            .await;

        let c = ConditionalAccessPoliciesClient::new(client(&server));
        let query = Query { filter: Some("displayName eq 'Require MFA'".into()), ..Default::default() };
        let (policies, _) = c.list(&query).await.unwrap();
        assert_eq!(policies.len(), 1);
        let grant = policies[0].grant_controls.as_ref().unwrap();
        assert_eq!(grant.built_in_controls, Some(vec!["mfa".to_string()]));
    }

    #[tokio::test]
    async fn delete_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1.0/identity/conditionalAccess/policies/pol-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let c = ConditionalAccessPoliciesClient::new(client(&server));
        assert_eq!(c.delete("pol-1").await.unwrap(), 204);
    }
}
