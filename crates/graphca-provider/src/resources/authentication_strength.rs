use async_trait::async_trait;
use graphca_config::{PollConfig, Timeouts};
use graphca_domain::{AuthenticationStrengthSpec, ResourceId, ResourceKind};
use graphca_graph::models::AuthenticationStrengthPolicy;
use graphca_graph::{AuthenticationStrengthPoliciesClient, GraphClient, Query, RetryMode};
use tracing::{debug, info};

use crate::convergence::{wait_for_convergence, wait_for_deletion};
use crate::data::ResourceData;
use crate::error::{Operation, ResourceError};
use crate::resource::{
    api_error, created_id, decode_prior_spec, decode_spec, invalid, require_id, store_spec,
    wait_error, Resource,
};

const KIND: ResourceKind = ResourceKind::AuthenticationStrengthPolicy;

pub struct AuthenticationStrengthPolicyResource {
    client:   AuthenticationStrengthPoliciesClient,
    timeouts: Timeouts,
    polling:  PollConfig,
}

impl AuthenticationStrengthPolicyResource {
    pub fn new(base: GraphClient, timeouts: Timeouts, polling: PollConfig) -> Self {
        Self {
            client: AuthenticationStrengthPoliciesClient::new(base),
            timeouts,
            polling,
        }
    }

    fn desired(&self, data: &ResourceData) -> Result<AuthenticationStrengthSpec, ResourceError> {
        let spec: AuthenticationStrengthSpec = decode_spec(KIND, data)?;
        spec.validate().map_err(|e| invalid(KIND, e))?;
        Ok(spec.normalized())
    }

    async fn wait_converged(
        &self,
        op: Operation,
        id: &ResourceId,
        desired: &AuthenticationStrengthSpec,
        data: &ResourceData,
    ) -> Result<(), ResourceError> {
        let timeout = data.time_left(match op {
            Operation::Create => self.timeouts.create,
            _ => self.timeouts.update,
        });
        debug!(id = %id, "Waiting for authentication strength policy to converge");
        let query = Query::default();
        wait_for_convergence(timeout, &self.polling, desired, || {
            let read = self.client.get(id.as_str(), &query, RetryMode::Enabled);
            async move { read.await.map(|(policy, _)| flatten(&policy)) }
        })
        .await
        .map_err(wait_error(KIND, op, id))
    }
}

fn expand(spec: &AuthenticationStrengthSpec) -> AuthenticationStrengthPolicy {
    AuthenticationStrengthPolicy {
        display_name:         Some(spec.display_name.clone()),
        description:          spec.description.clone(),
        allowed_combinations: Some(spec.allowed_combinations.clone()),
        ..Default::default()
    }
}

fn flatten(policy: &AuthenticationStrengthPolicy) -> AuthenticationStrengthSpec {
    AuthenticationStrengthSpec {
        display_name:         policy.display_name.clone().unwrap_or_default(),
        description:          policy.description.clone().filter(|d| !d.is_empty()),
        allowed_combinations: policy.allowed_combinations.clone().unwrap_or_default(),
    }
    .normalized()
}

#[async_trait]
impl Resource for AuthenticationStrengthPolicyResource {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    fn validate(&self, data: &ResourceData) -> Result<(), ResourceError> {
        self.desired(data).map(|_| ())
    }

    async fn create(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let desired = self.desired(data)?;

        let (created, _) = self
            .client
            .create(&expand(&desired))
            .await
            .map_err(api_error(KIND, Operation::Create, None))?;
        let id = created_id(KIND, created.id)?;
        data.set_id(id.clone());
        info!(id = %id, "Created authentication strength policy");

        self.wait_converged(Operation::Create, &id, &desired, data).await?;
        self.read(data).await
    }

    async fn read(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let id = require_id(KIND, Operation::Read, data)?;
        match self.client.get(id.as_str(), &Query::default(), RetryMode::Enabled).await {
            Ok((policy, _)) => store_spec(KIND, data, &flatten(&policy)),
            Err(e) if e.is_not_found() => {
                debug!(id = %id, "Authentication strength policy was not found - removing from state");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(api_error(KIND, Operation::Read, Some(&id))(e)),
        }
    }

    async fn update(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let id = require_id(KIND, Operation::Update, data)?;
        let desired = self.desired(data)?;
        let prior = decode_prior_spec::<AuthenticationStrengthSpec>(KIND, data)?.map(|p| p.normalized());

        let base_changed = prior.as_ref().map_or(true, |p| {
            p.display_name != desired.display_name || p.description != desired.description
        });
        if base_changed {
            let patch = AuthenticationStrengthPolicy {
                id:           Some(id.to_string()),
                display_name: Some(desired.display_name.clone()),
                description:  Some(desired.description.clone().unwrap_or_default()),
                ..Default::default()
            };
            self.client
                .update(&patch)
                .await
                .map_err(api_error(KIND, Operation::Update, Some(&id)))?;
        }

        let combinations_changed = prior
            .as_ref()
            .map_or(true, |p| p.allowed_combinations != desired.allowed_combinations);
        if combinations_changed {
            self.client
                .update_allowed_combinations(id.as_str(), &desired.allowed_combinations)
                .await
                .map_err(api_error(KIND, Operation::Update, Some(&id)))?;
        }

        self.wait_converged(Operation::Update, &id, &desired, data).await?;
        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let id = require_id(KIND, Operation::Delete, data)?;
        let query = Query::default();

        match self.client.get(id.as_str(), &query, RetryMode::Enabled).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!(id = %id, "Authentication strength policy already deleted");
                data.clear_id();
                return Ok(());
            }
            Err(e) => return Err(api_error(KIND, Operation::Delete, Some(&id))(e)),
        }

        self.client
            .delete(id.as_str())
            .await
            .map_err(api_error(KIND, Operation::Delete, Some(&id)))?;

        wait_for_deletion(data.time_left(self.timeouts.delete), &self.polling, || {
            self.client.get(id.as_str(), &query, RetryMode::Disabled)
        })
        .await
        .map_err(wait_error(KIND, Operation::Delete, &id))?;

        info!(id = %id, "Deleted authentication strength policy");
        data.clear_id();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ResourceData>, ResourceError> {
        let (policies, _) = self
            .client
            .list(&Query::default())
            .await
            .map_err(api_error(KIND, Operation::List, None))?;

        let mut out = Vec::with_capacity(policies.len());
        for policy in policies {
            let Some(id) = policy.id.clone() else { continue };
            let mut data = ResourceData::existing(ResourceId::new(id));
            store_spec(KIND, &mut data, &flatten(&policy))?;
            out.push(data);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::{fields, graph_client, polling, timeouts};
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const ID: &str = "00000000-0000-0000-0000-0000000000a1";
    const BASE: &str = "/beta/policies/authenticationStrengthPolicies";

    fn resource(server: &MockServer) -> AuthenticationStrengthPolicyResource {
        AuthenticationStrengthPolicyResource::new(graph_client(server), timeouts(), polling())
    }

    fn remote(combinations: &[&str]) -> serde_json::Value {
        json!({
            "id": ID,
            "displayName": "Phishing resistant",
            "description": "FIDO2 only",
            "policyType": "custom",
            "requirementsSatisfied": "mfa",
            "allowedCombinations": combinations,
        })
    }

    #[tokio::test]
    async fn create_polls_then_reads_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BASE))
            .and(body_json(json!({
                "displayName": "Phishing resistant",
                "description": "FIDO2 only",
                "allowedCombinations": ["fido2", "windowsHelloForBusiness"],
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(remote(&["fido2", "windowsHelloForBusiness"])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote(&["windowsHelloForBusiness", "fido2"])))
            .mount(&server)
            .await;

        let mut data = ResourceData::new(fields(json!({
            "display_name": "Phishing resistant",
            "description": "FIDO2 only",
            "allowed_combinations": ["windowsHelloForBusiness", "fido2"],
        })));
        resource(&server).create(&mut data).await.unwrap();

        assert_eq!(data.id().map(|id| id.as_str()), Some(ID));
        assert_eq!(
            data.get("allowed_combinations"),
            Some(&json!(["fido2", "windowsHelloForBusiness"]))
        );
    }

    #[tokio::test]
    async fn create_rejects_empty_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BASE))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "" })))
            .mount(&server)
            .await;

        let mut data = ResourceData::new(fields(json!({
            "display_name": "x",
            "allowed_combinations": ["password"],
        })));
        let err = resource(&server).create(&mut data).await.unwrap_err();
        assert!(matches!(err, ResourceError::BadResponse { .. }), "got: {}", err);
        assert!(data.id().is_none());
    }

    #[tokio::test]
    async fn update_posts_combinations_only_when_changed() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}/{}/updateAllowedCombinations", BASE, ID)))
            .and(body_json(json!({ "allowedCombinations": ["fido2", "x509CertificateMultiFactor"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        // First read still shows the old combinations, then the new ones.
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote(&["fido2"])))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(remote(&["x509CertificateMultiFactor", "fido2"])),
            )
            .with_priority(2)
            .mount(&server)
            .await;

        let prior = fields(json!({
            "display_name": "Phishing resistant",
            "description": "FIDO2 only",
            "allowed_combinations": ["fido2"],
        }));
        let mut data = ResourceData::new(fields(json!({
            "display_name": "Phishing resistant",
            "description": "FIDO2 only",
            "allowed_combinations": ["x509CertificateMultiFactor", "fido2"],
        })))
        .with_prior(prior);
        data.set_id(ResourceId::new(ID));

        resource(&server).update(&mut data).await.unwrap();
        assert_eq!(
            data.get("allowed_combinations"),
            Some(&json!(["fido2", "x509CertificateMultiFactor"]))
        );
    }

    #[tokio::test]
    async fn delete_of_absent_policy_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "Request_ResourceNotFound", "message": "gone" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let mut data = ResourceData::existing(ResourceId::new(ID));
        resource(&server).delete(&mut data).await.unwrap();
        assert!(data.id().is_none());
    }

    #[tokio::test]
    async fn delete_waits_until_not_found() {
        let server = MockServer::start().await;
        // Pre-delete check, then one stale read after the DELETE.
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote(&["fido2"])))
            .up_to_n_times(2)
            .with_priority(1)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(404))
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut data = ResourceData::existing(ResourceId::new(ID));
        resource(&server).delete(&mut data).await.unwrap();
        assert!(data.id().is_none());
    }

    #[tokio::test]
    async fn import_rejects_non_uuid() {
        let server = MockServer::start().await;
        let err = resource(&server).import("not-a-uuid").await.unwrap_err();
        assert!(matches!(err, ResourceError::Validation { .. }), "got: {}", err);
    }
}
