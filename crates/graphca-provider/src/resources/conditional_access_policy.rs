use async_trait::async_trait;
use graphca_config::{PollConfig, Timeouts};
use graphca_domain::{
    ApplicationConditions, ConditionalAccessPolicySpec, GrantControlsSpec, LocationConditions,
    PlatformConditions, PolicyConditions, PolicyState, ResourceId, ResourceKind, UserConditions,
};
use graphca_graph::models::{
    AuthenticationStrengthReference, ConditionalAccessApplications, ConditionalAccessConditionSet,
    ConditionalAccessGrantControls, ConditionalAccessLocations, ConditionalAccessPlatforms,
    ConditionalAccessPolicy, ConditionalAccessUsers,
};
use graphca_graph::{ConditionalAccessPoliciesClient, GraphClient, Query, RetryMode};
use tracing::{debug, info};

use crate::convergence::{wait_for_convergence, wait_for_deletion};
use crate::data::ResourceData;
use crate::error::{Operation, ResourceError};
use crate::resource::{
    api_error, created_id, decode_spec, invalid, require_id, store_spec, wait_error, Resource,
};

const KIND: ResourceKind = ResourceKind::ConditionalAccessPolicy;

pub struct ConditionalAccessPolicyResource {
    client:   ConditionalAccessPoliciesClient,
    timeouts: Timeouts,
    polling:  PollConfig,
}

impl ConditionalAccessPolicyResource {
    pub fn new(base: GraphClient, timeouts: Timeouts, polling: PollConfig) -> Self {
        Self {
            client: ConditionalAccessPoliciesClient::new(base),
            timeouts,
            polling,
        }
    }

    fn desired(&self, data: &ResourceData) -> Result<ConditionalAccessPolicySpec, ResourceError> {
        let spec: ConditionalAccessPolicySpec = decode_spec(KIND, data)?;
        spec.validate().map_err(|e| invalid(KIND, e))?;
        Ok(spec.normalized())
    }

    async fn wait_converged(
        &self,
        op: Operation,
        id: &ResourceId,
        desired: &ConditionalAccessPolicySpec,
        data: &ResourceData,
    ) -> Result<(), ResourceError> {
        let timeout = data.time_left(match op {
            Operation::Create => self.timeouts.create,
            _ => self.timeouts.update,
        });
        debug!(id = %id, "Waiting for conditional access policy to converge");
        let query = Query::default();
        wait_for_convergence(timeout, &self.polling, desired, || {
            let read = self.client.get(id.as_str(), &query, RetryMode::Enabled);
            async move { read.await.map(|(policy, _)| flatten(&policy)) }
        })
        .await
        .map_err(wait_error(KIND, op, id))
    }
}

// ── Expand / flatten ──────────────────────────────────────────────────────────

fn expand(spec: &ConditionalAccessPolicySpec, id: Option<&ResourceId>) -> ConditionalAccessPolicy {
    let c = &spec.conditions;
    let conditions = ConditionalAccessConditionSet {
        applications: Some(ConditionalAccessApplications {
            include_applications: c.applications.included_applications.clone(),
            exclude_applications: c.applications.excluded_applications.clone(),
        }),
        users: Some(ConditionalAccessUsers {
            include_users:  c.users.included_users.clone(),
            exclude_users:  c.users.excluded_users.clone(),
            include_groups: c.users.included_groups.clone(),
            exclude_groups: c.users.excluded_groups.clone(),
            include_roles:  c.users.included_roles.clone(),
            exclude_roles:  c.users.excluded_roles.clone(),
        }),
        client_app_types: Some(c.client_app_types.clone()),
        locations: c.locations.as_ref().map(|l| ConditionalAccessLocations {
            include_locations: l.included_locations.clone(),
            exclude_locations: l.excluded_locations.clone(),
        }),
        platforms: c.platforms.as_ref().map(|p| ConditionalAccessPlatforms {
            include_platforms: p.included_platforms.clone(),
            exclude_platforms: p.excluded_platforms.clone(),
        }),
        sign_in_risk_levels: Some(c.sign_in_risk_levels.clone()),
        user_risk_levels: Some(c.user_risk_levels.clone()),
    };
    let grant_controls = spec.grant_controls.as_ref().map(|g| ConditionalAccessGrantControls {
        operator:                Some(g.operator),
        built_in_controls:       Some(g.built_in_controls.clone()),
        authentication_strength: g
            .authentication_strength_policy_id
            .clone()
            .map(|id| AuthenticationStrengthReference { id }),
        terms_of_use:            Some(g.terms_of_use.clone()),
    });
    ConditionalAccessPolicy {
        id: id.map(ToString::to_string),
        display_name: Some(spec.display_name.clone()),
        state: Some(spec.state),
        conditions: Some(conditions),
        grant_controls,
        ..Default::default()
    }
}

fn flatten(policy: &ConditionalAccessPolicy) -> ConditionalAccessPolicySpec {
    let c = policy.conditions.clone().unwrap_or_default();
    let apps = c.applications.unwrap_or_default();
    let users = c.users.unwrap_or_default();
    let conditions = PolicyConditions {
        client_app_types: c.client_app_types.unwrap_or_default(),
        applications: ApplicationConditions {
            included_applications: apps.include_applications,
            excluded_applications: apps.exclude_applications,
        },
        users: UserConditions {
            included_users:  users.include_users,
            excluded_users:  users.exclude_users,
            included_groups: users.include_groups,
            excluded_groups: users.exclude_groups,
            included_roles:  users.include_roles,
            excluded_roles:  users.exclude_roles,
        },
        locations: c.locations.map(|l| LocationConditions {
            included_locations: l.include_locations,
            excluded_locations: l.exclude_locations,
        }),
        platforms: c.platforms.map(|p| PlatformConditions {
            included_platforms: p.include_platforms,
            excluded_platforms: p.exclude_platforms,
        }),
        sign_in_risk_levels: c.sign_in_risk_levels.unwrap_or_default(),
        user_risk_levels: c.user_risk_levels.unwrap_or_default(),
    };
    let grant_controls = policy.grant_controls.as_ref().map(|g| GrantControlsSpec {
        operator:                          g.operator.unwrap_or_default(),
        built_in_controls:                 g.built_in_controls.clone().unwrap_or_default(),
        authentication_strength_policy_id: g.authentication_strength.as_ref().map(|a| a.id.clone()),
        terms_of_use:                      g.terms_of_use.clone().unwrap_or_default(),
    });
    ConditionalAccessPolicySpec {
        display_name: policy.display_name.clone().unwrap_or_default(),
        state: policy.state.unwrap_or(PolicyState::Disabled),
        conditions,
        grant_controls,
    }
    .normalized()
}

// ── Resource ──────────────────────────────────────────────────────────────────

#[async_trait]
impl Resource for ConditionalAccessPolicyResource {
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
            .create(&expand(&desired, None))
            .await
            .map_err(api_error(KIND, Operation::Create, None))?;
        let id = created_id(KIND, created.id)?;
        data.set_id(id.clone());
        info!(id = %id, "Created conditional access policy");

        self.wait_converged(Operation::Create, &id, &desired, data).await?;
        self.read(data).await
    }

    async fn read(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let id = require_id(KIND, Operation::Read, data)?;
        match self.client.get(id.as_str(), &Query::default(), RetryMode::Enabled).await {
            Ok((policy, _)) => store_spec(KIND, data, &flatten(&policy)),
            Err(e) if e.is_not_found() => {
                debug!(id = %id, "Conditional access policy was not found - removing from state");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(api_error(KIND, Operation::Read, Some(&id))(e)),
        }
    }

    async fn update(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let id = require_id(KIND, Operation::Update, data)?;
        let desired = self.desired(data)?;

        self.client
            .update(&expand(&desired, Some(&id)))
            .await
            .map_err(api_error(KIND, Operation::Update, Some(&id)))?;

        self.wait_converged(Operation::Update, &id, &desired, data).await?;
        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let id = require_id(KIND, Operation::Delete, data)?;
        let query = Query::default();

        match self.client.get(id.as_str(), &query, RetryMode::Enabled).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!(id = %id, "Conditional access policy already deleted");
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

        info!(id = %id, "Deleted conditional access policy");
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
    use crate::wait::WaitError;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const ID: &str = "00000000-0000-0000-0000-0000000000c3";
    const BASE: &str = "/v1.0/identity/conditionalAccess/policies";

    fn resource(server: &MockServer) -> ConditionalAccessPolicyResource {
        ConditionalAccessPolicyResource::new(graph_client(server), timeouts(), polling())
    }

    fn desired_fields(state: &str) -> serde_json::Map<String, serde_json::Value> {
        fields(json!({
            "display_name": "Require MFA for admins",
            "state": state,
            "conditions": {
                "client_app_types": ["all"],
                "applications": { "included_applications": ["All"] },
                "users": { "included_roles": ["62e90394-69f5-4237-9190-012177145e10"] },
            },
            "grant_controls": { "operator": "OR", "built_in_controls": ["mfa"] },
        }))
    }

    fn remote(state: &str) -> serde_json::Value {
        json!({
            "id": ID,
            "displayName": "Require MFA for admins",
            "state": state,
            "conditions": {
                "clientAppTypes": ["all"],
                "applications": { "includeApplications": ["All"], "excludeApplications": [] },
                "users": {
                    "includeUsers": [], "excludeUsers": [],
                    "includeGroups": [], "excludeGroups": [],
                    "includeRoles": ["62e90394-69f5-4237-9190-012177145e10"], "excludeRoles": [],
                },
                "locations": null,
                "platforms": null,
                "signInRiskLevels": [],
                "userRiskLevels": [],
            },
            "grantControls": {
                "operator": "OR",
                "builtInControls": ["mfa"],
                "termsOfUse": [],
                "authenticationStrength": null,
            },
        })
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(BASE))
            .and(body_partial_json(json!({
                "displayName": "Require MFA for admins",
                "state": "enabledForReportingButNotEnforced",
                "grantControls": { "operator": "OR", "builtInControls": ["mfa"] },
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(remote("enabledForReportingButNotEnforced")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote("enabledForReportingButNotEnforced")))
            .mount(&server)
            .await;

        let mut data = ResourceData::new(desired_fields("enabledForReportingButNotEnforced"));
        resource(&server).create(&mut data).await.unwrap();

        assert_eq!(data.id().map(|id| id.as_str()), Some(ID));
        assert_eq!(data.get("state"), Some(&json!("enabledForReportingButNotEnforced")));
        assert!(data.get("conditions").unwrap().get("locations").is_none());
    }

    #[tokio::test]
    async fn update_waits_out_stale_reads() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/{}", BASE, ID)))
            .and(body_partial_json(json!({ "state": "enabled" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote("disabled")))
            .up_to_n_times(2)
            .with_priority(1)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote("enabled")))
            .with_priority(2)
            .mount(&server)
            .await;

        let mut data = ResourceData::new(desired_fields("enabled"));
        data.set_id(ResourceId::new(ID));
        resource(&server).update(&mut data).await.unwrap();
        assert_eq!(data.get("state"), Some(&json!("enabled")));
    }

    #[tokio::test]
    async fn update_times_out_when_never_converged() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", BASE, ID)))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote("disabled")))
            .mount(&server)
            .await;

        let short = Timeouts { update: Duration::from_millis(200), ..timeouts() };
        let r = ConditionalAccessPolicyResource::new(graph_client(&server), short, polling());
        let mut data = ResourceData::new(desired_fields("enabled"));
        data.set_id(ResourceId::new(ID));

        let err = r.update(&mut data).await.unwrap_err();
        match err {
            ResourceError::Wait { op: Operation::Update, source: WaitError::Timeout { last_state, .. }, .. } => {
                assert_eq!(last_state.as_deref(), Some("Pending"));
            }
            other => panic!("expected convergence timeout, got {}", other),
        }
    }

    #[test]
    fn flatten_treats_null_blocks_as_unset() {
        let policy: ConditionalAccessPolicy =
            serde_json::from_value(remote("enabled")).unwrap();
        let spec = flatten(&policy);
        assert!(spec.conditions.locations.is_none());
        assert!(spec.conditions.platforms.is_none());
        assert_eq!(spec.grant_controls.unwrap().authentication_strength_policy_id, None);
    }
}
