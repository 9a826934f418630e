use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use graphca_config::{AuthMethod, ProviderConfig, Timeouts};
use graphca_domain::{ResourceId, ResourceKind};
use graphca_graph::{Credentials, GraphClient, RetrySettings};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::data::ResourceData;
use crate::diagnostic::Diagnostic;
use crate::error::{Operation, ResourceError};
use crate::resource::Resource;
use crate::resources::{
    AuthenticationStrengthPolicyResource, ConditionalAccessPolicyResource, NamedLocationResource,
};

const BACKSTOP_GRACE: Duration = Duration::from_secs(1);

/// Entry point for lifecycle calls. Holds one [`Resource`] per supported
/// type, all sharing a single Graph client. Each call gets a deadline from
/// the configured per-operation timeout, shared with the resource's polling.
pub struct Provider {
    resources: Vec<Arc<dyn Resource>>,
    timeouts:  Timeouts,
}

fn credentials(config: &ProviderConfig) -> Credentials {
    match &config.auth {
        AuthMethod::ClientSecret { client_id, client_secret } => Credentials::ClientSecret {
            tenant_id:     config.tenant_id.clone().unwrap_or_default(),
            client_id:     client_id.clone(),
            client_secret: client_secret.clone(),
        },
        AuthMethod::ManagedIdentity { client_id } => Credentials::ManagedIdentity {
            client_id: client_id.clone(),
        },
        AuthMethod::AzureCli => Credentials::AzureCli { tenant_id: config.tenant_id.clone() },
        AuthMethod::AccessToken(token) => Credentials::Static(token.clone()),
    }
}

impl Provider {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let http = reqwest::Client::new();
        let token = credentials(config).into_provider(http.clone(), &config.login_endpoint);
        let retry = RetrySettings {
            transient_attempts:   config.retry.transient_attempts,
            consistency_attempts: config.retry.consistency_attempts,
            base_delay:           config.retry.base_delay,
            max_delay:            config.retry.max_delay,
        };
        info!(endpoint = %config.graph_endpoint, "Configured Microsoft Graph client");
        let client = GraphClient::new(http, token, config.graph_endpoint.clone(), retry);
        Self::with_client(client, config)
    }

    pub fn with_client(client: GraphClient, config: &ProviderConfig) -> Self {
        let (t, p) = (config.timeouts, config.polling);
        let resources: Vec<Arc<dyn Resource>> = vec![
            Arc::new(AuthenticationStrengthPolicyResource::new(client.clone(), t, p)),
            Arc::new(NamedLocationResource::new(client.clone(), t, p)),
            Arc::new(ConditionalAccessPolicyResource::new(client, t, p)),
        ];
        Self { resources, timeouts: t }
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.resources.iter().map(|r| r.kind()).collect()
    }

    pub fn resource(&self, kind: ResourceKind) -> Result<Arc<dyn Resource>, Diagnostic> {
        self.resources
            .iter()
            .find(|r| r.kind() == kind)
            .cloned()
            .ok_or_else(|| {
                Diagnostic::error("Unsupported resource type")
                    .with_detail(format!("{} is not served by this provider", kind))
            })
    }

    fn timeout_for(&self, op: Operation) -> Duration {
        match op {
            Operation::Create => self.timeouts.create,
            Operation::Update => self.timeouts.update,
            Operation::Delete => self.timeouts.delete,
            Operation::Read | Operation::Import | Operation::List => self.timeouts.read,
        }
    }

    fn deadline_for(&self, op: Operation) -> Instant {
        Instant::now() + self.timeout_for(op)
    }

    /// Turn the outcome of a bounded call into a diagnostic. `None` means
    /// the backstop fired; `id` is whatever object the call had reached.
    fn conclude<T>(
        &self,
        kind: ResourceKind,
        op: Operation,
        id: Option<&ResourceId>,
        outcome: Option<Result<T, ResourceError>>,
    ) -> Result<T, Diagnostic> {
        match outcome {
            Some(Ok(v)) => Ok(v),
            Some(Err(e)) => {
                warn!(kind = %kind, op = %op, error = %e, "Lifecycle call failed");
                Err(Diagnostic::from(&e))
            }
            None => {
                let e = ResourceError::Deadline {
                    op,
                    kind,
                    id: id.cloned(),
                    timeout: self.timeout_for(op),
                };
                warn!(kind = %kind, op = %op, error = %e, "Lifecycle call timed out");
                Err(Diagnostic::from(e))
            }
        }
    }

    pub fn validate(&self, kind: ResourceKind, fields: Map<String, Value>) -> Result<(), Diagnostic> {
        let resource = self.resource(kind)?;
        resource
            .validate(&ResourceData::new(fields))
            .map_err(|e| Diagnostic::from(&e))
    }

    /// On failure after the object was posted, the diagnostic names its ID.
    pub async fn create(
        &self,
        kind: ResourceKind,
        fields: Map<String, Value>,
    ) -> Result<ResourceData, Diagnostic> {
        let resource = self.resource(kind)?;
        let deadline = self.deadline_for(Operation::Create);
        let mut data = ResourceData::new(fields).with_deadline(deadline);
        let outcome = within(deadline, resource.create(&mut data)).await;
        self.conclude(kind, Operation::Create, data.id(), outcome)?;
        Ok(data)
    }

    /// `Ok(None)` when the object no longer exists.
    pub async fn read(
        &self,
        kind: ResourceKind,
        id: ResourceId,
    ) -> Result<Option<ResourceData>, Diagnostic> {
        let resource = self.resource(kind)?;
        let deadline = self.deadline_for(Operation::Read);
        let mut data = ResourceData::existing(id.clone()).with_deadline(deadline);
        let outcome = within(deadline, resource.read(&mut data)).await;
        self.conclude(kind, Operation::Read, Some(&id), outcome)?;
        Ok(data.id().is_some().then_some(data))
    }

    /// Read the current object as the prior state, then apply `fields`.
    /// The read counts against the update's deadline.
    pub async fn update(
        &self,
        kind: ResourceKind,
        id: ResourceId,
        fields: Map<String, Value>,
    ) -> Result<ResourceData, Diagnostic> {
        let resource = self.resource(kind)?;
        let deadline = self.deadline_for(Operation::Update);
        let call = async {
            let mut current = ResourceData::existing(id.clone()).with_deadline(deadline);
            resource.read(&mut current).await?;
            if current.id().is_none() {
                return Err(ResourceError::NotFound { op: Operation::Update, kind, id: id.clone() });
            }
            let mut data = ResourceData::new(fields)
                .with_prior(current.fields().clone())
                .with_deadline(deadline);
            data.set_id(id.clone());
            resource.update(&mut data).await?;
            Ok(data)
        };
        let outcome = within(deadline, call).await;
        self.conclude(kind, Operation::Update, Some(&id), outcome)
    }

    pub async fn delete(&self, kind: ResourceKind, id: ResourceId) -> Result<(), Diagnostic> {
        let resource = self.resource(kind)?;
        let deadline = self.deadline_for(Operation::Delete);
        let mut data = ResourceData::existing(id.clone()).with_deadline(deadline);
        let outcome = within(deadline, resource.delete(&mut data)).await;
        self.conclude(kind, Operation::Delete, Some(&id), outcome)
    }

    pub async fn import(&self, kind: ResourceKind, id: &str) -> Result<ResourceData, Diagnostic> {
        let resource = self.resource(kind)?;
        let deadline = self.deadline_for(Operation::Import);
        let outcome = within(deadline, resource.import(id)).await;
        let parsed = ResourceId::parse_uuid(id).ok();
        self.conclude(kind, Operation::Import, parsed.as_ref(), outcome)
    }

    pub async fn list(&self, kind: ResourceKind) -> Result<Vec<ResourceData>, Diagnostic> {
        let resource = self.resource(kind)?;
        let deadline = self.deadline_for(Operation::List);
        let outcome = within(deadline, resource.list()).await;
        self.conclude(kind, Operation::List, None, outcome)
    }
}

/// Run `call` until `deadline` plus [`BACKSTOP_GRACE`]. Resources size their
/// own waits to end at `deadline`, so the backstop only fires on a call that
/// is stuck outside a polling wait.
async fn within<T>(
    deadline: Instant,
    call: impl Future<Output = Result<T, ResourceError>>,
) -> Option<Result<T, ResourceError>> {
    tokio::time::timeout_at(deadline + BACKSTOP_GRACE, call).await.ok()
}
