use async_trait::async_trait;
use graphca_domain::{DomainError, ResourceId, ResourceKind};
use graphca_graph::GraphError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::data::ResourceData;
use crate::error::{Operation, ResourceError};
use crate::wait::WaitError;

/// One managed resource type.
///
/// Every method works on a [`ResourceData`]. On success the data holds the
/// attributes as last observed remotely. `read` clears the ID when the
/// object no longer exists.
#[async_trait]
pub trait Resource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Check the desired attributes without calling Graph.
    fn validate(&self, data: &ResourceData) -> Result<(), ResourceError>;

    async fn create(&self, data: &mut ResourceData) -> Result<(), ResourceError>;

    async fn read(&self, data: &mut ResourceData) -> Result<(), ResourceError>;

    async fn update(&self, data: &mut ResourceData) -> Result<(), ResourceError>;

    /// Deleting an object that is already gone succeeds.
    async fn delete(&self, data: &mut ResourceData) -> Result<(), ResourceError>;

    async fn list(&self) -> Result<Vec<ResourceData>, ResourceError>;

    async fn import(&self, id: &str) -> Result<ResourceData, ResourceError> {
        let kind = self.kind();
        let id = ResourceId::parse_uuid(id).map_err(|source| ResourceError::Validation { kind, source })?;
        let mut data = ResourceData::existing(id.clone());
        self.read(&mut data).await?;
        if data.id().is_none() {
            return Err(ResourceError::NotFound { op: Operation::Import, kind, id });
        }
        Ok(data)
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

pub(crate) fn decode_spec<T: DeserializeOwned>(
    kind: ResourceKind,
    data: &ResourceData,
) -> Result<T, ResourceError> {
    data.decode().map_err(|source| ResourceError::Schema { kind, source })
}

/// The last observed attributes, when the caller supplied them.
pub(crate) fn decode_prior_spec<T: DeserializeOwned>(
    kind: ResourceKind,
    data: &ResourceData,
) -> Result<Option<T>, ResourceError> {
    data.decode_prior()
        .transpose()
        .map_err(|source| ResourceError::Schema { kind, source })
}

pub(crate) fn store_spec<T: Serialize>(
    kind: ResourceKind,
    data: &mut ResourceData,
    spec: &T,
) -> Result<(), ResourceError> {
    data.set_from(spec).map_err(|source| ResourceError::Schema { kind, source })
}

pub(crate) fn require_id(
    kind: ResourceKind,
    op: Operation,
    data: &ResourceData,
) -> Result<ResourceId, ResourceError> {
    data.id().cloned().ok_or(ResourceError::MissingId { op, kind })
}

pub(crate) fn api_error(
    kind: ResourceKind,
    op: Operation,
    id: Option<&ResourceId>,
) -> impl FnOnce(GraphError) -> ResourceError {
    let id = id.cloned();
    move |source| ResourceError::Api { op, kind, id, source }
}

pub(crate) fn wait_error(
    kind: ResourceKind,
    op: Operation,
    id: &ResourceId,
) -> impl FnOnce(WaitError<GraphError>) -> ResourceError {
    let id = id.clone();
    move |source| ResourceError::Wait { op, kind, id, source }
}

pub(crate) fn invalid(kind: ResourceKind, source: DomainError) -> ResourceError {
    ResourceError::Validation { kind, source }
}

/// Take the object ID from a create response, rejecting a missing or empty one.
pub(crate) fn created_id(kind: ResourceKind, id: Option<String>) -> Result<ResourceId, ResourceError> {
    match id {
        Some(id) if !id.is_empty() => Ok(ResourceId::new(id)),
        _ => Err(ResourceError::BadResponse {
            op:      Operation::Create,
            kind,
            id:      None,
            message: format!("object ID returned for {} is nil/empty", kind.noun()),
        }),
    }
}
