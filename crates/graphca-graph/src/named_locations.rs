use crate::client::{retry_on_404, ApiVersion, GraphClient, Query, RequestInput, RetryMode, Uri};
use crate::error::GraphError;
use crate::models::NamedLocation;

const ENTITY: &str = "/identity/conditionalAccess/namedLocations";

/// Operations on `namedLocation` and its IP and country subtypes.
#[derive(Clone)]
pub struct NamedLocationsClient {
    base: GraphClient,
}

impl NamedLocationsClient {
    pub fn new(base: GraphClient) -> Self {
        Self { base }
    }

    fn uri(path: impl AsRef<str>) -> Uri {
        Uri::entity(ApiVersion::V1, format!("{}{}", ENTITY, path.as_ref()))
    }

    pub async fn list(&self, query: &Query) -> Result<(Vec<NamedLocation>, u16), GraphError> {
        self.base.list(Self::uri(""), query).await
    }

    pub async fn create(&self, location: &NamedLocation) -> Result<(NamedLocation, u16), GraphError> {
        let input = RequestInput::new(Self::uri(""))
            .json(location)?
            .valid_status(&[201]);
        let resp = self.base.post(input).await?;
        Ok((resp.decode()?, resp.status))
    }

    pub async fn get(
        &self,
        id: &str,
        query: &Query,
        mode: RetryMode,
    ) -> Result<(NamedLocation, u16), GraphError> {
        let input = RequestInput::new(Self::uri(format!("/{}", id)))
            .query(query)
            .valid_status(&[200])
            .consistency_failure(retry_on_404);
        let resp = self.base.get(input, mode).await?;
        Ok((resp.decode()?, resp.status))
    }

    pub async fn update(&self, location: &NamedLocation) -> Result<u16, GraphError> {
        let id = location.id().ok_or(GraphError::MissingId {
            operation: "update",
            entity:    "NamedLocation",
        })?;
        let input = RequestInput::new(Self::uri(format!("/{}", id)))
            .json(location)?
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
