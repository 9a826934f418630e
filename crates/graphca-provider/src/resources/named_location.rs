use async_trait::async_trait;
use graphca_config::{PollConfig, Timeouts};
use graphca_domain::{
    CountryCriteria, DomainError, IpCriteria, LocationCriteria, NamedLocationSpec, ResourceId,
    ResourceKind,
};
use graphca_graph::models::{CountryNamedLocation, IpNamedLocation, IpRange, NamedLocation};
use graphca_graph::{GraphClient, GraphError, NamedLocationsClient, Query, RetryMode};
use tracing::{debug, info, warn};

use crate::convergence::{wait_for_convergence, wait_for_deletion};
use crate::data::ResourceData;
use crate::error::{Operation, ResourceError};
use crate::resource::{
    api_error, created_id, decode_prior_spec, decode_spec, invalid, require_id, store_spec,
    wait_error, Resource,
};

const KIND: ResourceKind = ResourceKind::NamedLocation;

pub struct NamedLocationResource {
    client:   NamedLocationsClient,
    timeouts: Timeouts,
    polling:  PollConfig,
}

impl NamedLocationResource {
    pub fn new(base: GraphClient, timeouts: Timeouts, polling: PollConfig) -> Self {
        Self {
            client: NamedLocationsClient::new(base),
            timeouts,
            polling,
        }
    }

    fn desired(&self, data: &ResourceData) -> Result<NamedLocationSpec, ResourceError> {
        let spec: NamedLocationSpec = decode_spec(KIND, data)?;
        spec.validate().map_err(|e| invalid(KIND, e))?;
        Ok(spec.normalized())
    }

    async fn wait_converged(
        &self,
        op: Operation,
        id: &ResourceId,
        desired: &NamedLocationSpec,
        data: &ResourceData,
    ) -> Result<(), ResourceError> {
        let timeout = data.time_left(match op {
            Operation::Create => self.timeouts.create,
            _ => self.timeouts.update,
        });
        debug!(id = %id, "Waiting for named location to converge");
        let query = Query::default();
        wait_for_convergence(timeout, &self.polling, desired, || {
            let read = self.client.get(id.as_str(), &query, RetryMode::Enabled);
            async move {
                let (location, _) = read.await?;
                flatten(&location)
            }
        })
        .await
        .map_err(wait_error(KIND, op, id))
    }
}

fn expand(spec: &NamedLocationSpec, id: Option<&ResourceId>) -> Result<NamedLocation, ResourceError> {
    let id = id.map(ToString::to_string);
    let display_name = Some(spec.display_name.clone());
    match spec.criteria().map_err(|e| invalid(KIND, e))? {
        LocationCriteria::Ip(ip) => {
            let ranges = ip
                .ip_ranges
                .iter()
                .map(|r| IpRange::from_cidr(r))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(KIND, e))?;
            Ok(NamedLocation::Ip(IpNamedLocation {
                id,
                display_name,
                ip_ranges: Some(ranges),
                is_trusted: Some(ip.trusted),
                ..Default::default()
            }))
        }
        LocationCriteria::Country(c) => Ok(NamedLocation::Country(CountryNamedLocation {
            id,
            display_name,
            countries_and_regions: Some(c.countries_and_regions),
            include_unknown_countries_and_regions: Some(c.include_unknown_countries_and_regions),
            country_lookup_method: Some(c.country_lookup_method),
            ..Default::default()
        })),
    }
}

/// Populate exactly the block matching the returned subtype.
fn flatten(location: &NamedLocation) -> Result<NamedLocationSpec, GraphError> {
    let spec = match location {
        NamedLocation::Ip(l) => NamedLocationSpec::from_criteria(
            l.display_name.clone().unwrap_or_default(),
            LocationCriteria::Ip(IpCriteria {
                ip_ranges: l.ip_ranges.iter().flatten().map(|r| r.cidr().to_string()).collect(),
                trusted:   l.is_trusted.unwrap_or(false),
            }),
        ),
        NamedLocation::Country(l) => NamedLocationSpec::from_criteria(
            l.display_name.clone().unwrap_or_default(),
            LocationCriteria::Country(CountryCriteria {
                countries_and_regions: l.countries_and_regions.clone().unwrap_or_default(),
                include_unknown_countries_and_regions: l
                    .include_unknown_countries_and_regions
                    .unwrap_or(false),
                country_lookup_method: l.country_lookup_method.unwrap_or_default(),
            }),
        ),
        NamedLocation::Unrecognized { odata_type, id } => {
            return Err(GraphError::UnrecognizedType {
                entity:     "named location",
                id:         id.clone().unwrap_or_default(),
                odata_type: odata_type.clone(),
            })
        }
    };
    Ok(spec.normalized())
}

#[async_trait]
impl Resource for NamedLocationResource {
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
            .create(&expand(&desired, None)?)
            .await
            .map_err(api_error(KIND, Operation::Create, None))?;
        let id = created_id(KIND, created.id().map(str::to_string))?;
        data.set_id(id.clone());
        info!(id = %id, "Created named location");

        self.wait_converged(Operation::Create, &id, &desired, data).await?;
        self.read(data).await
    }

    async fn read(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let id = require_id(KIND, Operation::Read, data)?;
        let location = match self.client.get(id.as_str(), &Query::default(), RetryMode::Enabled).await {
            Ok((location, _)) => location,
            Err(e) if e.is_not_found() => {
                debug!(id = %id, "Named location was not found - removing from state");
                data.clear_id();
                return Ok(());
            }
            Err(e) => return Err(api_error(KIND, Operation::Read, Some(&id))(e)),
        };
        let spec = flatten(&location).map_err(api_error(KIND, Operation::Read, Some(&id)))?;
        store_spec(KIND, data, &spec)
    }

    async fn update(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let id = require_id(KIND, Operation::Update, data)?;
        let desired = self.desired(data)?;

        if let Some(prior) = decode_prior_spec::<NamedLocationSpec>(KIND, data)? {
            if prior.ip.is_some() != desired.ip.is_some() {
                return Err(invalid(
                    KIND,
                    DomainError::InvalidConfig(
                        "switching between `ip` and `country` requires replacing the named location".into(),
                    ),
                ));
            }
        }

        self.client
            .update(&expand(&desired, Some(&id))?)
            .await
            .map_err(api_error(KIND, Operation::Update, Some(&id)))?;

        self.wait_converged(Operation::Update, &id, &desired, data).await?;
        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData) -> Result<(), ResourceError> {
        let id = require_id(KIND, Operation::Delete, data)?;
        let query = Query::default();

        let existing = match self.client.get(id.as_str(), &query, RetryMode::Enabled).await {
            Ok((location, _)) => location,
            Err(e) if e.is_not_found() => {
                debug!(id = %id, "Named location already deleted");
                data.clear_id();
                return Ok(());
            }
            Err(e) => return Err(api_error(KIND, Operation::Delete, Some(&id))(e)),
        };

        // Trusted IP locations cannot be deleted.
        if let NamedLocation::Ip(IpNamedLocation { is_trusted: Some(true), .. }) = existing {
            debug!(id = %id, "Marking named location untrusted before deletion");
            let untrusted = NamedLocation::Ip(IpNamedLocation {
                id:         Some(id.to_string()),
                is_trusted: Some(false),
                ..Default::default()
            });
            self.client
                .update(&untrusted)
                .await
                .map_err(api_error(KIND, Operation::Delete, Some(&id)))?;
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

        info!(id = %id, "Deleted named location");
        data.clear_id();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ResourceData>, ResourceError> {
        let (locations, _) = self
            .client
            .list(&Query::default())
            .await
            .map_err(api_error(KIND, Operation::List, None))?;

        let mut out = Vec::with_capacity(locations.len());
        for location in &locations {
            let Some(id) = location.id() else { continue };
            match flatten(location) {
                Ok(spec) => {
                    let mut data = ResourceData::existing(ResourceId::new(id));
                    store_spec(KIND, &mut data, &spec)?;
                    out.push(data);
                }
                Err(e) => warn!(id, error = %e, "Skipping named location"),
            }
        }
        Ok(out)
    }
}
