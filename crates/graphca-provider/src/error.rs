use std::fmt;
use std::time::Duration;

use graphca_domain::{DomainError, ResourceId, ResourceKind};
use graphca_graph::GraphError;
use thiserror::Error;

use crate::wait::WaitError;

/// Lifecycle step an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
    List,
}

impl Operation {
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Import => "import",
            Operation::List => "list",
        }
    }

    pub fn noun(&self) -> &'static str {
        match self {
            Operation::Create => "creation",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "deletion",
            Operation::Import => "import",
            Operation::List => "listing",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

fn with_id(id: &Option<ResourceId>) -> String {
    match id {
        Some(id) => format!(" with ID {:?}", id.as_str()),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid {} configuration: {source}", .kind.noun())]
    Validation {
        kind: ResourceKind,
        #[source]
        source: DomainError,
    },

    #[error("decoding {} attributes: {source}", .kind.noun())]
    Schema {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not {op} {}{}: {source}", .kind.noun(), with_id(.id))]
    Api {
        op:   Operation,
        kind: ResourceKind,
        id:   Option<ResourceId>,
        #[source]
        source: GraphError,
    },

    #[error("bad API response while trying to {op} {}{}: {message}", .kind.noun(), with_id(.id))]
    BadResponse {
        op:      Operation,
        kind:    ResourceKind,
        id:      Option<ResourceId>,
        message: String,
    },

    #[error("waiting for {} of {} with ID {:?}: {source}", .op.noun(), .kind.noun(), .id.as_str())]
    Wait {
        op:   Operation,
        kind: ResourceKind,
        id:   ResourceId,
        #[source]
        source: WaitError<GraphError>,
    },

    #[error("{} of {}{} timed out after {timeout:?}", .op.noun(), .kind.noun(), with_id(.id))]
    Deadline {
        op:      Operation,
        kind:    ResourceKind,
        id:      Option<ResourceId>,
        timeout: Duration,
    },

    #[error("{} with ID {:?} does not exist", .kind.noun(), .id.as_str())]
    NotFound {
        op:   Operation,
        kind: ResourceKind,
        id:   ResourceId,
    },

    #[error("cannot {op} {} without an ID", .kind.noun())]
    MissingId { op: Operation, kind: ResourceKind },
}

impl ResourceError {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceError::Validation { kind, .. }
            | ResourceError::Schema { kind, .. }
            | ResourceError::Api { kind, .. }
            | ResourceError::BadResponse { kind, .. }
            | ResourceError::Wait { kind, .. }
            | ResourceError::Deadline { kind, .. }
            | ResourceError::NotFound { kind, .. }
            | ResourceError::MissingId { kind, .. } => *kind,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            ResourceError::Validation { .. } | ResourceError::Schema { .. } => None,
            ResourceError::Api { op, .. }
            | ResourceError::BadResponse { op, .. }
            | ResourceError::Wait { op, .. }
            | ResourceError::Deadline { op, .. }
            | ResourceError::NotFound { op, .. }
            | ResourceError::MissingId { op, .. } => Some(*op),
        }
    }

    /// Attribute path the error points at, when it concerns a single field.
    pub fn attribute(&self) -> Option<String> {
        match self {
            ResourceError::Validation { source, .. } => match source {
                DomainError::EmptyField { field } | DomainError::DuplicateValue { field, .. } => {
                    Some(field.clone())
                }
                DomainError::InvalidCidr(_) => Some("ip.ip_ranges".into()),
                DomainError::InvalidId { .. } => Some("id".into()),
                _ => None,
            },
            ResourceError::Api { op: Operation::Delete, .. } => Some("id".into()),
            ResourceError::NotFound { .. } | ResourceError::MissingId { .. } => Some("id".into()),
            _ => None,
        }
    }
}
