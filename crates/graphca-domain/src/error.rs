use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("specified ID ({id:?}) is not valid: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("`{field}` must not be empty")]
    EmptyField { field: String },

    #[error("`{field}` contains duplicate value {value:?}")]
    DuplicateValue { field: String, value: String },

    #[error("invalid CIDR range {0:?}")]
    InvalidCidr(String),

    #[error("one of `ip` or `country` must be specified")]
    MissingLocationBlock,

    #[error("only one of `ip` or `country` may be specified")]
    ConflictingLocationBlocks,

    #[error("unknown resource type {0:?}")]
    UnknownResourceType(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
