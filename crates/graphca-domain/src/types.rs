use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::DomainError;

// ── Endpoints ────────────────────────────────────────────────────────────────

pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com";
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Object ID assigned by Microsoft Graph when a resource is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(s: impl Into<String>) -> Self {
        ResourceId(s.into())
    }

    /// Parse an ID supplied on import. Graph object IDs are always UUIDs.
    pub fn parse_uuid(s: &str) -> Result<Self, DomainError> {
        uuid::Uuid::parse_str(s).map_err(|e| DomainError::InvalidId {
            id: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(ResourceId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Resource kinds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "azuread_authentication_strength_policy")]
    AuthenticationStrengthPolicy,
    #[serde(rename = "azuread_named_location")]
    NamedLocation,
    #[serde(rename = "azuread_conditional_access_policy")]
    ConditionalAccessPolicy,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::AuthenticationStrengthPolicy,
        ResourceKind::NamedLocation,
        ResourceKind::ConditionalAccessPolicy,
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::AuthenticationStrengthPolicy => "azuread_authentication_strength_policy",
            ResourceKind::NamedLocation => "azuread_named_location",
            ResourceKind::ConditionalAccessPolicy => "azuread_conditional_access_policy",
        }
    }

    /// Noun used in log lines and error messages.
    pub fn noun(&self) -> &'static str {
        match self {
            ResourceKind::AuthenticationStrengthPolicy => "authentication strength policy",
            ResourceKind::NamedLocation => "named location",
            ResourceKind::ConditionalAccessPolicy => "conditional access policy",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl FromStr for ResourceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.type_name() == s)
            .ok_or_else(|| DomainError::UnknownResourceType(s.to_string()))
    }
}

// ── Enums ─────────────────────────────────────────────────────────────────────
//
// Graph enums that may grow carry an `Unknown` catch-all so reads of objects
// using a newer value still decode. Specs reject `Unknown` on write.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyState {
    Enabled,
    Disabled,
    EnabledForReportingButNotEnforced,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for PolicyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyState::Enabled => write!(f, "enabled"),
            PolicyState::Disabled => write!(f, "disabled"),
            PolicyState::EnabledForReportingButNotEnforced => {
                write!(f, "enabledForReportingButNotEnforced")
            }
            PolicyState::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CountryLookupMethod {
    #[default]
    ClientIpAddress,
    AuthenticatorAppGps,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GrantOperator {
    #[default]
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "AND")]
    And,
}

/// Address family of a CIDR range, which selects the Graph range subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CidrFamily {
    V4,
    V6,
}

/// Parse `addr/prefix` and return its family.
pub fn parse_cidr(s: &str) -> Result<CidrFamily, DomainError> {
    let invalid = || DomainError::InvalidCidr(s.to_string());
    let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    match addr {
        IpAddr::V4(_) if prefix <= 32 => Ok(CidrFamily::V4),
        IpAddr::V6(_) if prefix <= 128 => Ok(CidrFamily::V6),
        _ => Err(invalid()),
    }
}
