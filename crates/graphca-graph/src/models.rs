use chrono::{DateTime, Utc};
use graphca_domain::{parse_cidr, CidrFamily, CountryLookupMethod, DomainError, GrantOperator, PolicyState};
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ── Authentication strength policies ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticationStrengthPolicyType {
    BuiltIn,
    Custom,
    #[serde(other)]
    Unknown,
}

/// Read-only properties are never sent back on create or update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationStrengthPolicy {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing)]
    pub policy_type: Option<AuthenticationStrengthPolicyType>,
    #[serde(default, skip_serializing)]
    pub requirements_satisfied: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_combinations: Option<Vec<String>>,
    #[serde(default, skip_serializing)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub modified_date_time: Option<DateTime<Utc>>,
}

// ── Named locations ──────────────────────────────────────────────────────────

pub const IP_NAMED_LOCATION: &str = "#microsoft.graph.ipNamedLocation";
pub const COUNTRY_NAMED_LOCATION: &str = "#microsoft.graph.countryNamedLocation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@odata.type")]
pub enum IpRange {
    #[serde(rename = "#microsoft.graph.iPv4CidrRange")]
    V4 {
        #[serde(rename = "cidrAddress")]
        cidr_address: String,
    },
    #[serde(rename = "#microsoft.graph.iPv6CidrRange")]
    V6 {
        #[serde(rename = "cidrAddress")]
        cidr_address: String,
    },
}

impl IpRange {
    pub fn from_cidr(cidr: &str) -> Result<Self, DomainError> {
        let cidr_address = cidr.to_string();
        Ok(match parse_cidr(cidr)? {
            CidrFamily::V4 => IpRange::V4 { cidr_address },
            CidrFamily::V6 => IpRange::V6 { cidr_address },
        })
    }

    pub fn cidr(&self) -> &str {
        match self {
            IpRange::V4 { cidr_address } | IpRange::V6 { cidr_address } => cidr_address,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpNamedLocation {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_ranges: Option<Vec<IpRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trusted: Option<bool>,
    #[serde(default, skip_serializing)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub modified_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryNamedLocation {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countries_and_regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_unknown_countries_and_regions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_lookup_method: Option<CountryLookupMethod>,
    #[serde(default, skip_serializing)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub modified_date_time: Option<DateTime<Utc>>,
}

/// A named location as returned by Graph, discriminated on `@odata.type`.
///
/// Subtypes this client does not model decode to `Unrecognized` rather than
/// failing, so callers can report them explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum NamedLocation {
    Ip(IpNamedLocation),
    Country(CountryNamedLocation),
    Unrecognized {
        odata_type: Option<String>,
        id:         Option<String>,
    },
}

impl NamedLocation {
    pub fn id(&self) -> Option<&str> {
        match self {
            NamedLocation::Ip(l) => l.id.as_deref(),
            NamedLocation::Country(l) => l.id.as_deref(),
            NamedLocation::Unrecognized { id, .. } => id.as_deref(),
        }
    }

    pub fn odata_type(&self) -> Option<&str> {
        match self {
            NamedLocation::Ip(_) => Some(IP_NAMED_LOCATION),
            NamedLocation::Country(_) => Some(COUNTRY_NAMED_LOCATION),
            NamedLocation::Unrecognized { odata_type, .. } => odata_type.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "@odata.type")]
    odata_type: &'a str,
    #[serde(flatten)]
    inner: &'a T,
}

impl Serialize for NamedLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NamedLocation::Ip(l) => Tagged { odata_type: IP_NAMED_LOCATION, inner: l }.serialize(serializer),
            NamedLocation::Country(l) => {
                Tagged { odata_type: COUNTRY_NAMED_LOCATION, inner: l }.serialize(serializer)
            }
            NamedLocation::Unrecognized { odata_type, .. } => Err(S::Error::custom(format!(
                "cannot serialize unrecognized named location type {:?}",
                odata_type
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for NamedLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let odata_type = value
            .get("@odata.type")
            .and_then(Value::as_str)
            .map(str::to_string);
        match odata_type.as_deref() {
            Some(IP_NAMED_LOCATION) => serde_json::from_value(value)
                .map(NamedLocation::Ip)
                .map_err(D::Error::custom),
            Some(COUNTRY_NAMED_LOCATION) => serde_json::from_value(value)
                .map(NamedLocation::Country)
                .map_err(D::Error::custom),
            _ => Ok(NamedLocation::Unrecognized {
                id: value.get("id").and_then(Value::as_str).map(str::to_string),
                odata_type,
            }),
        }
    }
}

// ── Conditional access policies ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessApplications {
    #[serde(default)]
    pub include_applications: Vec<String>,
    #[serde(default)]
    pub exclude_applications: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessUsers {
    #[serde(default)]
    pub include_users: Vec<String>,
    #[serde(default)]
    pub exclude_users: Vec<String>,
    #[serde(default)]
    pub include_groups: Vec<String>,
    #[serde(default)]
    pub exclude_groups: Vec<String>,
    #[serde(default)]
    pub include_roles: Vec<String>,
    #[serde(default)]
    pub exclude_roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessLocations {
    #[serde(default)]
    pub include_locations: Vec<String>,
    #[serde(default)]
    pub exclude_locations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessPlatforms {
    #[serde(default)]
    pub include_platforms: Vec<String>,
    #[serde(default)]
    pub exclude_platforms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessConditionSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications: Option<ConditionalAccessApplications>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<ConditionalAccessUsers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_app_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<ConditionalAccessLocations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<ConditionalAccessPlatforms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_risk_levels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_risk_levels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationStrengthReference {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessGrantControls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<GrantOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_in_controls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_strength: Option<AuthenticationStrengthReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_use: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessPolicy {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PolicyState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionalAccessConditionSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_controls: Option<ConditionalAccessGrantControls>,
    #[serde(default, skip_serializing)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub modified_date_time: Option<DateTime<Utc>>,
}
