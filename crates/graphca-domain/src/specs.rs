use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::DomainError;
use crate::types::{parse_cidr, CountryLookupMethod, GrantOperator, PolicyState};

// ── Validation helpers ───────────────────────────────────────────────────────

fn require_non_empty(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::EmptyField { field: field.to_string() });
    }
    Ok(())
}

fn require_unique(field: &str, values: &[String]) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for v in values {
        require_non_empty(field, v)?;
        if !seen.insert(v.as_str()) {
            return Err(DomainError::DuplicateValue {
                field: field.to_string(),
                value: v.clone(),
            });
        }
    }
    Ok(())
}

/// Sort and dedup a set-valued field so two observations compare equal
/// regardless of the order Graph returns them in.
pub fn normalize_set(values: &[String]) -> Vec<String> {
    let mut out = values.to_vec();
    out.sort();
    out.dedup();
    out
}

// ── Authentication strength policy ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationStrengthSpec {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub allowed_combinations: Vec<String>,
}

impl AuthenticationStrengthSpec {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_non_empty("display_name", &self.display_name)?;
        if let Some(d) = &self.description {
            require_non_empty("description", d)?;
        }
        if self.allowed_combinations.is_empty() {
            return Err(DomainError::EmptyField { field: "allowed_combinations".into() });
        }
        require_unique("allowed_combinations", &self.allowed_combinations)
    }

    pub fn normalized(&self) -> Self {
        Self {
            display_name:         self.display_name.clone(),
            description:          self.description.clone(),
            allowed_combinations: normalize_set(&self.allowed_combinations),
        }
    }
}

// ── Named location ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpCriteria {
    pub ip_ranges: Vec<String>,
    #[serde(default)]
    pub trusted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCriteria {
    pub countries_and_regions: Vec<String>,
    #[serde(default)]
    pub include_unknown_countries_and_regions: bool,
    #[serde(default)]
    pub country_lookup_method: CountryLookupMethod,
}

/// Location-matching criteria; exactly one kind per named location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationCriteria {
    Ip(IpCriteria),
    Country(CountryCriteria),
}

/// Field layout mirrors the resource schema: an `ip` block or a `country`
/// block, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedLocationSpec {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<CountryCriteria>,
}

impl NamedLocationSpec {
    pub fn from_criteria(display_name: impl Into<String>, criteria: LocationCriteria) -> Self {
        let display_name = display_name.into();
        match criteria {
            LocationCriteria::Ip(ip) => Self { display_name, ip: Some(ip), country: None },
            LocationCriteria::Country(c) => Self { display_name, ip: None, country: Some(c) },
        }
    }

    pub fn criteria(&self) -> Result<LocationCriteria, DomainError> {
        match (&self.ip, &self.country) {
            (Some(ip), None) => Ok(LocationCriteria::Ip(ip.clone())),
            (None, Some(c)) => Ok(LocationCriteria::Country(c.clone())),
            (Some(_), Some(_)) => Err(DomainError::ConflictingLocationBlocks),
            (None, None) => Err(DomainError::MissingLocationBlock),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        require_non_empty("display_name", &self.display_name)?;
        match self.criteria()? {
            LocationCriteria::Ip(ip) => {
                if ip.ip_ranges.is_empty() {
                    return Err(DomainError::EmptyField { field: "ip.ip_ranges".into() });
                }
                require_unique("ip.ip_ranges", &ip.ip_ranges)?;
                for range in &ip.ip_ranges {
                    parse_cidr(range)?;
                }
            }
            LocationCriteria::Country(c) => {
                if c.countries_and_regions.is_empty() {
                    return Err(DomainError::EmptyField {
                        field: "country.countries_and_regions".into(),
                    });
                }
                require_unique("country.countries_and_regions", &c.countries_and_regions)?;
                if c.country_lookup_method == CountryLookupMethod::Unknown {
                    return Err(DomainError::InvalidConfig(
                        "country.country_lookup_method is not a supported value".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn normalized(&self) -> Self {
        Self {
            display_name: self.display_name.clone(),
            ip: self.ip.as_ref().map(|ip| IpCriteria {
                ip_ranges: normalize_set(&ip.ip_ranges),
                trusted:   ip.trusted,
            }),
            country: self.country.as_ref().map(|c| CountryCriteria {
                countries_and_regions: normalize_set(&c.countries_and_regions),
                ..c.clone()
            }),
        }
    }
}

// ── Conditional access policy ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationConditions {
    #[serde(default)]
    pub included_applications: Vec<String>,
    #[serde(default)]
    pub excluded_applications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserConditions {
    #[serde(default)]
    pub included_users: Vec<String>,
    #[serde(default)]
    pub excluded_users: Vec<String>,
    #[serde(default)]
    pub included_groups: Vec<String>,
    #[serde(default)]
    pub excluded_groups: Vec<String>,
    #[serde(default)]
    pub included_roles: Vec<String>,
    #[serde(default)]
    pub excluded_roles: Vec<String>,
}

impl UserConditions {
    fn is_empty(&self) -> bool {
        self.included_users.is_empty()
            && self.included_groups.is_empty()
            && self.included_roles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocationConditions {
    #[serde(default)]
    pub included_locations: Vec<String>,
    #[serde(default)]
    pub excluded_locations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformConditions {
    #[serde(default)]
    pub included_platforms: Vec<String>,
    #[serde(default)]
    pub excluded_platforms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyConditions {
    pub client_app_types: Vec<String>,
    pub applications: ApplicationConditions,
    pub users: UserConditions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<LocationConditions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<PlatformConditions>,
    #[serde(default)]
    pub sign_in_risk_levels: Vec<String>,
    #[serde(default)]
    pub user_risk_levels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GrantControlsSpec {
    #[serde(default)]
    pub operator: GrantOperator,
    #[serde(default)]
    pub built_in_controls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_strength_policy_id: Option<String>,
    #[serde(default)]
    pub terms_of_use: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalAccessPolicySpec {
    pub display_name: String,
    pub state: PolicyState,
    pub conditions: PolicyConditions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_controls: Option<GrantControlsSpec>,
}

impl ConditionalAccessPolicySpec {
    /// Sort every set-valued field and drop empty optional blocks, so a
    /// policy read back from Graph compares equal to the one written.
    pub fn normalized(&self) -> Self {
        let c = &self.conditions;
        let conditions = PolicyConditions {
            client_app_types: normalize_set(&c.client_app_types),
            applications: ApplicationConditions {
                included_applications: normalize_set(&c.applications.included_applications),
                excluded_applications: normalize_set(&c.applications.excluded_applications),
            },
            users: UserConditions {
                included_users:  normalize_set(&c.users.included_users),
                excluded_users:  normalize_set(&c.users.excluded_users),
                included_groups: normalize_set(&c.users.included_groups),
                excluded_groups: normalize_set(&c.users.excluded_groups),
                included_roles:  normalize_set(&c.users.included_roles),
                excluded_roles:  normalize_set(&c.users.excluded_roles),
            },
            locations: c
                .locations
                .as_ref()
                .map(|l| LocationConditions {
                    included_locations: normalize_set(&l.included_locations),
                    excluded_locations: normalize_set(&l.excluded_locations),
                })
                .filter(|l| *l != LocationConditions::default()),
            platforms: c
                .platforms
                .as_ref()
                .map(|p| PlatformConditions {
                    included_platforms: normalize_set(&p.included_platforms),
                    excluded_platforms: normalize_set(&p.excluded_platforms),
                })
                .filter(|p| *p != PlatformConditions::default()),
            sign_in_risk_levels: normalize_set(&c.sign_in_risk_levels),
            user_risk_levels:    normalize_set(&c.user_risk_levels),
        };
        let grant_controls = self.grant_controls.as_ref().map(|g| GrantControlsSpec {
            operator:                          g.operator,
            built_in_controls:                 normalize_set(&g.built_in_controls),
            authentication_strength_policy_id: g.authentication_strength_policy_id.clone(),
            terms_of_use:                      normalize_set(&g.terms_of_use),
        });
        Self {
            display_name: self.display_name.clone(),
            state: self.state,
            conditions,
            grant_controls,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        require_non_empty("display_name", &self.display_name)?;
        if self.state == PolicyState::Unknown {
            return Err(DomainError::InvalidConfig("state is not a supported value".into()));
        }
        if self.conditions.client_app_types.is_empty() {
            return Err(DomainError::EmptyField { field: "conditions.client_app_types".into() });
        }
        if self.conditions.applications.included_applications.is_empty() {
            return Err(DomainError::EmptyField {
                field: "conditions.applications.included_applications".into(),
            });
        }
        if self.conditions.users.is_empty() {
            return Err(DomainError::InvalidConfig(
                "conditions.users must include at least one user, group or role".into(),
            ));
        }
        if let Some(g) = &self.grant_controls {
            if g.built_in_controls.is_empty()
                && g.authentication_strength_policy_id.is_none()
                && g.terms_of_use.is_empty()
            {
                return Err(DomainError::InvalidConfig(
                    "grant_controls requires built_in_controls, authentication_strength_policy_id or terms_of_use"
                        .into(),
                ));
            }
        }
        Ok(())
    }
}
