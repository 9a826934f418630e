use std::fmt;

use serde::Serialize;

use crate::error::ResourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// User-facing failure report for one lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity:  Severity,
    pub summary:   String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail:    Option<String>,
    /// Attribute path the diagnostic refers to, e.g. `ip.ip_ranges`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity:  Severity::Error,
            summary:   summary.into(),
            detail:    None,
            attribute: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        if let Some(attr) = &self.attribute {
            write!(f, " (attribute `{}`)", attr)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

impl From<&ResourceError> for Diagnostic {
    fn from(err: &ResourceError) -> Self {
        let noun = err.kind().noun();
        let summary = match err {
            ResourceError::Validation { .. } | ResourceError::Schema { .. } => {
                format!("Invalid {} configuration", noun)
            }
            ResourceError::Wait { op, id, .. } => {
                format!("Waiting for {} of {} with ID {:?}", op.noun(), noun, id.as_str())
            }
            ResourceError::Deadline { op, .. } => format!("Timed out during {} of {}", op.noun(), noun),
            ResourceError::BadResponse { .. } => "Bad API response".to_string(),
            ResourceError::NotFound { op, .. } => format!("Could not {} {}: not found", op, noun),
            ResourceError::Api { op, .. } | ResourceError::MissingId { op, .. } => {
                format!("Could not {} {}", op, noun)
            }
        };
        Diagnostic {
            severity: Severity::Error,
            summary,
            detail: Some(err.to_string()),
            attribute: err.attribute(),
        }
    }
}

impl From<ResourceError> for Diagnostic {
    fn from(err: ResourceError) -> Self {
        Diagnostic::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphca_domain::{DomainError, ResourceKind};

    #[test]
    fn validation_diagnostic_carries_attribute() {
        let err = ResourceError::Validation {
            kind:   ResourceKind::NamedLocation,
            source: DomainError::InvalidCidr("10.0.0.0/99".into()),
        };
        let diag = Diagnostic::from(&err);
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.summary, "Invalid named location configuration");
        assert_eq!(diag.attribute.as_deref(), Some("ip.ip_ranges"));
        assert!(diag.to_string().contains("10.0.0.0/99"));
    }
}
