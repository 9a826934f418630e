use graphca_domain::ResourceKind;
use graphca_provider::{Diagnostic, ResourceData};
use serde_json::Value;

/// Render one resource as a header line followed by its attributes as YAML.
pub fn render_resource(kind: ResourceKind, data: &ResourceData) -> String {
    let id = data.id().map(|id| id.as_str()).unwrap_or("<none>");
    let mut out = format!("{} {}\n", kind, id);
    let body = serde_yaml::to_string(data.fields()).unwrap_or_default();
    for line in body.lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// One line per object: ID and display name.
pub fn render_list(kind: ResourceKind, items: &[ResourceData]) -> String {
    if items.is_empty() {
        return format!("No {} objects.\n", kind.noun());
    }
    let mut out = String::new();
    for item in items {
        let id = item.id().map(|id| id.as_str()).unwrap_or("<none>");
        let name = item.get("display_name").and_then(Value::as_str).unwrap_or("");
        out.push_str(&format!("{}  {}\n", id, name));
    }
    out
}

pub fn render_diagnostic(diag: &Diagnostic) -> String {
    let mut out = format!("Error: {}\n", diag.summary);
    if let Some(attr) = &diag.attribute {
        out.push_str(&format!("  attribute: {}\n", attr));
    }
    if let Some(detail) = &diag.detail {
        out.push_str(&format!("  {}\n", detail));
    }
    out
}
