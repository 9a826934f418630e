use std::path::Path;

use anyhow::{Context, Result};
use graphca_config::{load_manifest, load_manifests, Manifest};
use graphca_domain::{ResourceId, ResourceKind};
use graphca_provider::{Diagnostic, Provider, ResourceData};
use serde::Serialize;
use tracing::info;

use crate::cli::OutputFormat;
use crate::output;

// ── Create ────────────────────────────────────────────────────────────────────

pub async fn create(provider: &Provider, manifest: &Path, format: OutputFormat) -> Result<()> {
    let manifest = load_manifest(manifest)?;
    if let Some(id) = &manifest.id {
        anyhow::bail!(
            "{} already names object {}; use `graphca update` instead",
            manifest.source,
            id
        );
    }
    info!(kind = %manifest.kind, source = %manifest.source, "Creating");
    let data = provider.create(manifest.kind, manifest.fields).await?;
    print_resource(manifest.kind, &data, format)
}

// ── Read ──────────────────────────────────────────────────────────────────────

pub async fn read(provider: &Provider, kind: ResourceKind, id: &str, format: OutputFormat) -> Result<()> {
    let id = parse_id(id)?;
    match provider.read(kind, id.clone()).await? {
        Some(data) => print_resource(kind, &data, format),
        None => {
            match format {
                OutputFormat::Text => println!("{} {} no longer exists.", kind.noun(), id),
                OutputFormat::Json => println!("null"),
            }
            Ok(())
        }
    }
}

// ── Update ────────────────────────────────────────────────────────────────────

pub async fn update(
    provider: &Provider,
    kind: ResourceKind,
    id: &str,
    manifest: &Path,
    format: OutputFormat,
) -> Result<()> {
    let id = parse_id(id)?;
    let manifest = load_manifest(manifest)?;
    check_manifest_target(&manifest, kind, &id)?;
    info!(kind = %kind, id = %id, source = %manifest.source, "Updating");
    let data = provider.update(kind, id, manifest.fields).await?;
    print_resource(kind, &data, format)
}

// ── Delete ────────────────────────────────────────────────────────────────────

pub async fn delete(provider: &Provider, kind: ResourceKind, id: &str, format: OutputFormat) -> Result<()> {
    let id = parse_id(id)?;
    provider.delete(kind, id.clone()).await?;
    match format {
        OutputFormat::Text => println!("Deleted {} {}.", kind.noun(), id),
        OutputFormat::Json => print_json(&serde_json::json!({ "deleted": id })),
    }
    Ok(())
}

// ── Import ────────────────────────────────────────────────────────────────────

pub async fn import(provider: &Provider, kind: ResourceKind, id: &str, format: OutputFormat) -> Result<()> {
    let data = provider.import(kind, id).await?;
    print_resource(kind, &data, format)
}

// ── List ──────────────────────────────────────────────────────────────────────

pub async fn list(provider: &Provider, kind: ResourceKind, format: OutputFormat) -> Result<()> {
    let items = provider.list(kind).await?;
    match format {
        OutputFormat::Text => print!("{}", output::render_list(kind, &items)),
        OutputFormat::Json => print_json(&items),
    }
    Ok(())
}

// ── Validate ──────────────────────────────────────────────────────────────────

pub fn validate(provider: &Provider, path: &Path, format: OutputFormat) -> Result<()> {
    let manifests = if path.is_dir() {
        load_manifests(path)?
    } else {
        vec![load_manifest(path)?]
    };

    let mut failed = 0usize;
    for m in &manifests {
        match provider.validate(m.kind, m.fields.clone()) {
            Ok(()) => {
                if format == OutputFormat::Text {
                    println!("ok    {}", m.source);
                }
            }
            Err(diag) => {
                failed += 1;
                match format {
                    OutputFormat::Text => {
                        println!("fail  {}", m.source);
                        print!("{}", output::render_diagnostic(&diag));
                    }
                    OutputFormat::Json => print_json(&serde_json::json!({
                        "source":     m.source,
                        "diagnostic": diag,
                    })),
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} manifest(s) failed validation", failed, manifests.len());
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_id(id: &str) -> Result<ResourceId> {
    ResourceId::parse_uuid(id).with_context(|| format!("{:?} is not a Graph object ID", id))
}

/// The manifest must describe the object named on the command line.
fn check_manifest_target(manifest: &Manifest, kind: ResourceKind, id: &ResourceId) -> Result<()> {
    if manifest.kind != kind {
        anyhow::bail!("{} describes {}, not {}", manifest.source, manifest.kind, kind);
    }
    if let Some(other) = manifest.id.as_ref().filter(|m| *m != id) {
        anyhow::bail!("{} names object {}, not {}", manifest.source, other, id);
    }
    Ok(())
}

fn print_resource(kind: ResourceKind, data: &ResourceData, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", output::render_resource(kind, data)),
        OutputFormat::Json => print_json(data),
    }
    Ok(())
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

pub fn report_diagnostic(diag: &Diagnostic, format: OutputFormat) {
    match format {
        OutputFormat::Text => eprint!("{}", output::render_diagnostic(diag)),
        OutputFormat::Json => match serde_json::to_string_pretty(diag) {
            Ok(s) => eprintln!("{}", s),
            Err(_) => eprint!("{}", output::render_diagnostic(diag)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    const ID: &str = "5d0e3b0a-1c7f-4c4e-9f5e-2b8f6a1d9c33";

    fn manifest(kind: ResourceKind, id: Option<&str>) -> Manifest {
        Manifest {
            kind,
            id:     id.map(ResourceId::new),
            fields: Map::new(),
            source: "policy.yml".into(),
        }
    }

    #[test]
    fn parse_id_rejects_non_uuid() {
        let err = parse_id("office").unwrap_err();
        assert!(err.to_string().contains("not a Graph object ID"));
        assert_eq!(parse_id(ID).unwrap().as_str(), ID);
    }

    #[test]
    fn manifest_must_match_command_target() {
        let id = ResourceId::new(ID);
        let kind = ResourceKind::ConditionalAccessPolicy;

        assert!(check_manifest_target(&manifest(kind, None), kind, &id).is_ok());
        assert!(check_manifest_target(&manifest(kind, Some(ID)), kind, &id).is_ok());

        let err = check_manifest_target(&manifest(ResourceKind::NamedLocation, None), kind, &id)
            .unwrap_err();
        assert!(err.to_string().contains("describes azuread_named_location"));

        let other = "00000000-0000-0000-0000-000000000001";
        assert!(check_manifest_target(&manifest(kind, Some(other)), kind, &id).is_err());
    }
}
