use clap::{Parser, Subcommand, ValueEnum};
use graphca_domain::ResourceKind;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "graphca",
    about = "Manage Entra ID Conditional Access objects through Microsoft Graph",
    version
)]
pub struct Cli {
    /// Provider config file. ARM_* environment variables override its values.
    #[arg(long, env = "GRAPHCA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the resource described by a manifest.
    Create {
        manifest: PathBuf,
    },

    /// Read one object by ID.
    Read {
        #[arg(value_name = "TYPE")]
        kind: ResourceKind,
        id:   String,
    },

    /// Update an existing object from a manifest.
    Update {
        #[arg(value_name = "TYPE")]
        kind:     ResourceKind,
        id:       String,
        manifest: PathBuf,
    },

    /// Delete an object and wait until Graph stops returning it.
    Delete {
        #[arg(value_name = "TYPE")]
        kind: ResourceKind,
        id:   String,
    },

    /// Validate an object ID and read the object.
    Import {
        #[arg(value_name = "TYPE")]
        kind: ResourceKind,
        id:   String,
    },

    /// List every object of a type.
    List {
        #[arg(value_name = "TYPE")]
        kind: ResourceKind,
    },

    /// Check manifests without calling Graph. Accepts a file or a directory.
    Validate {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_resource_type_names() {
        let cli = Cli::try_parse_from([
            "graphca",
            "read",
            "azuread_named_location",
            "00000000-0000-0000-0000-000000000001",
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Command::Read { kind, id } => {
                assert_eq!(kind, ResourceKind::NamedLocation);
                assert_eq!(id, "00000000-0000-0000-0000-000000000001");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_resource_type() {
        assert!(Cli::try_parse_from(["graphca", "list", "azuread_group"]).is_err());
    }
}
