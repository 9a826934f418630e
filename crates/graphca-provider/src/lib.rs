//! Resource lifecycle for Entra ID Conditional Access objects.
//!
//! Every write is followed by a polling wait ([`wait::StateChangeConf`])
//! until Microsoft Graph reads back what was written, since Graph reads
//! are served from eventually consistent replicas.

pub mod convergence;
pub mod data;
pub mod diagnostic;
pub mod error;
pub mod provider;
pub mod resource;
pub mod resources;
pub mod wait;

pub use convergence::{ConvergenceState, DeletionState};
pub use data::ResourceData;
pub use diagnostic::{Diagnostic, Severity};
pub use error::{Operation, ResourceError};
pub use provider::Provider;
pub use resource::Resource;
pub use resources::{
    AuthenticationStrengthPolicyResource, ConditionalAccessPolicyResource, NamedLocationResource,
};
pub use wait::{StateChangeConf, WaitError};
