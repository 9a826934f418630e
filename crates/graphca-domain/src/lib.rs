pub mod error;
pub mod specs;
pub mod types;


pub use error::DomainError;
pub use specs::*;
pub use types::*;
