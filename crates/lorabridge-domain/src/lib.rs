pub mod command;
pub mod decoder;
pub mod error;
pub mod liveness;
pub mod relay_service;
pub mod repository;
pub mod types;
pub mod uplink;

pub use error::{DomainError, DomainResult};
pub use relay_service::{RelayConfig, RelayService};
