//! Shared foundation for the Helmsman control plane: the entity model,
//! configuration loading, and the error taxonomy used across the manager
//! and the per-node agent.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AgentConfig, ManagerConfig};
pub use error::{HelmsmanError, HelmsmanResult};
