//! CiteForge Common Library
//!
//! Shared code for the CiteForge graph engine and explorer including:
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability
//! - Entity type vocabulary
//! - Expansion query compiler
//! - Upstream metadata provider client

pub mod config;
pub mod errors;
pub mod metrics;
pub mod provider;
pub mod query;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use provider::{EntityProvider, MockProvider, OpenAlexProvider, SearchParams};
pub use query::{CompiledQuery, ExpansionSettings, FilterCriteria, FilterOperator, SortCriteria};
pub use types::EntityType;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
