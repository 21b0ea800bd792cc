//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AdminConfig (validated, immutable)
//!     → handed to AdminServer at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → mpsc channel to the server
//!     → release.targets swapped live, other sections need a restart
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AccountConfig, AdminConfig, AuthConfig, ObservabilityConfig, ReleaseConfig, ServerConfig,
    StoreConfig, TlsConfig,
};
pub use watcher::ConfigWatcher;
