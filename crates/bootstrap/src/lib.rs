//! Database bootstrap for the geo cloud API.
//!
//! Guarantees that an administrator account and a catalogue of geospatial
//! layers exist in the API's PostgreSQL store. Every write is a single
//! `INSERT ... ON CONFLICT` statement keyed by the record's natural key, so
//! the routine can be run any number of times, including by two deploy
//! pipelines at once, without duplicating rows.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use bootstrap::prelude::*;
//!
//! let config = BootstrapConfig::new("postgres://localhost/geo")
//!     .with_admin(AdminCredential::new("admin@demo.dev", "demo123"))
//!     .with_layer_key(LayerKey::Name);
//!
//! let report = bootstrap::run(config).await?;
//! println!("{report}");
//! ```

pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod models;
pub mod report;
pub mod seeder;

pub use seeder::run;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::config::{AdminCredential, BootstrapConfig, ConflictPolicy, LayerKey};
    pub use crate::errors::BootstrapError;
    pub use crate::models::{GeometryType, LayerSeed, Role, builtin_layer_seeds};
    pub use crate::report::{BootstrapReport, Tally, UpsertOutcome};
}
