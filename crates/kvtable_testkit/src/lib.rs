//! # kvtable testkit
//!
//! Test utilities for kvtable.
//!
//! This crate provides:
//! - Fixtures: in-memory databases with the students schema and example
//!   tables
//! - Property-based test generators using proptest
//! - Logging setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kvtable_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_students() {
//!     init_logging();
//!     let school = School::open().await;
//!     school.seed_times().await;
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_logging;
}

pub use fixtures::*;
pub use generators::*;

/// Installs a test-friendly `tracing` subscriber.
///
/// Honors `RUST_LOG` and defaults to `warn`. Safe to call from every test;
/// only the first call installs anything.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
