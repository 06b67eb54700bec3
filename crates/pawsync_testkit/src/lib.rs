//! # Pawsync Testkit
//!
//! Test utilities for the Pawsync engine.
//!
//! This crate provides:
//! - An in-memory reference backend implementing the engine's `Gateway`
//! - A manually advanced clock shared by engine and backend
//! - A seeded marketplace and an engine harness that survives reopening
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pawsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn owner_sees_threads() {
//!     let t = TestEngine::new();
//!     t.sync(t.owner_params()).await.unwrap();
//!     assert_eq!(t.current().views.threads.len(), 2);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod clock;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::clock::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use backend::*;
pub use clock::*;
pub use fixtures::*;
pub use generators::*;
