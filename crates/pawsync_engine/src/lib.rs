//! # Pawsync Engine
//!
//! Client-side state synchronization and booking coordination for the
//! Pawsync pet-services marketplace.
//!
//! This crate provides:
//! - A single published application state with a narrow mutation API
//! - The state synchronizer with cache fallback and request supersession
//! - Derived views (message threads, pet roster, listings, favorites)
//! - The booking and quote coordinator
//! - The optimistic mutation buffer with persisted, replayable writes
//! - Community operations and chat transcripts
//! - The `Gateway` port and a JSON-over-HTTP adapter
//!
//! ## Key Invariants
//!
//! - Published states are replaced whole, never mutated in place
//! - Only the most recently issued sync may publish
//! - A buffered entity stays visible until the server copy carrying its
//!   client reference is seen
//! - Reminder flags on quote targets are never cleared locally

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod chat;
mod community;
mod config;
mod coordinator;
mod engine;
mod error;
mod gateway;
mod http;
mod snapshot;
mod store;
mod sync;
pub mod views;

pub use buffer::{Committed, MutationBuffer, PendingWrite, ReplayReport};
pub use chat::ChatSession;
pub use community::Community;
pub use config::{EngineConfig, Environment};
pub use coordinator::{BookingReceipt, Coordinator, QuoteReceipt};
pub use engine::{ActionOutcome, Engine};
pub use error::{EngineError, EngineResult};
pub use gateway::{Gateway, GatewayError, GatewayResult};
pub use http::{HttpClient, HttpGateway, HttpRequest, HttpResponse, Method};
pub use snapshot::{CachedSnapshot, SnapshotStore, FORMAT_VERSION};
pub use store::{AppState, ConnectionMode, StateStore};
pub use sync::{SyncParams, SyncReport, SyncToken, Synchronizer};
pub use views::{DerivedViews, ViewDay};
