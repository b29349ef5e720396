//! Lumen language server session runtime.
//!
//! Built on the [`lumen_lsp`] framework, a session keeps the client's open documents
//! in a sharded [`DocumentStore`], applies incremental edits, publishes debounced
//! lexical diagnostics, answers hover and completion from immutable snapshots, and
//! issues its own requests toward the client (progress, workspace edits and dynamic
//! registration).
//!
//! - [`edit`]: Pure incremental edit engine over ropes.
//! - [`vfs`]: The document store.
//! - [`diagnostics`]: Marker rules and the per-URI debounce scheduler.
//! - [`features`]: Hover and completion providers.
//! - [`outbound`] / [`progress`]: Server-initiated requests, bounded by a timeout.
//! - [`triggers`]: `test/*` requests that exercise the outbound flows.
//! - [`session`]: Handler wiring and [`serve`].
#![warn(missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod edit;
pub mod error;
pub mod features;
pub mod outbound;
pub mod progress;
pub mod session;
pub mod triggers;
pub mod vfs;

pub use config::ServerConfig;
pub use error::{ConfigError, EditError, SessionError, StoreError};
pub use features::{DefaultFeatures, FeatureProvider};
pub use session::{serve, serve_with};
pub use vfs::{DocumentSnapshot, DocumentStore};
