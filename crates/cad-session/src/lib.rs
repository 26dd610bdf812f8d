//! The generate, validate, execute, persist and refine loop.
//!
//! A [`Session`] owns the [`HistoryLedger`] and the current head; a
//! [`RefinementController`] runs user operations against it.

pub mod config;
mod controller;
mod error;
mod ledger;
mod lock;
mod slug;
mod store;

pub use config::{Config, ConfigError};
pub use controller::{Download, Phase, RefinementController, Session};
pub use error::{ErrorKind, ExportError, OperationError, PersistenceError};
pub use ledger::{ArtifactRef, HistoryLedger, LEDGER_VERSION, Turn, TurnId, TurnStatus};
pub use lock::LedgerLock;
pub use slug::{FALLBACK_SLUG, MAX_SLUG_LEN, slugify};
pub use store::{ArtifactStore, StoredArtifact};
