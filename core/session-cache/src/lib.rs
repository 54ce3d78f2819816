//! # validator-session-cache
//!
//! Maps a validation context (test suite, validator backend, suite options) to
//! the id of an external validator session that was already provisioned for
//! it, and keeps that mapping in SQLite so it survives restarts.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Callers can wrap with async if needed.
//! - **Explicitly constructed**: No global state. Build a [`SessionStore`], hand it to a
//!   [`SessionResolver`], and inject that wherever sessions are resolved.
//! - **No I/O to the validator**: Creating external sessions is the caller's job.
//! - **Errors are not misses**: Storage failures surface as [`CacheError`], never as `NotFound`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use validator_session_cache::{ResolveOutcome, SessionResolver, SessionStore, ValidationContext};
//!
//! let resolver = SessionResolver::new(SessionStore::new(db_path)?);
//! let ctx = ValidationContext::new("us_core", "fhir_validator", options);
//! let session_id = match resolver.resolve_or_prepare(&ctx)? {
//!     ResolveOutcome::Found(id) => id,
//!     ResolveOutcome::NotFound => {
//!         let id = validator_client.create_session(&ctx)?;
//!         resolver.record_new_session(&ctx, &id)?;
//!         id
//!     }
//! };
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod key;
pub mod resolver;
pub mod store;

pub use config::{load_config, CacheConfig, JournalMode, StoreConfig, SyncMode};
pub use context::{SuiteOptionSet, ValidationContext, ValidatorSessionRecord};
pub use error::{CacheError, Result, StorageFailure};
pub use key::{canonicalize, CanonicalKey};
pub use resolver::{ResolveOutcome, SessionResolver};
pub use store::{InsertOutcome, SessionStore, StoredSession, UpsertOutcome};
