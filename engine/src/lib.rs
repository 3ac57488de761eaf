//! # Quay Engine
//!
//! The deterministic core of the Quay reconciliation engine.
//!
//! Quay merges batches of remote model changes into a local, offline-first
//! datastore. This crate holds the pure half of that work: given what the
//! remote side delivered, what local mutations are still in flight, and what
//! versions the local store last applied, it decides what happens to each
//! incoming change. The async pipeline that executes those decisions lives
//! in the `quay-sync` crate.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of storage, network, or runtime
//! - **Deterministic**: same inputs always produce the same decisions
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Remote models
//!
//! A [`RemoteModel`] is a row as the remote service last saw it: a JSON
//! payload plus [`SyncMetadata`] (version, tombstone flag, last-changed
//! timestamp). Versions increase monotonically per id.
//!
//! ### Pending mutations
//!
//! Local writes await acknowledgement in an outbox as [`PendingMutation`]
//! entries. The [`filter`](filter::filter) drops incoming remote changes
//! that would clobber an in-flight local write: a remote change passes only
//! if its version strictly exceeds the version the pending mutation was
//! issued against.
//!
//! ### Dispositions
//!
//! The [`resolver`](disposition::resolve) compares each surviving remote
//! model with the locally stored [`SyncMetadata`] and classifies it as a
//! [`Disposition`]: create, update, or delete. Stale and equal-version
//! changes are dropped; delivery is assumed idempotent.
//!
//! ### Events
//!
//! Every model in a batch ends as exactly one [`ReconciliationEvent`]:
//! applied with a [`MutationRecord`], or dropped with a [`DropReason`].

pub mod disposition;
pub mod error;
pub mod event;
pub mod filter;
pub mod model;
pub mod mutation;

// Re-export main types at crate root
pub use disposition::{resolve, resolve_one, Disposition, Resolution};
pub use error::Error;
pub use event::{DropReason, ReconciliationEvent};
pub use filter::filter;
pub use model::{MutationRecord, RemoteModel, SyncMetadata};
pub use mutation::{MutationKind, PendingMutation};

/// Type aliases for clarity
pub type ModelId = String;
pub type ModelName = String;
pub type Version = u64;
pub type Timestamp = u64;
