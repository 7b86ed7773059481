//! Event publishing.
//!
//! Events go straight into ClickHouse when a connection is available;
//! otherwise they are serialised as line-delimited JSON and posted to the
//! Vector pipeline service, which owns delivery from there. Either way
//! delivery is at-least-once and the merge-on-read table downstream absorbs
//! duplicates.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod publisher;

pub use publisher::{PublishError, Publisher};

/// Batch size for generic callers.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Batch size the sync controller uses; larger batches reduce merge
/// pressure on the downstream table.
pub const CONTROLLER_BATCH_SIZE: usize = 5_000;
