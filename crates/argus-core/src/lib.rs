//! Core types for the argus security-telemetry collector.
//!
//! Everything the scheduler, publishers and vendor connectors share lives
//! here: the canonical event schema, severity normalisation, the URL
//! fingerprint that partitions checkpoint state, per-resource fetch
//! settings, and the [`SyncSink`] seam through which paginated fetches
//! stream their results.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod event;
mod fetch;
mod fingerprint;
mod provider;
mod severity;
mod sink;

pub use event::{
    Event, EventType, FileInfo, HostInfo, NetworkInfo, ParentProcessInfo, ProcessInfo, UserInfo,
};
pub use fetch::FetchSetting;
pub use fingerprint::{url_fingerprint, URL_HASH_KEY};
pub use provider::{Provider, UnknownProvider};
pub use severity::Severity;
pub use sink::{SinkError, SyncSink};
