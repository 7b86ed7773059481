//! Downstream columnar store.
//!
//! The `security_events` table is a ReplacingMergeTree keyed on
//! `(tenant_id, source, id)`: inserts are at-least-once and duplicates are
//! collapsed at merge time, which is what makes resumable, page-streamed
//! ingestion safe. This crate provides the batch insert, the completeness
//! oracle the sync planner consults, the explicit compaction hint, and the
//! schema migrations.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod migrate;
mod row;

pub use client::{ClickHouseClient, ClickHouseConfig, Completeness, DataStats, StoreError};
pub use migrate::run_migrations;
pub use row::EventRow;

/// Table receiving normalised events.
pub const EVENTS_TABLE: &str = "security_events";
