//! Client for the control-plane service.
//!
//! The control plane owns integration credentials, per-integration sync
//! status, and durable checkpoint state. This crate exposes the narrow REST
//! contract the collector relies on; every request carries the shared
//! `X-Collector-Key` secret.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod error;
mod state;

pub use client::{ControlPlane, Integration, SyncStatus};
pub use error::ControlError;
pub use state::{StateStore, SyncState};
