//! SentinelOne adapter.
//!
//! Pulls threats, activities and cloud-detection alerts over the v2.1
//! management API with cursor pagination, transforms each page into
//! canonical events and streams it through the controller-supplied sink.
//! Authentication is a static API token; no token lifecycle to manage.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod error;
mod types;

pub use client::SentinelOneClient;
pub use config::{FetchSettings, SentinelOneConfig};
pub use error::SentinelOneError;
