//! The per-tenant synchronisation controller.
//!
//! Ticks on a fixed period, pulls the integration list per vendor, picks a
//! full-or-incremental plan per integration, opens a cancellation scope and
//! drives the vendor adapters resource by resource, streaming pages to the
//! publisher and advancing checkpoints as it goes.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod plan;
mod registry;
mod scheduler;

pub use plan::{select_plan, OracleObservation, PlanInputs, SyncPlan};
pub use registry::{SyncGuard, SyncRegistry};
pub use scheduler::{Scheduler, SchedulerConfig};
