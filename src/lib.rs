//! Storage-array monitoring core
//!
//! Two independent pipelines share the persistence collaborator and the
//! driver layer:
//!
//! - SNMP notifications are received by the [`actors::TrapReceiverHandle`],
//!   normalized through a vendor driver into an [`model::Alert`] and handed to
//!   the configured exporters.
//! - A recurring scheduler trigger turns task templates into one-shot
//!   performance collections ([`tasks::CollectionOrchestrator`]).

pub mod actors;
pub mod alerts;
pub mod config;
pub mod db;
pub mod drivers;
pub mod error;
pub mod exporter;
pub mod management;
pub mod model;
pub mod scheduler;
pub mod snmp;
pub mod tasks;
pub mod util;
