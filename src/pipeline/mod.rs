//! Ingestion pipeline
//!
//! Wires fetch, media, storage, and publish into cycles and owns the
//! single-flight and scheduling discipline.

mod orchestrator;

pub use orchestrator::{CycleOutcome, Orchestrator};
