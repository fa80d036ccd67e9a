//! Repair orchestration: the chunked repair engine, its PostgreSQL
//! adapters, and the operator-facing runs built on top of it.

pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod export;
pub mod postgres;
pub mod preview;
pub mod purge;
pub mod run;
pub mod stats;

pub use engine::{CandidateSource, ChunkFailure, RepairEngine, RepairReport, RepairSink};
pub use error::RepairError;
