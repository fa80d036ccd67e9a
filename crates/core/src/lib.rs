//! Pure domain logic for repairing mis-decoded UTF-8 in the forum archive.
//!
//! Nothing in this crate performs I/O; the database and orchestration layers
//! live in `mojifix-db` and `mojifix-pipeline`.

pub mod confirm;
pub mod error;
pub mod fixer;
pub mod replacement_map;
pub mod run_phase;
pub mod scan;
pub mod target;
pub mod types;
