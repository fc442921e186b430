//! Database module: row models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed rows returned by repositories.
//! - `repo`: SQL-only functions that map rows into those types.
//!
//! External modules should import from `push_courier::db` — we re-export the
//! repository API and the row models for convenience.

pub mod model;
pub mod repo;

pub use model::{CandidateDevice, UnfinishedNotification};
pub use repo::*;
