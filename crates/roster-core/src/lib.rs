//! Core types and trait definitions for the Roster identity engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod enrollment;
pub mod error;
pub mod identity;
pub mod organization;
pub mod profile;
pub mod store;

pub use error::{Error, Result};
