//! # relayhub-core
//!
//! Core crate for RelayHub. Contains configuration schemas and their
//! validation, typed identifiers, and the unified error system.
//!
//! This crate has **no** internal dependencies on other RelayHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
