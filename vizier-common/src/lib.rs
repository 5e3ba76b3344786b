//! # Vizier Common Library
//!
//! Shared code for the Vizier crates:
//! - Error and result types
//! - Configuration file loading and root folder resolution
//! - SQLite pool initialization

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
