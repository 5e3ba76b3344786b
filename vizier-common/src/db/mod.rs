//! Database initialization shared by the Vizier crates

pub mod init;

pub use init::*;
