//! # Zotag Common Library
//!
//! Shared code for the zotag services:
//! - Error and result types
//! - TOML configuration loading and root folder resolution
//! - SQLite database initialization (query cache schema)

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
