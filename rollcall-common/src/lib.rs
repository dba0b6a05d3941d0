//! # Rollcall Common Library
//!
//! Shared code for the Rollcall services including:
//! - Error type and result alias
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Event types (RollcallEvent enum) and the broadcast event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
