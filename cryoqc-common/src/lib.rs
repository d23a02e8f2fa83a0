//! # cryoqc Common Library
//!
//! Shared code for the cryoqc monitor binaries:
//! - Error and result types
//! - Configuration model, TOML loading and validation
//! - Event types (`QcEvent`) and the broadcast `EventBus`

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
