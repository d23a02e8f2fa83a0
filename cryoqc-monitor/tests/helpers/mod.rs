//! Test Helper Utilities
//!
//! Shared utilities for testing cryoqc-monitor

#![allow(dead_code)]

pub mod fixtures;
pub mod store_builder;

pub use fixtures::{write_epa_file, write_mrc_file, write_movie_file, ProjectLayout};
pub use store_builder::StoreBuilder;
