//! Core types and configuration for modelpack.
//!
//! This crate defines the `modelpack.toml` schema ([`ModelpackConfig`]),
//! base image selection, Python requirements assembly, and shared error types.

pub mod config;
pub mod error;

pub use config::{
    BuildConfig, CONFIG_FILE_NAME, DEFAULT_SIZE_THRESHOLD, LayerConfig, ModelpackConfig,
    ServerWheel,
};
pub use error::{Error, Result};
