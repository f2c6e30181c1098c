//! Reelvault - Personal film and TV library catalog
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod images;
pub mod loader;
pub mod metadata;
pub mod scanner;
