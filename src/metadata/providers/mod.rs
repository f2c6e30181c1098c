//! Concrete catalog provider implementations.
//!
//! Each submodule wraps a single external API and implements the
//! [`CatalogProvider`](super::CatalogProvider) trait.

pub mod tmdb;

pub use tmdb::TmdbProvider;
