//! Reelvault-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across reelvault:
//!
//! - **Typed IDs**: Integer newtypes for catalog entries, episodes and attached files
//! - **Core Types**: Enums for media kind, match state and sort order
//! - **Path Utilities**: Video detection and thumbnail path derivation
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use reelvault_common::{EntryId, MatchState, Error, Result};
//! use reelvault_common::paths::is_video_file;
//! use std::path::Path;
//!
//! let id = EntryId::from(42);
//! assert_eq!(id.get(), 42);
//!
//! assert!(MatchState::Unmatched.is_auto_eligible());
//! assert!(is_video_file(Path::new("movie.mkv")));
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("entry"))
//! }
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
