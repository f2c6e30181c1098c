//! Database query modules.
//!
//! This module organizes all catalog operations into logical groups:
//! - entries: Catalog entry CRUD, page/count queries and path tracking
//! - episodes: Episodes owned by TV season entries
//! - attached_files: Secondary files attached to films
//! - people: Find-or-create genres, actors and directors and their link rows

pub mod attached_files;
pub mod entries;
pub mod episodes;
pub mod people;

use rusqlite::ErrorCode;

/// Whether a rusqlite error is a UNIQUE/constraint violation.
///
/// Inserts that hit one are treated as "already tracked" rather than failures.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Convert a rusqlite error into the common error type.
pub(crate) fn db_err(e: rusqlite::Error) -> reelvault_common::Error {
    reelvault_common::Error::database(e.to_string())
}
