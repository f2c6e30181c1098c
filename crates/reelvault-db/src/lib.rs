//! Reelvault-DB: Catalog schema, migrations, and query operations
//!
//! This crate provides the persistent catalog for reelvault using SQLite
//! with rusqlite and r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool and read-only handle management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use reelvault_db::pool::Catalog;
//! use reelvault_db::queries::entries;
//! use reelvault_db::models::NewEntry;
//!
//! let catalog = Catalog::open("/var/lib/reelvault/library.db").unwrap();
//! let conn = catalog.conn().unwrap();
//!
//! let id = entries::insert_entry(&conn, &NewEntry::film("/movies/Heat.1995.mkv", "Heat", Some(1995)))
//!     .unwrap();
//! println!("Tracked entry: {:?}", id);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
