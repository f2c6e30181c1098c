//! Shared test harness for integration tests.
//!
//! Provides [`TestLibrary`] which owns a temp directory holding a library
//! root, a file-backed catalog and a poster cache. [`mock_tmdb`] starts a
//! wiremock server and [`TestLibrary::matcher`] points a matcher at it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use reelvault::images::PosterStore;
use reelvault::metadata::providers::TmdbProvider;
use reelvault::metadata::Matcher;
use reelvault::scanner::Scanner;
use reelvault_db::models::{CatalogEntry, EntryFilter, Pagination};
use reelvault_db::pool::{Catalog, PooledConnection};
use reelvault_db::queries::entries;
use tempfile::TempDir;
use wiremock::MockServer;

/// A library root and catalog in a throwaway directory.
pub struct TestLibrary {
    pub dir: TempDir,
    pub catalog: Catalog,
}

impl TestLibrary {
    /// Create an empty library with a file-backed catalog.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("library")).expect("failed to create root");
        let catalog =
            Catalog::open(dir.path().join("library.db")).expect("failed to open catalog");
        Self { dir, catalog }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    pub fn poster_cache(&self) -> PathBuf {
        self.dir.path().join("posters")
    }

    pub fn conn(&self) -> PooledConnection {
        self.catalog.conn().expect("failed to get connection")
    }

    /// Create an empty file under the library root, with parents.
    pub fn touch(&self, relative: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent");
        }
        std::fs::write(&path, b"").expect("failed to write file");
        path
    }

    /// Scan the library root and return the number of new rows.
    pub fn scan(&self) -> usize {
        Scanner::new(self.catalog.clone())
            .scan(&self.root())
            .expect("scan failed")
    }

    /// Every entry under the default ordering.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        let conn = self.conn();
        entries::list_page(&conn, &EntryFilter::default(), Pagination::new(0, 10_000))
            .expect("list failed")
    }

    pub fn entry_by_path(&self, path: &Path) -> CatalogEntry {
        let conn = self.conn();
        entries::get_entry_by_path(&conn, &path.to_string_lossy())
            .expect("lookup failed")
            .expect("entry missing")
    }

    /// A matcher backed by a TMDB provider pointed at `server`.
    pub fn matcher(&self, server: &MockServer) -> Matcher {
        self.matcher_with_key(server, "test-key")
    }

    pub fn matcher_with_key(&self, server: &MockServer, api_key: &str) -> Matcher {
        let provider = TmdbProvider::new(api_key.into(), "en-US".into())
            .expect("failed to build provider")
            .with_base_urls(server.uri(), format!("{}/img", server.uri()));
        let posters = PosterStore::new(self.poster_cache(), 150, 225);
        Matcher::new(self.catalog.clone(), Arc::new(provider), posters)
    }
}

/// Start a mock TMDB server.
pub async fn mock_tmdb() -> MockServer {
    MockServer::start().await
}

/// Encoded JPEG bytes of a solid image.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut out, ImageFormat::Jpeg)
        .expect("failed to encode jpeg");
    out.into_inner()
}

/// Write a solid JPEG poster to `path`.
pub fn write_poster(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create parent");
    }
    std::fs::write(path, jpeg_bytes(width, height)).expect("failed to write poster");
}

/// Number of tables whose `file_path` column holds `path`.
pub fn path_owners(conn: &rusqlite::Connection, path: &str) -> usize {
    ["entries", "episodes", "attached_files"]
        .iter()
        .map(|table| {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE file_path = ?1");
            let n: i64 = conn
                .query_row(&sql, [path], |row| row.get(0))
                .expect("count failed");
            n as usize
        })
        .sum()
}
