//! Library scanner.
//!
//! Walks library roots, classifies each directory as a TV season or a plain
//! folder, and records new films, seasons and episodes in the catalog. Paths
//! that are already tracked are never inserted twice, so re-scanning a tree
//! is always safe.

pub mod heuristics;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use reelvault_common::{
    paths::{is_hidden, is_video_file},
    Error, MediaKind,
};
use reelvault_db::{
    models::NewEntry,
    pool::{Catalog, PooledConnection},
    queries::{entries, episodes},
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use heuristics::{
    detect_season_dir, episode_number, majority_season, parse_filename, season_title,
    show_name_from_dir, show_name_from_episode,
};

/// Deepest directory level visited below a root. Bounds symlink cycles.
pub const MAX_DEPTH: usize = 10;

const UNKNOWN_SHOW: &str = "Unknown Show";

/// Roots with a scan in progress, shared by every scanner in the process.
static ACTIVE_SCANS: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Progress callback for scan operations.
pub type ProgressCallback = Box<dyn Fn(ScanProgress) + Send + Sync>;

/// Scan progress information.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanProgress {
    pub root: PathBuf,
    pub directories: usize,
    pub files_seen: usize,
    pub added: usize,
    pub current_dir: Option<PathBuf>,
}

impl ScanProgress {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            directories: 0,
            files_seen: 0,
            added: 0,
            current_dir: None,
        }
    }
}

/// Releases a root from [`ACTIVE_SCANS`] when the scan ends.
struct ScanGuard {
    root: PathBuf,
}

impl ScanGuard {
    fn claim(root: &Path) -> Result<Self> {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut active = ACTIVE_SCANS.lock();

        if active
            .iter()
            .any(|running| running.starts_with(&key) || key.starts_with(running))
        {
            return Err(Error::invalid_input("scan already running").into());
        }

        active.insert(key.clone());
        Ok(Self { root: key })
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        ACTIVE_SCANS.lock().remove(&self.root);
    }
}

/// How a directory's contents are ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DirectoryKind {
    Season { number: i32, show: String },
    Plain,
}

/// Scanner for discovering media files and recording them in the catalog.
pub struct Scanner {
    catalog: Catalog,
    on_progress: Option<ProgressCallback>,
}

impl Scanner {
    /// Create a new scanner over a catalog.
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            on_progress: None,
        }
    }

    /// Report progress once per visited directory.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Scan every root in order and return the total number of new rows.
    ///
    /// Missing roots and roots already being scanned are logged and skipped.
    /// Any other failure, such as a catalog error, stops the whole run.
    pub fn scan_all<P: AsRef<Path>>(&self, roots: &[P]) -> Result<usize> {
        let mut added = 0;
        for root in roots {
            let root = root.as_ref();
            match self.scan(root) {
                Ok(n) => added += n,
                Err(e) if is_skippable_root(&e) => {
                    warn!(root = %root.display(), error = %e, "Skipping library root");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// Scan one library root.
    ///
    /// Returns the number of rows created: films, season entries and
    /// episodes. A second scan of the same tree returns 0.
    pub fn scan(&self, root: &Path) -> Result<usize> {
        if !root.is_dir() {
            return Err(Error::not_found(format!("library root {}", root.display())).into());
        }
        let _guard = ScanGuard::claim(root)?;

        info!(root = %root.display(), "Scanning library root");
        let conn = self.catalog.conn()?;
        let mut progress = ScanProgress::new(root);

        let mut walker = WalkDir::new(root)
            .follow_links(true)
            .max_depth(MAX_DEPTH + 1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()));

        while let Some(item) = walker.next() {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable path");
                    continue;
                }
            };
            let path = entry.path();

            if entry.file_type().is_dir() {
                if entry.depth() > MAX_DEPTH {
                    continue;
                }
                progress.directories += 1;
                progress.current_dir = Some(path.to_path_buf());
                self.report(&progress);

                if let DirectoryKind::Season { number, show } = classify_directory(path) {
                    walker.skip_current_dir();
                    match self.scan_season(&conn, path, number, &show, &mut progress) {
                        Ok(n) => progress.added += n,
                        Err(e) => {
                            warn!(dir = %path.display(), error = %e, "Failed to scan season")
                        }
                    }
                }
                continue;
            }

            if !is_video_file(path) {
                continue;
            }
            progress.files_seen += 1;

            match self.scan_film(&conn, path) {
                Ok(true) => progress.added += 1,
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to record film"),
            }
        }

        progress.current_dir = None;
        self.report(&progress);

        info!(
            root = %root.display(),
            directories = progress.directories,
            files = progress.files_seen,
            added = progress.added,
            "Scan complete"
        );
        Ok(progress.added)
    }

    fn report(&self, progress: &ScanProgress) {
        if let Some(callback) = &self.on_progress {
            callback(progress.clone());
        }
    }

    /// Record a standalone video file as a film unless its path is tracked.
    fn scan_film(&self, conn: &PooledConnection, path: &Path) -> Result<bool> {
        let path_str = path.to_string_lossy();
        if entries::is_path_tracked(conn, &path_str)? {
            debug!(path = %path.display(), "Already tracked");
            return Ok(false);
        }

        let parsed = parse_filename(&path_str);
        let inserted = entries::insert_entry(
            conn,
            &NewEntry::film(path_str.as_ref(), parsed.title, parsed.year),
        )?;

        if let Some(id) = inserted {
            debug!(entry_id = %id, path = %path.display(), "Added film");
        }
        Ok(inserted.is_some())
    }

    /// Find or create the season entry of `dir` and its episodes.
    fn scan_season(
        &self,
        conn: &PooledConnection,
        dir: &Path,
        season: i32,
        show: &str,
        progress: &mut ScanProgress,
    ) -> Result<usize> {
        let dir_str = dir.to_string_lossy();
        let mut added = 0;

        let season_id = match entries::get_entry_by_path(conn, &dir_str)? {
            Some(existing) => {
                if existing.kind != MediaKind::TvSeason || existing.season_number != Some(season) {
                    entries::set_kind(conn, existing.id, MediaKind::TvSeason, Some(season))?;
                    if existing.title.trim().is_empty() {
                        entries::set_title_year(
                            conn,
                            existing.id,
                            &season_title(show, season),
                            existing.year,
                        )?;
                    }
                    info!(entry_id = %existing.id, season, "Repaired season entry");
                }
                existing.id
            }
            None => {
                let new = NewEntry::season(dir_str.as_ref(), season_title(show, season), season);
                match entries::insert_entry(conn, &new)? {
                    Some(id) => {
                        added += 1;
                        info!(entry_id = %id, dir = %dir.display(), season, "Added season");
                        id
                    }
                    None => {
                        warn!(dir = %dir.display(), "Season directory path is tracked elsewhere");
                        return Ok(0);
                    }
                }
            }
        };

        let files = video_files_in(dir)
            .with_context(|| format!("Failed to list season directory {}", dir.display()))?;

        for path in files {
            progress.files_seen += 1;
            let path_str = path.to_string_lossy();

            entries::delete_film_by_path(conn, &path_str)?;
            if episodes::get_by_path(conn, &path_str)?.is_none()
                && entries::is_path_tracked(conn, &path_str)?
            {
                debug!(path = %path.display(), "Attached file, not an episode");
                continue;
            }

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path_str.to_string());
            let number = episode_number(&file_name).unwrap_or(0);

            let (episode_id, created) =
                episodes::find_or_create(conn, season_id, &path_str, number, &file_name)?;
            if created {
                added += 1;
                debug!(episode_id = %episode_id, number, path = %path.display(), "Added episode");
            }
        }

        Ok(added)
    }
}

/// Whether a failed root scan should let [`Scanner::scan_all`] move on.
fn is_skippable_root(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<Error>(),
        Some(Error::NotFound(_) | Error::InvalidInput(_))
    )
}

/// Non-hidden video files directly inside `dir`, sorted by name.
fn video_files_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if is_hidden(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        if path.is_file() && is_video_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Decide whether `dir` holds a TV season.
///
/// A season-style name wins and takes the show name from the parent folder.
/// Otherwise a strict majority of `SxxEyy` files marks the folder itself as
/// the season and names the show after it.
fn classify_directory(dir: &Path) -> DirectoryKind {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(number) = detect_season_dir(&name) {
        let show = heuristics::parent_dir_name(dir)
            .map(|n| show_name_from_dir(&n))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_SHOW.to_string());
        return DirectoryKind::Season { number, show };
    }

    let files = match video_files_in(dir) {
        Ok(files) => files,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Cannot list directory");
            return DirectoryKind::Plain;
        }
    };
    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();

    match majority_season(names.iter().map(String::as_str)) {
        Some(number) => {
            let mut show = show_name_from_dir(&name);
            if show.is_empty() {
                show = names
                    .first()
                    .map(|n| show_name_from_episode(n))
                    .unwrap_or_default();
            }
            if show.is_empty() {
                show = UNKNOWN_SHOW.to_string();
            }
            DirectoryKind::Season { number, show }
        }
        None => DirectoryKind::Plain,
    }
}
