mod cli;

use reelvault::{
    config::{self, Config},
    images::{PosterStore, ThumbnailPool},
    loader::{channel, Delivery},
    metadata::{providers::TmdbProvider, AutoMatchSweep, Matcher},
    scanner::Scanner,
};
use reelvault_common::{EntryId, MediaKind, SortDirection, SortKey};
use reelvault_db::{
    models::{CatalogEntry, EntryFilter, Pagination},
    pool::Catalog,
    queries::{attached_files, entries},
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, LibraryAction};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn open_catalog(config: &Config) -> Result<Catalog> {
    tracing::debug!("Opening catalog at {:?}", config.storage.database);
    Catalog::open(&config.storage.database)
        .with_context(|| format!("Failed to open catalog: {:?}", config.storage.database))
}

fn build_matcher(config: &Config, catalog: Catalog) -> Result<Matcher> {
    let provider = TmdbProvider::new(config.tmdb.api_key.clone(), config.tmdb.language.clone())?;
    let posters = PosterStore::new(
        &config.storage.poster_cache,
        config.images.thumb_width,
        config.images.thumb_height,
    );
    Ok(Matcher::new(catalog, Arc::new(provider), posters))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelvault=trace,reelvault_db=debug".to_string()
        } else {
            "reelvault=info,reelvault_db=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Scan { roots } => scan(config_path, roots),
        Commands::Match => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(match_all(config_path))
        }
        Commands::Search { query, year, tv } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(search(config_path, &query, year, kind_of(tv)))
        }
        Commands::Apply {
            entry_id,
            external_id,
            tv,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(apply(config_path, entry_id, external_id, kind_of(tv)))
        }
        Commands::Reset { entry_id } => {
            let config = config::load_config_or_default(config_path)?;
            let matcher = build_matcher(&config, open_catalog(&config)?)?;
            matcher.reset_to_unmatched(EntryId::from(entry_id))?;
            println!("Entry {} reset to unmatched", entry_id);
            Ok(())
        }
        Commands::Ignore { entry_id } => {
            let config = config::load_config_or_default(config_path)?;
            let matcher = build_matcher(&config, open_catalog(&config)?)?;
            matcher.ignore(EntryId::from(entry_id))?;
            println!("Entry {} will be skipped by auto-match", entry_id);
            Ok(())
        }
        Commands::List {
            genre,
            from,
            to,
            title,
            actor,
            plot,
            sort,
            desc,
        } => {
            let sort: SortKey = sort.parse().map_err(anyhow::Error::msg)?;
            let filter = EntryFilter {
                genre,
                year_from: from,
                year_to: to,
                title,
                actor,
                plot,
                sort,
                direction: if desc {
                    SortDirection::Descending
                } else {
                    SortDirection::Ascending
                },
            };
            list(config_path, &filter)
        }
        Commands::Show { entry_id, json } => show(config_path, entry_id, json),
        Commands::Thumbs => thumbs(config_path),
        Commands::Attach {
            entry_id,
            path,
            label,
        } => attach(config_path, entry_id, &path, label.as_deref()),
        Commands::Library { action } => library(config_path, action),
        Commands::Validate { config } => validate_config(config.as_deref().or(config_path)),
        Commands::Version => {
            println!("reelvault {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn kind_of(tv: bool) -> MediaKind {
    if tv {
        MediaKind::TvSeason
    } else {
        MediaKind::Film
    }
}

fn scan(config_path: Option<&Path>, roots: Vec<PathBuf>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let roots = if roots.is_empty() {
        config.library.paths.clone()
    } else {
        roots
    };
    if roots.is_empty() {
        anyhow::bail!("No library roots given and none configured");
    }

    let scanner = Scanner::new(open_catalog(&config)?).with_progress(Box::new(|p| {
        tracing::debug!(
            root = %p.root.display(),
            directories = p.directories,
            files = p.files_seen,
            added = p.added,
            "Scan progress"
        );
    }));

    let added = scanner.scan_all(&roots)?;
    println!("Scanned {} root(s), {} new entries", roots.len(), added);
    Ok(())
}

async fn match_all(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let matcher = Arc::new(build_matcher(&config, open_catalog(&config)?)?);

    let sweep = AutoMatchSweep::new(
        matcher,
        Duration::from_millis(config.matcher.request_delay_ms),
    );
    let cancel = sweep.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Cancel requested; finishing current entry");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let (sink, mut queue) = channel();
    let handle = sweep.spawn(sink);

    while let Some(delivery) = queue.recv().await {
        match delivery {
            Delivery::MatchProgress(p) => {
                let mark = if p.matched { "✓" } else { "·" };
                println!("[{}/{}] {} {}", p.index + 1, p.total, mark, p.title);
            }
            Delivery::MatchDone {
                canceled,
                matched,
                processed,
                error: None,
            } => {
                let verb = if canceled { "Canceled" } else { "Finished" };
                println!("{}: matched {} of {} processed", verb, matched, processed);
            }
            // A failed sweep surfaces through the task result below.
            _ => {}
        }
    }

    handle.await.context("Auto-match task panicked")??;
    Ok(())
}

async fn search(
    config_path: Option<&Path>,
    query: &str,
    year: Option<i32>,
    kind: MediaKind,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let matcher = build_matcher(&config, open_catalog(&config)?)?;

    let candidates = matcher.search(query, year, kind).await;
    if candidates.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for c in &candidates {
        match c.year {
            Some(y) => println!("{:>8}  {} ({})", c.external_id, c.title, y),
            None => println!("{:>8}  {}", c.external_id, c.title),
        }
    }
    Ok(())
}

async fn apply(
    config_path: Option<&Path>,
    entry_id: i64,
    external_id: i64,
    kind: MediaKind,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let matcher = build_matcher(&config, open_catalog(&config)?)?;

    matcher
        .apply_manual(EntryId::from(entry_id), external_id, kind)
        .await?;
    println!("Applied {} to entry {}", external_id, entry_id);
    Ok(())
}

/// Every row matching `filter`, fetched a page at a time.
fn all_rows(catalog: &Catalog, filter: &EntryFilter, page_size: u32) -> Result<Vec<CatalogEntry>> {
    let conn = catalog.reader()?;
    let mut rows = Vec::new();
    loop {
        let page = entries::list_page(&conn, filter, Pagination::new(rows.len() as u32, page_size))?;
        let done = (page.len() as u32) < page_size;
        rows.extend(page);
        if done {
            break;
        }
    }
    Ok(rows)
}

fn list(config_path: Option<&Path>, filter: &EntryFilter) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let catalog = open_catalog(&config)?;

    let rows = all_rows(&catalog, filter, config.loader.page_size)?;
    for e in &rows {
        let year = e.year.map(|y| y.to_string()).unwrap_or_else(|| "----".into());
        println!(
            "{:>6}  {:<9} {}  {:<9} {}",
            e.id, e.kind, year, e.match_state, e.title
        );
    }

    let unmatched = entries::count_unmatched(&*catalog.reader()?)?;
    println!("\n{} entries ({} unmatched)", rows.len(), unmatched);
    Ok(())
}

fn show(config_path: Option<&Path>, entry_id: i64, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let catalog = open_catalog(&config)?;
    let conn = catalog.reader()?;

    let details = entries::get_details(&conn, EntryId::from(entry_id))?
        .with_context(|| format!("No entry with id {}", entry_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    let e = &details.entry;
    println!("Title: {}", e.title);
    println!("Path: {}", e.file_path);
    println!("Kind: {}", e.kind);
    if let Some(season) = e.season_number {
        println!("Season: {}", season);
    }
    if let Some(year) = e.year {
        println!("Year: {}", year);
    }
    if let Some(runtime) = e.runtime_minutes {
        println!("Runtime: {} min", runtime);
    }
    if let Some(rating) = e.rating {
        println!("Rating: {:.1}", rating);
    }
    println!("Match: {}", e.match_state);
    if let Some(ref id) = e.external_id {
        println!("TMDB id: {}", id);
    }
    if let Some(ref poster) = e.poster_path {
        println!("Poster: {}", poster);
    }
    if !details.genres.is_empty() {
        println!("Genres: {}", details.genres.join(", "));
    }
    if !details.directors.is_empty() {
        let names: Vec<&str> = details.directors.iter().map(|d| d.name.as_str()).collect();
        println!("Directed by: {}", names.join(", "));
    }
    if !details.cast.is_empty() {
        println!("\nCast:");
        for member in &details.cast {
            match member.role {
                Some(ref role) => println!("  {} as {}", member.actor.name, role),
                None => println!("  {}", member.actor.name),
            }
        }
    }
    if !details.episodes.is_empty() {
        println!("\nEpisodes:");
        for ep in &details.episodes {
            println!(
                "  {:>3}  {}",
                ep.episode_number,
                ep.title.as_deref().unwrap_or(&ep.file_path)
            );
        }
    }
    if !details.attached_files.is_empty() {
        println!("\nAttached files:");
        for file in &details.attached_files {
            println!(
                "  {}  {}",
                file.label.as_deref().unwrap_or("-"),
                file.file_path
            );
        }
    }
    if let Some(ref plot) = e.plot {
        println!("\n{}", plot);
    }

    Ok(())
}

fn thumbs(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let catalog = open_catalog(&config)?;
    let rows = all_rows(&catalog, &EntryFilter::default(), config.loader.page_size)?;

    let (sink, _queue) = channel();
    let pool = ThumbnailPool::new(
        config.images.workers,
        config.images.thumb_width,
        config.images.thumb_height,
        sink,
    )?;

    let stats = pool.ensure_thumbnails(&rows);
    println!(
        "Thumbnails: {} generated, {} up to date, {} failed",
        stats.generated, stats.fresh, stats.failed
    );
    Ok(())
}

fn attach(
    config_path: Option<&Path>,
    entry_id: i64,
    path: &Path,
    label: Option<&str>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let catalog = open_catalog(&config)?;
    let conn = catalog.conn()?;

    let path = config::expand(path);
    match attached_files::attach(&conn, EntryId::from(entry_id), &path.to_string_lossy(), label)? {
        Some(id) => println!("Attached {} to entry {} (file {})", path.display(), entry_id, id),
        None => println!("{} is already attached", path.display()),
    }
    Ok(())
}

fn library(config_path: Option<&Path>, action: LibraryAction) -> Result<()> {
    let file = config::editable_location(config_path);

    match action {
        LibraryAction::Add { path } => {
            let root = config::expand(&path);
            if !root.is_dir() {
                tracing::warn!("Library path is not a directory: {:?}", root);
            }
            if config::persist::add_library_path(&file, &root)? {
                println!("Added {} to {}", root.display(), file.display());
            } else {
                println!("{} is already configured", root.display());
            }
        }
        LibraryAction::Remove { path } => {
            let root = config::expand(&path);
            if config::persist::remove_library_path(&file, &root)? {
                println!("Removed {} from {}", root.display(), file.display());
            } else {
                println!("{} is not configured", root.display());
            }
        }
        LibraryAction::List => {
            let config = config::load_config_or_default(config_path)?;
            if config.library.paths.is_empty() {
                println!("No library roots configured.");
            }
            for root in &config.library.paths {
                let note = if root.is_dir() { "" } else { "  (missing)" };
                println!("{}{}", root.display(), note);
            }
        }
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_summary(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::load_config_or_default(None)?;
            println!("Effective config:");
            print_summary(&config);
        }
    }

    Ok(())
}

fn print_summary(config: &Config) {
    println!("  Database: {}", config.storage.database.display());
    println!("  Poster cache: {}", config.storage.poster_cache.display());
    println!("  Library paths: {}", config.library.paths.len());
    println!(
        "  TMDB: {}",
        if config.tmdb.api_key.trim().is_empty() {
            "disabled (no API key)"
        } else {
            "enabled"
        }
    );
    println!(
        "  Pages: first {} then {}",
        config.loader.first_page_size, config.loader.page_size
    );
    println!("  Thumbnail workers: {}", config.images.workers);
}
