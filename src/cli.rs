use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelvault")]
#[command(author, version, about = "Personal film and TV library catalog")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan library roots for new films and seasons
    Scan {
        /// Roots to scan (uses the configured library paths if empty)
        roots: Vec<PathBuf>,
    },

    /// Match every unmatched entry against TMDB (Ctrl-C cancels)
    Match,

    /// Search TMDB for a title
    Search {
        /// Title to search for; release tags are stripped
        #[arg(required = true)]
        query: String,

        /// Release year hint
        #[arg(long)]
        year: Option<i32>,

        /// Search TV shows instead of films
        #[arg(long)]
        tv: bool,
    },

    /// Apply a TMDB record to an entry
    Apply {
        entry_id: i64,

        /// TMDB movie id, or show id with --tv
        external_id: i64,

        /// Treat the entry as a TV season
        #[arg(long)]
        tv: bool,
    },

    /// Reject an entry's match and restore its scanned title
    Reset { entry_id: i64 },

    /// Exclude an entry from automatic matching
    Ignore { entry_id: i64 },

    /// List catalog entries
    List {
        /// Exact genre name
        #[arg(long)]
        genre: Option<String>,

        /// Earliest release year
        #[arg(long)]
        from: Option<i32>,

        /// Latest release year
        #[arg(long)]
        to: Option<i32>,

        /// Title substring
        #[arg(long)]
        title: Option<String>,

        /// Actor name substring
        #[arg(long)]
        actor: Option<String>,

        /// Plot substring
        #[arg(long)]
        plot: Option<String>,

        /// Sort by title, year, rating or added
        #[arg(long, default_value = "title")]
        sort: String,

        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Show everything known about one entry
    Show {
        entry_id: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate missing or stale poster thumbnails
    Thumbs,

    /// Attach a secondary file (extra part or alternate cut) to a film
    Attach {
        entry_id: i64,

        #[arg(required = true)]
        path: PathBuf,

        /// Label shown for the file
        #[arg(long)]
        label: Option<String>,
    },

    /// Add or remove configured library roots
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum LibraryAction {
    /// Add a root to `[library] paths`
    Add { path: PathBuf },

    /// Remove a root from `[library] paths`
    Remove { path: PathBuf },

    /// Print the configured roots
    List,
}
