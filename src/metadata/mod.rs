//! Remote metadata matching.
//!
//! # Module layout
//!
//! - [`provider`] -- Trait definition and shared data types.
//! - [`providers`] -- Concrete provider implementations (TMDB).
//! - [`matcher`] -- Search, accept, fetch and apply.
//! - [`sweep`] -- Background auto-match over every unmatched entry.

pub mod matcher;
pub mod provider;
pub mod providers;
pub mod sweep;

pub use matcher::{accept_candidate, Matcher};
pub use provider::{
    CastCredit, CatalogProvider, Credit, EpisodeDetails, FilmDetails, SearchCandidate,
    SeasonDetails,
};
pub use sweep::{AutoMatchSweep, MatchProgress, SweepOutcome};
