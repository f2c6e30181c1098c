//! Core type definitions for catalog entries and page queries.
//!
//! The store persists [`MediaKind`] and [`MatchState`] as small integers; the
//! `code`/`from_code` pairs define that mapping and must stay stable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A standalone film, possibly with attached secondary files.
    #[default]
    Film,
    /// One season of a TV show, owning its episodes.
    TvSeason,
}

impl MediaKind {
    /// Integer code stored in the `kind` column.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Film => 0,
            Self::TvSeason => 1,
        }
    }

    /// Decode a stored `kind` column. Unknown codes are read as films.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::TvSeason,
            _ => Self::Film,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Film => write!(f, "film"),
            Self::TvSeason => write!(f, "tv_season"),
        }
    }
}

/// Lifecycle tag tracking whether and how an entry was matched to remote metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    #[default]
    Unmatched,
    AutoMatched,
    ManuallyMatched,
    Ignored,
}

impl MatchState {
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Unmatched => 0,
            Self::AutoMatched => 1,
            Self::ManuallyMatched => 2,
            Self::Ignored => 3,
        }
    }

    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::AutoMatched,
            2 => Self::ManuallyMatched,
            3 => Self::Ignored,
            _ => Self::Unmatched,
        }
    }

    /// Only unmatched entries are picked up by the automatic sweep.
    #[must_use]
    pub fn is_auto_eligible(self) -> bool {
        self == Self::Unmatched
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmatched => write!(f, "unmatched"),
            Self::AutoMatched => write!(f, "auto"),
            Self::ManuallyMatched => write!(f, "manual"),
            Self::Ignored => write!(f, "ignored"),
        }
    }
}

/// Column a catalog page is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Title,
    Year,
    Rating,
    Added,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "year" => Ok(Self::Year),
            "rating" => Ok(Self::Rating),
            "added" | "date" => Ok(Self::Added),
            _ => Err(format!("Unknown sort key: {}", s)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title => write!(f, "title"),
            Self::Year => write!(f, "year"),
            Self::Rating => write!(f, "rating"),
            Self::Added => write!(f, "added"),
        }
    }
}

/// Direction of a catalog page ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// SQL keyword for this direction.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}
