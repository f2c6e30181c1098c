//! Filename and directory-name heuristics.
//!
//! Pure functions with no I/O: pull a title and year out of a release-style
//! filename, recognise season folders and `SxxEyy` markers, and clean a
//! free-form query before it is sent to the remote catalog.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use reelvault_common::paths::video_extensions;

/// Release-quality and scene-group tokens. A title is cut at the first one.
const STRIP_TAGS: &[&str] = &[
    "1080p", "720p", "480p", "2160p", "4k", "uhd", "bluray", "blu-ray", "bdrip", "brrip",
    "dvdrip", "dvdscr", "hdtv", "webrip", "web-dl", "webdl", "x264", "x265", "h264", "h265",
    "hevc", "avc", "aac", "ac3", "dts", "truehd", "atmos", "remux", "proper", "repack",
    "extended", "unrated", "directors cut", "theatrical", "imax", "yify", "yts", "rarbg",
    "ettv", "eztv",
];

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[._ \[\(])([12][0-9]{3})(?:[._ \]\)]|$)").expect("year pattern")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = STRIP_TAGS
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)(?:^|[\s\-\[\(])(?:{alternation})(?:$|[\s\-\]\)])"))
        .expect("tag pattern")
});

static SXXEYY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Ss](\d{1,2})[Ee](\d{1,2})").expect("sxxeyy pattern"));

static EPISODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Ee](\d+)").expect("episode pattern"));

static SEASON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:season|series)[\s._\-]*(\d+)\b").expect("season word pattern")
});

static SEASON_SHORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^s[\s._\-]*(\d+)\b").expect("season shorthand pattern"));

static DIR_SXX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bS\s*\d{1,2}\b").expect("dir sxx pattern"));

static DIR_SEASON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:Season|Series)\s*\d+\b").expect("dir season pattern")
});

static EPISODE_CUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bS\s*\d{1,2}\s*E\s*\d{1,2}\b").expect("episode cut pattern")
});

static MULTI_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("whitespace pattern"));

/// Title and year recovered from a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub title: String,
    pub year: Option<i32>,
}

/// Strip the directory part and, for video files, the extension.
fn base_name(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains(' ') => stem,
        _ => base,
    }
}

/// Strip the directory part and a known video extension only.
fn base_name_without_video_ext(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && video_extensions().contains(&ext.to_lowercase().as_str()) =>
        {
            stem
        }
        _ => base,
    }
}

/// Clean a raw release name into a display title.
///
/// Dots and underscores become spaces, the text is cut at the first
/// release-quality tag, trailing dashes and spaces are dropped and each word
/// is capitalised.
///
/// # Examples
///
/// ```
/// use reelvault::scanner::heuristics::normalize_title;
///
/// assert_eq!(normalize_title("the.matrix.1080p.bluray"), "The Matrix");
/// ```
pub fn normalize_title(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .map(|c| if c == '.' || c == '_' { ' ' } else { c })
        .collect();

    let cut = TAG_RE
        .find(&spaced)
        .map(|m| &spaced[..m.start()])
        .unwrap_or(&spaced);

    let trimmed = cut.trim().trim_end_matches(['-', ' ']);

    let mut out = String::with_capacity(trimmed.len());
    let mut cap_next = true;
    for c in trimmed.chars() {
        if cap_next && c.is_ascii_lowercase() {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
        cap_next = c == ' ';
    }
    out
}

/// Parse a title and year from a file name or path.
///
/// The year is a four-digit token bounded by separators or the string edges.
/// Everything before it becomes the title; without a usable prefix the whole
/// cleaned base name is the title.
pub fn parse_filename(name: &str) -> ParsedName {
    parse_filename_stem(base_name(name))
}

/// Season number encoded in a directory name.
///
/// Recognises `Season N`, `Series N`, the `SNN` shorthand (optionally with a
/// separator, e.g. `S 01`, `S-01`) and `Specials`, which is season 0.
pub fn detect_season_dir(name: &str) -> Option<i32> {
    let name = name.trim();
    if name.eq_ignore_ascii_case("specials") {
        return Some(0);
    }

    SEASON_WORD_RE
        .captures(name)
        .or_else(|| SEASON_SHORT_RE.captures(name))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Season and episode from an `SxxEyy` marker in a filename.
pub fn episode_marker(filename: &str) -> Option<(i32, i32)> {
    let caps = SXXEYY_RE.captures(filename)?;
    let season = caps.get(1)?.as_str().parse().ok()?;
    let episode = caps.get(2)?.as_str().parse().ok()?;
    Some((season, episode))
}

/// Episode number of a file inside a season folder.
///
/// Uses the `SxxEyy` marker when there is one, otherwise the first `E<digits>`.
pub fn episode_number(filename: &str) -> Option<i32> {
    if let Some((_, episode)) = episode_marker(filename) {
        return Some(episode);
    }
    EPISODE_RE
        .captures(base_name(filename))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Season shared by a strict majority of a directory's video files.
///
/// `names` are the video file names of one directory. Files without an
/// `SxxEyy` marker count against the majority.
pub fn majority_season<'a, I>(names: I) -> Option<i32>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut total = 0usize;
    let mut votes: HashMap<i32, usize> = HashMap::new();

    for name in names {
        total += 1;
        if let Some((season, _)) = episode_marker(name) {
            *votes.entry(season).or_default() += 1;
        }
    }

    votes
        .into_iter()
        .filter(|(_, count)| *count * 2 > total)
        .map(|(season, _)| season)
        .next()
}

/// Show name from a directory such as `Show.Name.S01.1080p` or `Show - Season 2`.
pub fn show_name_from_dir(dir_name: &str) -> String {
    let normalized = normalize_title(dir_name);
    let head = normalized
        .split_once(" - ")
        .map(|(head, _)| head)
        .unwrap_or(&normalized);

    let without_sxx = DIR_SXX_RE.replace_all(head, "");
    let without_season = DIR_SEASON_RE.replace_all(&without_sxx, "");
    MULTI_SPACE_RE
        .replace_all(&without_season, " ")
        .trim()
        .to_string()
}

/// Show name from an episode file name, cut at its `SxxEyy` marker.
pub fn show_name_from_episode(filename: &str) -> String {
    let normalized = normalize_title(base_name(filename));
    match EPISODE_CUT_RE.find(&normalized) {
        Some(m) if m.start() > 0 => normalized[..m.start()].trim().to_string(),
        _ => normalized.trim().to_string(),
    }
}

/// Placeholder title of a TV season entry.
pub fn season_title(show: &str, season: i32) -> String {
    if season == 0 {
        format!("{} - Specials", show)
    } else {
        format!("{} - Season {}", show, season)
    }
}

/// Show part of a season title produced by [`season_title`].
pub fn show_from_season_title(title: &str) -> &str {
    title.split_once(" - ").map(|(show, _)| show).unwrap_or(title)
}

/// Search text and year recovered from a free-form query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanQuery {
    pub text: String,
    pub year: Option<i32>,
}

/// Clean a query before it is sent to the remote catalog.
///
/// Drops any directory part and video extension, cuts at a season/episode
/// marker, strips release tags and moves a trailing year out of the text.
/// The year is returned separately so it can go into the year parameter.
///
/// # Examples
///
/// ```
/// use reelvault::scanner::heuristics::clean_search_query;
///
/// let q = clean_search_query("/movies/The.Matrix.1999.mkv");
/// assert_eq!(q.text, "The Matrix");
/// assert_eq!(q.year, Some(1999));
/// ```
pub fn clean_search_query(query: &str) -> CleanQuery {
    let base = base_name_without_video_ext(query.trim());

    let cut = SXXEYY_RE
        .find(base)
        .map(|m| &base[..m.start()])
        .unwrap_or(base);
    let cut = DIR_SEASON_RE
        .find(cut)
        .map(|m| &cut[..m.start()])
        .unwrap_or(cut);

    let parsed = parse_filename_stem(cut);
    CleanQuery {
        text: MULTI_SPACE_RE.replace_all(&parsed.title, " ").trim().to_string(),
        year: parsed.year,
    }
}

/// Title and year of text that has no directory or extension to strip.
fn parse_filename_stem(stem: &str) -> ParsedName {
    let mut year = None;
    let mut title = String::new();

    if let Some(caps) = YEAR_RE.captures(stem) {
        year = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok());
        if let Some(whole) = caps.get(0) {
            if whole.start() > 0 {
                title = normalize_title(&stem[..whole.start()]);
            }
        }
    }

    if title.is_empty() {
        title = normalize_title(stem);
    }

    ParsedName { title, year }
}

/// Name of the directory containing `path`, if any.
pub fn parent_dir_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
}
