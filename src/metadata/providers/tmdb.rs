//! TMDB (The Movie Database) catalog provider.
//!
//! Implements [`CatalogProvider`] by querying the TMDB v3 REST API.
//!
//! Features:
//! - Token-bucket rate limiting at 4 requests / second via [`governor`].
//! - Automatic retry on HTTP 429 with `Retry-After` header support (max 3 retries).
//! - 30-second request timeout.
//! - Overridable API and image base URLs for tests.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reelvault_common::MediaKind;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::metadata::provider::{
    CastCredit, CatalogProvider, Credit, EpisodeDetails, FilmDetails, SearchCandidate,
    SeasonDetails,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const REQUESTS_PER_SECOND: u32 = 4;

/// Search results kept per query.
pub const MAX_RESULTS: usize = 10;
/// Billed cast members kept per film.
pub const MAX_CAST: usize = 10;

// ---------------------------------------------------------------------------
// TMDB API response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct TmdbSearchResponse<T> {
    #[serde(default)]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieSearchResult {
    id: i64,
    title: Option<String>,
    release_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvSearchResult {
    id: i64,
    name: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieDetail {
    id: i64,
    title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    vote_average: Option<f64>,
    runtime: Option<i32>,
    genres: Option<Vec<TmdbGenre>>,
    imdb_id: Option<String>,
    poster_path: Option<String>,
    credits: Option<TmdbCredits>,
}

#[derive(Debug, Deserialize)]
struct TmdbCredits {
    #[serde(default)]
    cast: Vec<TmdbCast>,
    #[serde(default)]
    crew: Vec<TmdbCrew>,
}

#[derive(Debug, Deserialize)]
struct TmdbCast {
    id: Option<i64>,
    name: String,
    character: Option<String>,
    order: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TmdbCrew {
    id: Option<i64>,
    name: String,
    job: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvDetail {
    id: i64,
    name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f64>,
    genres: Option<Vec<TmdbGenre>>,
    poster_path: Option<String>,
    external_ids: Option<TmdbExternalIds>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonDetail {
    season_number: Option<i32>,
    overview: Option<String>,
    air_date: Option<String>,
    poster_path: Option<String>,
    #[serde(default)]
    episodes: Vec<TmdbEpisode>,
}

#[derive(Debug, Deserialize)]
struct TmdbEpisode {
    id: Option<i64>,
    episode_number: i32,
    name: Option<String>,
    overview: Option<String>,
    runtime: Option<i32>,
    air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TmdbExternalIds {
    imdb_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

/// TMDB catalog provider.
///
/// # Examples
///
/// ```no_run
/// use reelvault::metadata::providers::TmdbProvider;
///
/// let provider = TmdbProvider::new("your-api-key".into(), "en-US".into()).unwrap();
/// ```
pub struct TmdbProvider {
    client: reqwest::Client,
    api_key: String,
    language: String,
    base_url: String,
    image_base: String,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl TmdbProvider {
    /// Create a new TMDB provider with the given API key and language.
    ///
    /// The `language` parameter should be a tag such as `"en-US"`.
    pub fn new(api_key: String, language: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let quota = Quota::per_second(NonZeroU32::MIN.saturating_add(REQUESTS_PER_SECOND - 1));

        Ok(Self {
            client,
            api_key,
            language,
            base_url: TMDB_BASE_URL.to_string(),
            image_base: TMDB_IMAGE_BASE.to_string(),
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    /// Point the provider at other API and image hosts.
    pub fn with_base_urls(mut self, base_url: impl Into<String>, image_base: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self.image_base = image_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Execute a GET request with rate limiting and 429-retry logic.
    async fn get(&self, url: &str) -> anyhow::Result<reqwest::Response> {
        let mut retries = 0u32;
        loop {
            self.rate_limiter.until_ready().await;

            let resp = self
                .client
                .get(url)
                .send()
                .await
                .with_context(|| format!("TMDB request failed: {}", redact(url)))?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RETRIES {
                retries += 1;
                let wait = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(1);
                warn!(
                    retry = retries,
                    wait_secs = wait,
                    "TMDB returned 429, backing off"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            let resp = resp
                .error_for_status()
                .with_context(|| format!("TMDB request returned error: {}", redact(url)))?;

            return Ok(resp);
        }
    }

    /// Build a full API URL with the API key and language query parameters.
    fn url(&self, path: &str, extra_params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}{path}?api_key={}&language={}",
            self.base_url,
            urlencoded(&self.api_key),
            urlencoded(&self.language)
        );
        for (key, value) in extra_params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoded(value));
        }
        url
    }

    /// Convert a TMDB image path fragment to a full URL.
    fn image_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{path}", self.image_base)
        }
    }

    async fn search<T>(&self, path: &str, title: &str, year_param: &str, year: Option<i32>) -> anyhow::Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut params = vec![("query", title)];
        let year_str = year.map(|y| y.to_string());
        if let Some(ref y) = year_str {
            params.push((year_param, y.as_str()));
        }

        let url = self.url(path, &params);
        debug!(url = %redact(&url), "TMDB search");

        let body: TmdbSearchResponse<T> = self
            .get(&url)
            .await?
            .json()
            .await
            .context("failed to parse TMDB search response")?;
        Ok(body.results)
    }
}

/// Minimal percent-encoding for query parameter values.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0x0f) as usize]));
            }
        }
    }
    out
}

const HEX: [u8; 16] = *b"0123456789ABCDEF";

/// Hide the API key in URLs that end up in logs and errors.
fn redact(url: &str) -> String {
    match url.find("api_key=") {
        Some(start) => {
            let value_start = start + "api_key=".len();
            let value_end = url[value_start..]
                .find('&')
                .map(|i| value_start + i)
                .unwrap_or(url.len());
            format!("{}***{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}

/// Extract a four-digit year from a date string like `"2023-04-15"`.
fn parse_year(date: &Option<String>) -> Option<i32> {
    date.as_deref()
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse::<i32>().ok())
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

fn genre_names(genres: Option<Vec<TmdbGenre>>) -> Vec<String> {
    genres
        .unwrap_or_default()
        .into_iter()
        .map(|g| g.name)
        .collect()
}

#[async_trait]
impl CatalogProvider for TmdbProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn search_movie(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> anyhow::Result<Vec<SearchCandidate>> {
        let results: Vec<TmdbMovieSearchResult> =
            self.search("/search/movie", title, "year", year).await?;

        Ok(results
            .into_iter()
            .take(MAX_RESULTS)
            .map(|r| SearchCandidate {
                external_id: r.id,
                title: r.title.unwrap_or_default(),
                year: parse_year(&r.release_date),
                overview: non_empty(r.overview),
                poster_path: r.poster_path,
                kind: MediaKind::Film,
            })
            .collect())
    }

    async fn search_tv(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> anyhow::Result<Vec<SearchCandidate>> {
        let results: Vec<TmdbTvSearchResult> = self
            .search("/search/tv", title, "first_air_date_year", year)
            .await?;

        Ok(results
            .into_iter()
            .take(MAX_RESULTS)
            .map(|r| SearchCandidate {
                external_id: r.id,
                title: r.name.unwrap_or_default(),
                year: parse_year(&r.first_air_date),
                overview: non_empty(r.overview),
                poster_path: r.poster_path,
                kind: MediaKind::TvSeason,
            })
            .collect())
    }

    async fn fetch_movie(&self, external_id: i64) -> anyhow::Result<FilmDetails> {
        let url = self.url(
            &format!("/movie/{external_id}"),
            &[("append_to_response", "credits")],
        );
        debug!(url = %redact(&url), "TMDB fetch movie");

        let detail: TmdbMovieDetail = self
            .get(&url)
            .await?
            .json()
            .await
            .context("failed to parse TMDB movie detail response")?;

        let credits = detail.credits.unwrap_or(TmdbCredits {
            cast: Vec::new(),
            crew: Vec::new(),
        });

        let mut cast = credits.cast;
        cast.sort_by_key(|c| c.order.unwrap_or(i32::MAX));
        let cast = cast
            .into_iter()
            .take(MAX_CAST)
            .enumerate()
            .map(|(i, c)| CastCredit {
                name: c.name,
                external_id: c.id,
                role: non_empty(c.character),
                order: c.order.unwrap_or(i as i32),
            })
            .collect();

        let directors = credits
            .crew
            .into_iter()
            .filter(|c| c.job.as_deref() == Some("Director"))
            .map(|c| Credit {
                name: c.name,
                external_id: c.id,
            })
            .collect();

        Ok(FilmDetails {
            external_id: detail.id,
            title: detail.title.unwrap_or_default(),
            year: parse_year(&detail.release_date),
            runtime_minutes: detail.runtime.filter(|r| *r > 0),
            plot: non_empty(detail.overview),
            rating: detail.vote_average,
            cross_ref_id: non_empty(detail.imdb_id),
            poster_path: detail.poster_path,
            genres: genre_names(detail.genres),
            cast,
            directors,
        })
    }

    async fn fetch_season(&self, show_id: i64, season: i32) -> anyhow::Result<SeasonDetails> {
        let show_url = self.url(
            &format!("/tv/{show_id}"),
            &[("append_to_response", "external_ids")],
        );
        debug!(url = %redact(&show_url), "TMDB fetch show");
        let show: TmdbTvDetail = self
            .get(&show_url)
            .await?
            .json()
            .await
            .context("failed to parse TMDB TV detail response")?;

        let season_url = self.url(&format!("/tv/{show_id}/season/{season}"), &[]);
        debug!(url = %redact(&season_url), "TMDB fetch season");
        let detail: TmdbSeasonDetail = self
            .get(&season_url)
            .await?
            .json()
            .await
            .context("failed to parse TMDB season response")?;

        let episodes = detail
            .episodes
            .into_iter()
            .map(|e| EpisodeDetails {
                episode_number: e.episode_number,
                title: non_empty(e.name),
                runtime_minutes: e.runtime.filter(|r| *r > 0),
                plot: non_empty(e.overview),
                external_id: e.id,
                air_date: non_empty(e.air_date),
            })
            .collect();

        let air_date = non_empty(detail.air_date);
        Ok(SeasonDetails {
            show_id: show.id,
            show_name: show.name.unwrap_or_default(),
            season_number: detail.season_number.unwrap_or(season),
            year: parse_year(&air_date).or_else(|| parse_year(&show.first_air_date)),
            plot: non_empty(detail.overview).or_else(|| non_empty(show.overview)),
            air_date,
            rating: show.vote_average,
            cross_ref_id: show.external_ids.and_then(|ids| non_empty(ids.imdb_id)),
            poster_path: detail.poster_path.or(show.poster_path),
            genres: genre_names(show.genres),
            episodes,
        })
    }

    async fn download_image(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.image_url(path);
        debug!(url = %url, "TMDB download image");

        let bytes = self
            .get(&url)
            .await?
            .bytes()
            .await
            .context("failed to read TMDB image body")?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> TmdbProvider {
        TmdbProvider::new("test-key".into(), "en-US".into())
            .unwrap()
            .with_base_urls(server.uri(), format!("{}/img", server.uri()))
    }

    #[test]
    fn year_parsing() {
        assert_eq!(parse_year(&Some("2023-04-15".to_string())), Some(2023));
        assert_eq!(parse_year(&Some("1999".to_string())), Some(1999));
        assert_eq!(parse_year(&None), None);
        assert_eq!(parse_year(&Some("".to_string())), None);
    }

    #[test]
    fn url_encoding() {
        assert_eq!(urlencoded("hello world"), "hello+world");
        assert_eq!(urlencoded("foo&bar"), "foo%26bar");
        assert_eq!(urlencoded("simple"), "simple");
    }

    #[test]
    fn api_key_is_redacted() {
        assert_eq!(
            redact("http://x/search?api_key=secret&language=en"),
            "http://x/search?api_key=***&language=en"
        );
        assert_eq!(redact("http://x/img/a.jpg"), "http://x/img/a.jpg");
    }

    #[test]
    fn provider_is_available() {
        let provider = TmdbProvider::new("test-key".into(), "en-US".into()).unwrap();
        assert!(provider.is_available());
        assert_eq!(provider.name(), "tmdb");

        let empty = TmdbProvider::new(String::new(), "en-US".into()).unwrap();
        assert!(!empty.is_available());
    }

    #[tokio::test]
    async fn search_movie_caps_results() {
        let server = MockServer::start().await;
        let results: Vec<_> = (0..15)
            .map(|i| serde_json::json!({ "id": i, "title": format!("Film {i}"), "release_date": "2001-01-01" }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("query", "Film"))
            .and(query_param("year", "2001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "results": results })))
            .mount(&server)
            .await;

        let found = provider(&server).search_movie("Film", Some(2001)).await.unwrap();
        assert_eq!(found.len(), MAX_RESULTS);
        assert_eq!(found[0].year, Some(2001));
        assert_eq!(found[0].kind, MediaKind::Film);
    }

    #[tokio::test]
    async fn fetch_movie_extracts_credits() {
        let server = MockServer::start().await;
        let cast: Vec<_> = (0..12)
            .map(|i| serde_json::json!({ "id": 100 + i, "name": format!("Actor {i}"), "character": "Someone", "order": i }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/movie/603"))
            .and(query_param("append_to_response", "credits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 603,
                "title": "The Matrix",
                "release_date": "1999-03-30",
                "runtime": 136,
                "overview": "A hacker learns the truth.",
                "vote_average": 8.2,
                "imdb_id": "tt0133093",
                "poster_path": "/matrix.jpg",
                "genres": [{ "id": 28, "name": "Action" }, { "id": 878, "name": "Science Fiction" }],
                "credits": {
                    "cast": cast,
                    "crew": [
                        { "id": 9339, "name": "Lana Wachowski", "job": "Director" },
                        { "id": 9340, "name": "Lilly Wachowski", "job": "Director" },
                        { "id": 1, "name": "Joel Silver", "job": "Producer" }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let film = provider(&server).fetch_movie(603).await.unwrap();
        assert_eq!(film.title, "The Matrix");
        assert_eq!(film.year, Some(1999));
        assert_eq!(film.cross_ref_id.as_deref(), Some("tt0133093"));
        assert_eq!(film.genres, vec!["Action", "Science Fiction"]);
        assert_eq!(film.cast.len(), MAX_CAST);
        assert_eq!(film.cast[0].name, "Actor 0");
        assert_eq!(film.directors.len(), 2);
    }

    #[tokio::test]
    async fn retries_after_429() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{ "id": 1396, "name": "Breaking Bad", "first_air_date": "2008-01-20" }]
            })))
            .mount(&server)
            .await;

        let found = provider(&server).search_tv("Breaking Bad", None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, MediaKind::TvSeason);
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(provider(&server).fetch_movie(1).await.is_err());
    }
}
