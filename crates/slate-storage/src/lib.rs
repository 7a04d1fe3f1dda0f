//! Outbound HTTP plumbing, the aggregation cache, and the durable game/team
//! store behind the natural-key upsert contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use slate_core::{Event, GameStatus, League};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::info_span;

pub const CRATE_NAME: &str = "slate-storage";

// ---------------------------------------------------------------------------
// HTTP fetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// Single bounded retry with a short fixed backoff. A provider that exhausts
/// this budget degrades to an empty result upstream.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(12),
            user_agent: None,
            global_concurrency: 8,
            per_source_concurrency: 2,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Shared outbound client for the four provider integrations. Each provider
/// gets its own concurrency lane so a slow upstream cannot starve the others.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build()?;
        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            retry: config.retry,
        })
    }

    async fn per_source_semaphore(&self, source_id: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    /// GET a JSON document, decoding into `T`. Retries once on transport
    /// errors and retryable statuses, then gives up.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        source_id: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let _global = self.global_limit.acquire().await.expect("semaphore not closed");
        let per_source = self.per_source_semaphore(source_id).await;
        let _source = per_source.acquire().await.expect("semaphore not closed");

        let span = info_span!("provider_fetch", source_id, url);
        let _guard = span.enter();

        let mut attempt = 0;
        loop {
            let mut request = self.client.get(url);
            if !query.is_empty() {
                request = request.query(query);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        return Ok(resp.json::<T>().await?);
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.retry.max_retries
                    {
                        attempt += 1;
                        tokio::time::sleep(self.retry.backoff).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.retry.max_retries
                    {
                        attempt += 1;
                        tokio::time::sleep(self.retry.backoff).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation cache
// ---------------------------------------------------------------------------

/// Cache TTL for the live aggregation path; scores move during play.
pub const LIVE_TTL: Duration = Duration::from_secs(60);
/// Cache TTL for the pre-ingested, already-persisted read path.
pub const STORED_TTL: Duration = Duration::from_secs(3600);

/// Cache identity: one entry per (read path, local calendar date, timezone).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: &'static str,
    pub date: String,
    pub timezone: String,
}

impl CacheKey {
    pub fn live(date: NaiveDate, tz: Tz) -> Self {
        Self {
            path: "today",
            date: date.to_string(),
            timezone: tz.name().to_string(),
        }
    }

    pub fn stored(date: NaiveDate, tz: Tz) -> Self {
        Self {
            path: "stored",
            date: date.to_string(),
            timezone: tz.name().to_string(),
        }
    }
}

/// Explicit cache seam passed into the aggregator; no hidden global state.
#[async_trait]
pub trait EventCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Option<Vec<Event>>;
    async fn put(&self, key: CacheKey, events: Vec<Event>, ttl: Duration);
    /// Removes exactly the entry for `key`; there is no broader sweep.
    async fn evict(&self, key: &CacheKey);
}

#[derive(Debug)]
struct CacheEntry {
    events: Vec<Event>,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct InMemoryEventCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl InMemoryEventCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventCache for InMemoryEventCache {
    async fn get(&self, key: &CacheKey) -> Option<Vec<Event>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.events.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn put(&self, key: CacheKey, events: Vec<Event>, ttl: Duration) {
        let entry = CacheEntry {
            events,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().await.insert(key, entry);
    }

    async fn evict(&self, key: &CacheKey) {
        self.entries.lock().await.remove(key);
    }
}

// ---------------------------------------------------------------------------
// Game/team store
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// The (league, external_id, game_date) triple that uniquely identifies a
/// persisted game. Provider ids can repeat across seasons, so the local
/// calendar date participates in identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    pub league: League,
    pub external_id: String,
    pub game_date: NaiveDate,
}

/// Write payload for an upsert: the canonical event, its derived local game
/// date, and best-effort resolved team references.
#[derive(Debug, Clone)]
pub struct NewGame {
    pub event: Event,
    pub game_date: NaiveDate,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
}

impl NewGame {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            league: self.event.league,
            external_id: self.event.external_id.clone(),
            game_date: self.game_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRow {
    pub id: i64,
    pub league: League,
    pub external_id: String,
    pub game_date: NaiveDate,
    pub status: GameStatus,
    pub start_time_utc: DateTime<Utc>,
    pub venue: Option<String>,
    pub venue_timezone: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub home_score: u32,
    pub away_score: u32,
    pub link: Option<String>,
}

impl GameRow {
    /// Project a persisted row back into the canonical event shape used by
    /// the read path.
    pub fn to_event(&self) -> Event {
        Event {
            external_id: self.external_id.clone(),
            league: self.league,
            status: self.status,
            start_time: self.start_time_utc,
            raw_start_time: Some(self.start_time_utc.to_rfc3339()),
            venue: self.venue.clone(),
            venue_timezone: self.venue_timezone.clone(),
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            home_score: self.home_score,
            away_score: self.away_score,
            link: self.link.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRow {
    pub id: i64,
    pub league: League,
    pub name: String,
    pub abbreviation: String,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTeam {
    pub league: League,
    pub name: String,
    pub abbreviation: String,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
}

/// Narrow persistence contract: natural-key upsert plus lookups. Conflicting
/// concurrent writers serialize here; last write wins on the unique key.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn upsert_game(&self, game: NewGame) -> Result<i64, StoreError>;
    async fn find_game(&self, key: &NaturalKey) -> Result<Option<GameRow>, StoreError>;
    /// Games whose UTC start instant falls in `[start, end)`, ascending.
    async fn games_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GameRow>, StoreError>;
    async fn upsert_team(&self, team: NewTeam) -> Result<i64, StoreError>;
    async fn find_team(&self, league: League, name: &str) -> Result<Option<TeamRow>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Build a pool without touching the database; connections open on first
    /// use. Useful for wiring state before Postgres is reachable.
    pub fn connect_lazy(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))
    }
}

#[async_trait]
impl GameStore for PgEventStore {
    async fn upsert_game(&self, game: NewGame) -> Result<i64, StoreError> {
        let event = &game.event;
        let row = sqlx::query(
            r#"
            INSERT INTO games (
                league, external_id, game_date, start_time_utc, status,
                venue, venue_timezone, home_team, away_team,
                home_team_id, away_team_id, home_score, away_score, link,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW(), NOW())
            ON CONFLICT (league, external_id, game_date) DO UPDATE SET
                start_time_utc = EXCLUDED.start_time_utc,
                status         = EXCLUDED.status,
                venue          = EXCLUDED.venue,
                venue_timezone = EXCLUDED.venue_timezone,
                home_team      = EXCLUDED.home_team,
                away_team      = EXCLUDED.away_team,
                home_team_id   = EXCLUDED.home_team_id,
                away_team_id   = EXCLUDED.away_team_id,
                home_score     = EXCLUDED.home_score,
                away_score     = EXCLUDED.away_score,
                link           = EXCLUDED.link,
                updated_at     = NOW()
            RETURNING id
            "#,
        )
        .bind(event.league.as_str())
        .bind(&event.external_id)
        .bind(game.game_date)
        .bind(event.start_time)
        .bind(event.status.as_str())
        .bind(&event.venue)
        .bind(&event.venue_timezone)
        .bind(&event.home_team)
        .bind(&event.away_team)
        .bind(game.home_team_id)
        .bind(game.away_team_id)
        .bind(clamp_score(event.home_score))
        .bind(clamp_score(event.away_score))
        .bind(&event.link)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn find_game(&self, key: &NaturalKey) -> Result<Option<GameRow>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, league, external_id, game_date, status, start_time_utc,
                   venue, venue_timezone, home_team, away_team,
                   home_team_id, away_team_id, home_score, away_score, link
              FROM games
             WHERE league = $1 AND external_id = $2 AND game_date = $3
            "#,
        )
        .bind(key.league.as_str())
        .bind(&key.external_id)
        .bind(key.game_date)
        .fetch_optional(&self.pool)
        .await?;
        row.map(game_row_from).transpose()
    }

    async fn games_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GameRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, league, external_id, game_date, status, start_time_utc,
                   venue, venue_timezone, home_team, away_team,
                   home_team_id, away_team_id, home_score, away_score, link
              FROM games
             WHERE start_time_utc >= $1 AND start_time_utc < $2
             ORDER BY start_time_utc
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(game_row_from).collect()
    }

    async fn upsert_team(&self, team: NewTeam) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO teams (
                league, name, abbreviation, logo_url,
                primary_color, secondary_color, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT (league, name) DO UPDATE SET
                abbreviation    = EXCLUDED.abbreviation,
                logo_url        = EXCLUDED.logo_url,
                primary_color   = EXCLUDED.primary_color,
                secondary_color = EXCLUDED.secondary_color,
                updated_at      = NOW()
            RETURNING id
            "#,
        )
        .bind(team.league.as_str())
        .bind(&team.name)
        .bind(&team.abbreviation)
        .bind(&team.logo_url)
        .bind(&team.primary_color)
        .bind(&team.secondary_color)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn find_team(&self, league: League, name: &str) -> Result<Option<TeamRow>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, league, name, abbreviation, logo_url,
                   primary_color, secondary_color
              FROM teams
             WHERE league = $1 AND name = $2
            "#,
        )
        .bind(league.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(team_row_from).transpose()
    }
}

fn clamp_score(score: u32) -> i32 {
    score.min(i32::MAX as u32) as i32
}

fn parse_league(raw: &str) -> Result<League, StoreError> {
    raw.parse::<League>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn game_row_from(row: PgRow) -> Result<GameRow, StoreError> {
    let league: String = row.try_get("league")?;
    let status: String = row.try_get("status")?;
    let home_score: i32 = row.try_get("home_score")?;
    let away_score: i32 = row.try_get("away_score")?;
    Ok(GameRow {
        id: row.try_get("id")?,
        league: parse_league(&league)?,
        external_id: row.try_get("external_id")?,
        game_date: row.try_get("game_date")?,
        status: status.parse().unwrap_or_default(),
        start_time_utc: row.try_get("start_time_utc")?,
        venue: row.try_get("venue")?,
        venue_timezone: row.try_get("venue_timezone")?,
        home_team: row.try_get("home_team")?,
        away_team: row.try_get("away_team")?,
        home_team_id: row.try_get("home_team_id")?,
        away_team_id: row.try_get("away_team_id")?,
        home_score: home_score.max(0) as u32,
        away_score: away_score.max(0) as u32,
        link: row.try_get("link")?,
    })
}

fn team_row_from(row: PgRow) -> Result<TeamRow, StoreError> {
    let league: String = row.try_get("league")?;
    Ok(TeamRow {
        id: row.try_get("id")?,
        league: parse_league(&league)?,
        name: row.try_get("name")?,
        abbreviation: row.try_get("abbreviation")?,
        logo_url: row.try_get("logo_url")?,
        primary_color: row.try_get("primary_color")?,
        secondary_color: row.try_get("secondary_color")?,
    })
}
