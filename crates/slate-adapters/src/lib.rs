//! Provider schedule adapters: one per league, each reducing a third-party
//! wire format to the canonical [`Event`] shape.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use slate_core::{status, time, DayWindow, Event, League};
use slate_storage::{FetchError, HttpFetcher, NewTeam};
use thiserror::Error;

pub const CRATE_NAME: &str = "slate-adapters";

const NHL_SCHEDULE_URL: &str = "https://api-web.nhle.com/v1/schedule";
const NHL_STANDINGS_URL: &str = "https://api-web.nhle.com/v1/standings/now";
const NHL_LINK_PREFIX: &str = "https://www.nhl.com";
const NHL_LOGO_PREFIX: &str = "https://assets.nhle.com/logos/nhl/svg";
const NBA_SCOREBOARD_URL: &str =
    "https://cdn.nba.com/static/json/liveData/scoreboard/todaysScoreboard_00.json";
const MLB_SCHEDULE_URL: &str = "https://statsapi.mlb.com/api/v1/schedule";
const MLB_LINK_PREFIX: &str = "https://www.mlb.com";
const NFL_EVENTS_URL: &str = "https://partners.api.espn.com/v2/sports/football/nfl/events";
const ESPN_NBA_TEAMS_URL: &str = "https://site.api.espn.com/apis/site/v2/sports/basketball/nba/teams";
const ESPN_MLB_TEAMS_URL: &str = "https://site.api.espn.com/apis/site/v2/sports/baseball/mlb/teams";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Message(String),
}

/// The (date, timezone) pair a schedule request is resolved against. The
/// timezone decides which local calendar day a UTC start instant belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleQuery {
    pub date: NaiveDate,
    pub timezone: Tz,
}

/// One upstream league schedule feed. Implementations fetch raw JSON through
/// the shared [`HttpFetcher`] and hand back canonical events; callers decide
/// how to treat failure.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn league(&self) -> League;

    async fn fetch_events(
        &self,
        http: &HttpFetcher,
        query: &ScheduleQuery,
    ) -> Result<Vec<Event>, AdapterError>;
}

/// Scores arrive as JSON numbers from some providers and strings from others
/// (the NBA scoreboard in particular). Absent or malformed values read as 0.
fn flexible_score<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(n)) => n.as_f64().filter(|v| *v >= 0.0).unwrap_or(0.0) as u32,
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0)
            .unwrap_or(0.0) as u32,
        _ => 0,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

// ---------------------------------------------------------------------------
// NHL
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NhlScheduleResponse {
    #[serde(rename = "gameWeek", default)]
    game_week: Vec<NhlGameDay>,
}

#[derive(Debug, Deserialize)]
struct NhlGameDay {
    #[serde(default)]
    games: Vec<NhlGame>,
}

#[derive(Debug, Deserialize)]
struct NhlGame {
    id: Option<i64>,
    #[serde(rename = "startTimeUTC")]
    start_time_utc: Option<String>,
    #[serde(rename = "gameState", default)]
    game_state: String,
    venue: Option<NhlLocalized>,
    #[serde(rename = "venueTimezone")]
    venue_timezone: Option<String>,
    #[serde(rename = "homeTeam")]
    home_team: Option<NhlScheduleTeam>,
    #[serde(rename = "awayTeam")]
    away_team: Option<NhlScheduleTeam>,
    #[serde(rename = "gameCenterLink")]
    game_center_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NhlLocalized {
    default: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NhlScheduleTeam {
    #[serde(rename = "placeName")]
    place_name: Option<NhlLocalized>,
    #[serde(rename = "commonName")]
    common_name: Option<NhlLocalized>,
    abbrev: Option<String>,
}

impl NhlScheduleTeam {
    /// `"{placeName} {commonName}"`, falling back to the abbreviation when
    /// neither localized part is present.
    fn display_name(&self) -> String {
        let parts: Vec<&str> = [
            self.place_name.as_ref().and_then(|p| p.default.as_deref()),
            self.common_name.as_ref().and_then(|c| c.default.as_deref()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
        if parts.is_empty() {
            self.abbrev.clone().unwrap_or_default()
        } else {
            parts.join(" ")
        }
    }
}

/// Reduce a weekly NHL schedule payload to the games whose start instant
/// falls on `query.date` in `query.timezone`. The feed groups games by the
/// league's own calendar, which disagrees with the caller's near midnight.
fn map_nhl_schedule(payload: NhlScheduleResponse, query: &ScheduleQuery) -> Vec<Event> {
    let mut events = Vec::new();
    for day in payload.game_week {
        for game in day.games {
            let Some(start) = time::parse_instant(game.start_time_utc.as_deref()) else {
                continue;
            };
            if DayWindow::local_date_of(start, query.timezone) != query.date {
                continue;
            }
            events.push(Event {
                external_id: game.id.map(|id| id.to_string()).unwrap_or_default(),
                league: League::Nhl,
                status: status::normalize_nhl(&game.game_state),
                start_time: start,
                raw_start_time: game.start_time_utc,
                venue: game.venue.and_then(|v| non_empty(v.default)),
                venue_timezone: non_empty(game.venue_timezone),
                home_team: game
                    .home_team
                    .as_ref()
                    .map(NhlScheduleTeam::display_name)
                    .unwrap_or_default(),
                away_team: game
                    .away_team
                    .as_ref()
                    .map(NhlScheduleTeam::display_name)
                    .unwrap_or_default(),
                // The schedule payload carries no linescore.
                home_score: 0,
                away_score: 0,
                link: game
                    .game_center_link
                    .map(|path| format!("{NHL_LINK_PREFIX}{path}")),
            });
        }
    }
    events
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NhlSchedule;

#[async_trait]
impl ScheduleSource for NhlSchedule {
    fn source_id(&self) -> &'static str {
        "nhl-schedule"
    }

    fn league(&self) -> League {
        League::Nhl
    }

    async fn fetch_events(
        &self,
        http: &HttpFetcher,
        query: &ScheduleQuery,
    ) -> Result<Vec<Event>, AdapterError> {
        let url = format!("{NHL_SCHEDULE_URL}/{}", query.date);
        let payload: NhlScheduleResponse = http.fetch_json(self.source_id(), &url, &[]).await?;
        Ok(map_nhl_schedule(payload, query))
    }
}

// ---------------------------------------------------------------------------
// NBA
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NbaScoreboardResponse {
    scoreboard: Option<NbaScoreboard>,
}

#[derive(Debug, Deserialize)]
struct NbaScoreboard {
    #[serde(default)]
    games: Vec<NbaGame>,
}

#[derive(Debug, Deserialize)]
struct NbaGame {
    #[serde(rename = "gameId", default)]
    game_id: String,
    #[serde(rename = "gameStatusText", default)]
    game_status_text: String,
    #[serde(rename = "gameEt")]
    game_et: Option<String>,
    #[serde(rename = "gameTimeUTC")]
    game_time_utc: Option<String>,
    #[serde(rename = "arenaName")]
    arena_name: Option<String>,
    #[serde(rename = "homeTeam")]
    home_team: Option<NbaScoreboardTeam>,
    #[serde(rename = "awayTeam")]
    away_team: Option<NbaScoreboardTeam>,
}

#[derive(Debug, Deserialize)]
struct NbaScoreboardTeam {
    #[serde(rename = "teamName", default)]
    team_name: String,
    #[serde(default, deserialize_with = "flexible_score")]
    score: u32,
}

/// The scoreboard covers whatever the league considers "today"; there is no
/// date parameter. `gameEt` carries a `Z` suffix but is Eastern wall-clock
/// time, so it is reinterpreted rather than taken at face value. Games whose
/// time cannot be recovered are stamped with the current instant.
fn map_nba_scoreboard(payload: NbaScoreboardResponse) -> Vec<Event> {
    let games = payload.scoreboard.map(|s| s.games).unwrap_or_default();
    games
        .into_iter()
        .map(|game| {
            let start = game
                .game_et
                .as_deref()
                .and_then(time::eastern_to_utc)
                .unwrap_or_else(Utc::now);
            let (home_name, home_score) = game
                .home_team
                .map(|t| (t.team_name, t.score))
                .unwrap_or_default();
            let (away_name, away_score) = game
                .away_team
                .map(|t| (t.team_name, t.score))
                .unwrap_or_default();
            Event {
                external_id: game.game_id,
                league: League::Nba,
                status: status::normalize_nba(&game.game_status_text),
                start_time: start,
                raw_start_time: game.game_time_utc,
                venue: non_empty(game.arena_name),
                venue_timezone: None,
                home_team: home_name,
                away_team: away_name,
                home_score,
                away_score,
                link: None,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NbaScoreboardSource;

#[async_trait]
impl ScheduleSource for NbaScoreboardSource {
    fn source_id(&self) -> &'static str {
        "nba-scoreboard"
    }

    fn league(&self) -> League {
        League::Nba
    }

    async fn fetch_events(
        &self,
        http: &HttpFetcher,
        _query: &ScheduleQuery,
    ) -> Result<Vec<Event>, AdapterError> {
        let payload: NbaScoreboardResponse = http
            .fetch_json(self.source_id(), NBA_SCOREBOARD_URL, &[])
            .await?;
        Ok(map_nba_scoreboard(payload))
    }
}

// ---------------------------------------------------------------------------
// MLB
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MlbScheduleResponse {
    #[serde(default)]
    dates: Vec<MlbScheduleDate>,
}

#[derive(Debug, Deserialize)]
struct MlbScheduleDate {
    #[serde(default)]
    games: Vec<MlbGame>,
}

#[derive(Debug, Deserialize)]
struct MlbGame {
    #[serde(rename = "gamePk")]
    game_pk: Option<i64>,
    #[serde(rename = "gameDate")]
    game_date: Option<String>,
    status: Option<MlbGameState>,
    teams: Option<MlbMatchup>,
    venue: Option<MlbVenue>,
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MlbGameState {
    #[serde(rename = "detailedState", default)]
    detailed_state: String,
}

#[derive(Debug, Deserialize)]
struct MlbMatchup {
    home: Option<MlbMatchupSide>,
    away: Option<MlbMatchupSide>,
}

#[derive(Debug, Deserialize)]
struct MlbMatchupSide {
    team: Option<MlbTeamRef>,
    #[serde(default, deserialize_with = "flexible_score")]
    score: u32,
}

#[derive(Debug, Deserialize)]
struct MlbTeamRef {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MlbVenue {
    name: Option<String>,
}

fn map_mlb_schedule(payload: MlbScheduleResponse) -> Vec<Event> {
    let mut events = Vec::new();
    for date in payload.dates {
        for game in date.games {
            let start =
                time::parse_instant(game.game_date.as_deref()).unwrap_or_else(Utc::now);
            let (home, away) = match game.teams {
                Some(matchup) => (matchup.home, matchup.away),
                None => (None, None),
            };
            let (home_name, home_score) = side_name_and_score(home);
            let (away_name, away_score) = side_name_and_score(away);
            events.push(Event {
                external_id: game.game_pk.map(|pk| pk.to_string()).unwrap_or_default(),
                league: League::Mlb,
                status: status::normalize_mlb(
                    game.status
                        .as_ref()
                        .map(|s| s.detailed_state.as_str())
                        .unwrap_or(""),
                ),
                start_time: start,
                raw_start_time: game.game_date,
                venue: game.venue.and_then(|v| non_empty(v.name)),
                venue_timezone: None,
                home_team: home_name,
                away_team: away_name,
                home_score,
                away_score,
                link: game.link.map(|path| format!("{MLB_LINK_PREFIX}{path}")),
            });
        }
    }
    events
}

fn side_name_and_score(side: Option<MlbMatchupSide>) -> (String, u32) {
    match side {
        Some(side) => (
            side.team.and_then(|t| t.name).unwrap_or_default(),
            side.score,
        ),
        None => (String::new(), 0),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MlbSchedule;

#[async_trait]
impl ScheduleSource for MlbSchedule {
    fn source_id(&self) -> &'static str {
        "mlb-schedule"
    }

    fn league(&self) -> League {
        League::Mlb
    }

    async fn fetch_events(
        &self,
        http: &HttpFetcher,
        query: &ScheduleQuery,
    ) -> Result<Vec<Event>, AdapterError> {
        let params = [
            ("sportId", "1".to_string()),
            ("date", query.date.to_string()),
            ("hydrate", "team,linescore".to_string()),
        ];
        let payload: MlbScheduleResponse = http
            .fetch_json(self.source_id(), MLB_SCHEDULE_URL, &params)
            .await?;
        Ok(map_mlb_schedule(payload))
    }
}

// ---------------------------------------------------------------------------
// NFL
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NflEventsResponse {
    #[serde(default)]
    events: Vec<NflEvent>,
}

#[derive(Debug, Deserialize)]
struct NflEvent {
    id: Option<String>,
    date: Option<String>,
    #[serde(default)]
    competitions: Vec<NflCompetition>,
    #[serde(default)]
    links: Vec<NflLink>,
}

#[derive(Debug, Deserialize)]
struct NflCompetition {
    #[serde(default)]
    competitors: Vec<NflCompetitor>,
    status: Option<NflCompetitionStatus>,
    venue: Option<NflVenue>,
}

#[derive(Debug, Deserialize)]
struct NflCompetitionStatus {
    #[serde(rename = "type")]
    kind: Option<NflStatusType>,
}

#[derive(Debug, Deserialize)]
struct NflStatusType {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct NflCompetitor {
    #[serde(rename = "homeAway", default)]
    home_away: String,
    team: Option<NflTeamRef>,
    score: Option<NflScore>,
}

#[derive(Debug, Deserialize)]
struct NflTeamRef {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NflScore {
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NflVenue {
    #[serde(rename = "fullName")]
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NflLink {
    href: Option<String>,
}

/// Competitors arrive in arbitrary order; the `homeAway` marker decides the
/// side. Missing sides degrade to empty names and zero scores.
fn map_nfl_events(payload: NflEventsResponse) -> Vec<Event> {
    payload
        .events
        .into_iter()
        .map(|event| {
            let competition = event.competitions.into_iter().next();
            let (competitors, status_name, venue) = match competition {
                Some(c) => (
                    c.competitors,
                    c.status
                        .and_then(|s| s.kind)
                        .map(|k| k.name)
                        .unwrap_or_default(),
                    c.venue.and_then(|v| non_empty(v.full_name)),
                ),
                None => (Vec::new(), String::new(), None),
            };
            let mut home_name = String::new();
            let mut away_name = String::new();
            let mut home_score = 0;
            let mut away_score = 0;
            for competitor in competitors {
                let name = competitor
                    .team
                    .and_then(|t| t.display_name)
                    .unwrap_or_default();
                let score = competitor
                    .score
                    .and_then(|s| s.value)
                    .filter(|v| *v >= 0.0)
                    .unwrap_or(0.0) as u32;
                match competitor.home_away.as_str() {
                    "home" => {
                        home_name = name;
                        home_score = score;
                    }
                    "away" => {
                        away_name = name;
                        away_score = score;
                    }
                    _ => {}
                }
            }
            Event {
                external_id: event.id.unwrap_or_default(),
                league: League::Nfl,
                status: status::normalize_espn(&status_name),
                start_time: time::parse_instant(event.date.as_deref())
                    .unwrap_or_else(Utc::now),
                raw_start_time: event.date,
                venue,
                venue_timezone: None,
                home_team: home_name,
                away_team: away_name,
                home_score,
                away_score,
                link: event.links.into_iter().find_map(|l| non_empty(l.href)),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NflEvents;

#[async_trait]
impl ScheduleSource for NflEvents {
    fn source_id(&self) -> &'static str {
        "nfl-events"
    }

    fn league(&self) -> League {
        League::Nfl
    }

    async fn fetch_events(
        &self,
        http: &HttpFetcher,
        query: &ScheduleQuery,
    ) -> Result<Vec<Event>, AdapterError> {
        let compact = query.date.format("%Y%m%d").to_string();
        let params = [("dates", format!("{compact}-{compact}"))];
        let payload: NflEventsResponse = http
            .fetch_json(self.source_id(), NFL_EVENTS_URL, &params)
            .await?;
        Ok(map_nfl_events(payload))
    }
}

/// All four league sources in a fixed order.
pub fn all_sources() -> Vec<Box<dyn ScheduleSource>> {
    vec![
        Box::new(NhlSchedule),
        Box::new(NbaScoreboardSource),
        Box::new(MlbSchedule),
        Box::new(NflEvents),
    ]
}

pub fn source_for_league(league: League) -> Box<dyn ScheduleSource> {
    match league {
        League::Nhl => Box::new(NhlSchedule),
        League::Nba => Box::new(NbaScoreboardSource),
        League::Mlb => Box::new(MlbSchedule),
        League::Nfl => Box::new(NflEvents),
    }
}

// ---------------------------------------------------------------------------
// Season schedules
// ---------------------------------------------------------------------------

pub mod season {
    //! Full-season schedule feeds for bulk replay. Only the NBA publishes a
    //! static whole-season document; the other leagues replay date by date.

    use super::*;

    const NBA_SEASON_URL: &str =
        "https://cdn.nba.com/static/json/staticData/scheduleLeagueV2.json";

    #[derive(Debug, Deserialize)]
    struct NbaSeasonResponse {
        #[serde(rename = "leagueSchedule")]
        league_schedule: Option<NbaLeagueSchedule>,
    }

    #[derive(Debug, Deserialize)]
    struct NbaLeagueSchedule {
        #[serde(rename = "gameDates", default)]
        game_dates: Vec<NbaSeasonDate>,
    }

    #[derive(Debug, Deserialize)]
    struct NbaSeasonDate {
        #[serde(default)]
        games: Vec<NbaSeasonGame>,
    }

    #[derive(Debug, Deserialize)]
    struct NbaSeasonGame {
        #[serde(rename = "gameId", default)]
        game_id: String,
        #[serde(rename = "gameDateTimeUTC")]
        game_date_time_utc: Option<String>,
        #[serde(rename = "gameStatusText", default)]
        game_status_text: String,
        #[serde(rename = "arenaName")]
        arena_name: Option<String>,
        #[serde(rename = "homeTeam")]
        home_team: Option<NbaSeasonTeam>,
        #[serde(rename = "awayTeam")]
        away_team: Option<NbaSeasonTeam>,
    }

    #[derive(Debug, Deserialize)]
    struct NbaSeasonTeam {
        #[serde(rename = "teamCity")]
        team_city: Option<String>,
        #[serde(rename = "teamName")]
        team_name: Option<String>,
        #[serde(default, deserialize_with = "flexible_score")]
        score: u32,
    }

    impl NbaSeasonTeam {
        fn display_name(&self) -> String {
            let parts: Vec<&str> = [self.team_city.as_deref(), self.team_name.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            parts.join(" ")
        }
    }

    /// Unlike the daily scoreboard, this feed's UTC timestamps are genuine
    /// UTC. Rows without a parseable instant are dropped; a replay has no
    /// sensible "now" substitute for a game months away.
    fn map_nba_season(payload: NbaSeasonResponse) -> Vec<Event> {
        let dates = payload
            .league_schedule
            .map(|s| s.game_dates)
            .unwrap_or_default();
        let mut events = Vec::new();
        for date in dates {
            for game in date.games {
                let Some(start) = time::parse_instant(game.game_date_time_utc.as_deref())
                else {
                    continue;
                };
                let (home_name, home_score) = game
                    .home_team
                    .map(|t| (t.display_name(), t.score))
                    .unwrap_or_default();
                let (away_name, away_score) = game
                    .away_team
                    .map(|t| (t.display_name(), t.score))
                    .unwrap_or_default();
                events.push(Event {
                    external_id: game.game_id,
                    league: League::Nba,
                    status: status::normalize_nba(&game.game_status_text),
                    start_time: start,
                    raw_start_time: game.game_date_time_utc,
                    venue: non_empty(game.arena_name),
                    venue_timezone: None,
                    home_team: home_name,
                    away_team: away_name,
                    home_score,
                    away_score,
                    link: None,
                });
            }
        }
        events
    }

    pub async fn fetch_nba_season(http: &HttpFetcher) -> Result<Vec<Event>, AdapterError> {
        let payload: NbaSeasonResponse =
            http.fetch_json("nba-season", NBA_SEASON_URL, &[]).await?;
        Ok(map_nba_season(payload))
    }

}

// ---------------------------------------------------------------------------
// Team directories
// ---------------------------------------------------------------------------

pub mod teams {
    //! League team directories, fetched from the NHL standings feed and the
    //! ESPN site API. Rows missing a name or abbreviation are skipped.

    use super::*;

    #[derive(Debug, Deserialize)]
    struct NhlStandingsResponse {
        #[serde(default)]
        standings: Vec<NhlStandingRow>,
    }

    #[derive(Debug, Deserialize)]
    struct NhlStandingRow {
        #[serde(rename = "teamName")]
        team_name: Option<NhlLocalized>,
        #[serde(rename = "teamAbbrev")]
        team_abbrev: Option<NhlLocalized>,
    }

    fn map_nhl_standings(payload: NhlStandingsResponse) -> Vec<NewTeam> {
        payload
            .standings
            .into_iter()
            .filter_map(|row| {
                let name = non_empty(row.team_name.and_then(|n| n.default))?;
                let abbrev = non_empty(row.team_abbrev.and_then(|a| a.default))?;
                let logo_url = Some(format!("{NHL_LOGO_PREFIX}/{abbrev}_light.svg"));
                Some(NewTeam {
                    league: League::Nhl,
                    name,
                    abbreviation: abbrev,
                    logo_url,
                    primary_color: None,
                    secondary_color: None,
                })
            })
            .collect()
    }

    pub async fn fetch_nhl_teams(http: &HttpFetcher) -> Result<Vec<NewTeam>, AdapterError> {
        let payload: NhlStandingsResponse =
            http.fetch_json("nhl-standings", NHL_STANDINGS_URL, &[]).await?;
        Ok(map_nhl_standings(payload))
    }

    #[derive(Debug, Deserialize)]
    struct EspnTeamsResponse {
        #[serde(default)]
        sports: Vec<EspnSport>,
    }

    #[derive(Debug, Deserialize)]
    struct EspnSport {
        #[serde(default)]
        leagues: Vec<EspnLeague>,
    }

    #[derive(Debug, Deserialize)]
    struct EspnLeague {
        #[serde(default)]
        teams: Vec<EspnTeamWrapper>,
    }

    #[derive(Debug, Deserialize)]
    struct EspnTeamWrapper {
        team: Option<EspnTeam>,
    }

    #[derive(Debug, Deserialize)]
    struct EspnTeam {
        #[serde(rename = "displayName")]
        display_name: Option<String>,
        abbreviation: Option<String>,
        #[serde(default)]
        logos: Vec<EspnLogo>,
    }

    #[derive(Debug, Deserialize)]
    struct EspnLogo {
        href: Option<String>,
    }

    fn map_espn_teams(payload: EspnTeamsResponse, league: League) -> Vec<NewTeam> {
        payload
            .sports
            .into_iter()
            .flat_map(|sport| sport.leagues)
            .flat_map(|l| l.teams)
            .filter_map(|wrapper| {
                let team = wrapper.team?;
                let name = non_empty(team.display_name)?;
                let abbreviation = non_empty(team.abbreviation)?;
                let logo_url = team.logos.into_iter().find_map(|l| non_empty(l.href));
                Some(NewTeam {
                    league,
                    name,
                    abbreviation,
                    logo_url,
                    primary_color: None,
                    secondary_color: None,
                })
            })
            .collect()
    }

    pub async fn fetch_nba_teams(http: &HttpFetcher) -> Result<Vec<NewTeam>, AdapterError> {
        let payload: EspnTeamsResponse =
            http.fetch_json("nba-teams", ESPN_NBA_TEAMS_URL, &[]).await?;
        Ok(map_espn_teams(payload, League::Nba))
    }

    pub async fn fetch_mlb_teams(http: &HttpFetcher) -> Result<Vec<NewTeam>, AdapterError> {
        let payload: EspnTeamsResponse =
            http.fetch_json("mlb-teams", ESPN_MLB_TEAMS_URL, &[]).await?;
        Ok(map_espn_teams(payload, League::Mlb))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn nhl_standings_rows_become_teams_with_derived_logos() {
            let payload: NhlStandingsResponse = serde_json::from_str(
                r#"{
                    "standings": [
                        {
                            "teamName": {"default": "Colorado Avalanche"},
                            "teamAbbrev": {"default": "COL"}
                        },
                        {
                            "teamName": {"default": ""},
                            "teamAbbrev": {"default": "XXX"}
                        },
                        {
                            "teamAbbrev": {"default": "NONAME"}
                        }
                    ]
                }"#,
            )
            .unwrap();
            let teams = map_nhl_standings(payload);
            assert_eq!(teams.len(), 1);
            assert_eq!(teams[0].name, "Colorado Avalanche");
            assert_eq!(teams[0].abbreviation, "COL");
            assert_eq!(
                teams[0].logo_url.as_deref(),
                Some("https://assets.nhle.com/logos/nhl/svg/COL_light.svg")
            );
        }

        #[test]
        fn espn_team_lists_skip_incomplete_rows() {
            let payload: EspnTeamsResponse = serde_json::from_str(
                r#"{
                    "sports": [{
                        "leagues": [{
                            "teams": [
                                {"team": {
                                    "displayName": "Boston Celtics",
                                    "abbreviation": "BOS",
                                    "logos": [{"href": "https://a.espncdn.com/bos.png"}]
                                }},
                                {"team": {"displayName": "No Abbrev Club"}},
                                {}
                            ]
                        }]
                    }]
                }"#,
            )
            .unwrap();
            let teams = map_espn_teams(payload, League::Nba);
            assert_eq!(teams.len(), 1);
            assert_eq!(teams[0].league, League::Nba);
            assert_eq!(teams[0].name, "Boston Celtics");
            assert_eq!(
                teams[0].logo_url.as_deref(),
                Some("https://a.espncdn.com/bos.png")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use chrono_tz::America::New_York;
    use slate_core::GameStatus;

    fn query(y: i32, m: u32, d: u32) -> ScheduleQuery {
        ScheduleQuery {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            timezone: New_York,
        }
    }

    #[test]
    fn nhl_week_payload_is_filtered_to_the_requested_local_date() {
        // The feed's own grouping says Jan 16, but 02:00 UTC on Jan 16 is
        // still Jan 15 in Eastern time.
        let payload: NhlScheduleResponse = serde_json::from_str(
            r#"{
                "gameWeek": [
                    {
                        "date": "2024-01-15",
                        "games": [{
                            "id": 2023020742,
                            "startTimeUTC": "2024-01-16T00:00:00Z",
                            "gameState": "FUT",
                            "venue": {"default": "Ball Arena"},
                            "venueTimezone": "America/Denver",
                            "homeTeam": {
                                "placeName": {"default": "Colorado"},
                                "commonName": {"default": "Avalanche"},
                                "abbrev": "COL"
                            },
                            "awayTeam": {"abbrev": "SEA"},
                            "gameCenterLink": "/gamecenter/sea-vs-col/2024/01/15/2023020742"
                        }]
                    },
                    {
                        "date": "2024-01-16",
                        "games": [{
                            "id": 2023020750,
                            "startTimeUTC": "2024-01-16T02:00:00Z",
                            "gameState": "FUT",
                            "homeTeam": {"abbrev": "VAN"},
                            "awayTeam": {"abbrev": "CGY"}
                        }, {
                            "id": 2023020760,
                            "startTimeUTC": "2024-01-17T00:00:00Z",
                            "gameState": "FUT",
                            "homeTeam": {"abbrev": "TOR"},
                            "awayTeam": {"abbrev": "MTL"}
                        }]
                    }
                ]
            }"#,
        )
        .unwrap();

        let events = map_nhl_schedule(payload, &query(2024, 1, 15));
        let ids: Vec<_> = events.iter().map(|e| e.external_id.as_str()).collect();
        assert_eq!(ids, vec!["2023020742", "2023020750"]);

        let first = &events[0];
        assert_eq!(first.league, League::Nhl);
        assert_eq!(first.status, GameStatus::Scheduled);
        assert_eq!(first.home_team, "Colorado Avalanche");
        assert_eq!(first.away_team, "SEA");
        assert_eq!(first.venue.as_deref(), Some("Ball Arena"));
        assert_eq!(first.venue_timezone.as_deref(), Some("America/Denver"));
        assert_eq!(first.home_score, 0);
        assert_eq!(
            first.link.as_deref(),
            Some("https://www.nhl.com/gamecenter/sea-vs-col/2024/01/15/2023020742")
        );
    }

    #[test]
    fn nhl_games_without_a_start_time_are_dropped() {
        let payload: NhlScheduleResponse = serde_json::from_str(
            r#"{
                "gameWeek": [{
                    "games": [{
                        "id": 1,
                        "gameState": "FUT",
                        "homeTeam": {"abbrev": "BOS"},
                        "awayTeam": {"abbrev": "NYR"}
                    }]
                }]
            }"#,
        )
        .unwrap();
        assert!(map_nhl_schedule(payload, &query(2024, 1, 15)).is_empty());
    }

    #[test]
    fn nba_scoreboard_reinterprets_eastern_times_and_coerces_scores() {
        let payload: NbaScoreboardResponse = serde_json::from_str(
            r#"{
                "scoreboard": {
                    "games": [{
                        "gameId": "0022300561",
                        "gameStatusText": "Q3 4:12",
                        "gameEt": "2024-01-15T19:30:00Z",
                        "gameTimeUTC": "2024-01-15T19:30:00Z",
                        "arenaName": "TD Garden",
                        "homeTeam": {"teamName": "Celtics", "score": "87"},
                        "awayTeam": {"teamName": "Knicks", "score": 79}
                    }]
                }
            }"#,
        )
        .unwrap();

        let events = map_nba_scoreboard(payload);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.status, GameStatus::Live);
        assert_eq!(event.home_score, 87);
        assert_eq!(event.away_score, 79);
        // 7:30 PM Eastern in January is 00:30 UTC the next day.
        assert_eq!(event.start_time.day(), 16);
        assert_eq!(event.start_time.hour(), 0);
        assert_eq!(event.start_time.minute(), 30);
        assert_eq!(event.raw_start_time.as_deref(), Some("2024-01-15T19:30:00Z"));
        assert_eq!(event.venue.as_deref(), Some("TD Garden"));
    }

    #[test]
    fn nba_games_with_unparseable_times_get_a_current_timestamp() {
        let payload: NbaScoreboardResponse = serde_json::from_str(
            r#"{
                "scoreboard": {
                    "games": [{
                        "gameId": "1",
                        "gameStatusText": "7:00 pm ET",
                        "gameEt": "not a time",
                        "homeTeam": {"teamName": "Lakers", "score": 0},
                        "awayTeam": {"teamName": "Suns", "score": 0}
                    }]
                }
            }"#,
        )
        .unwrap();

        let before = Utc::now();
        let events = map_nba_scoreboard(payload);
        let after = Utc::now();
        assert_eq!(events.len(), 1);
        assert!(events[0].start_time >= before && events[0].start_time <= after);
    }

    #[test]
    fn mlb_schedule_reads_nested_team_names_scores_and_links() {
        let payload: MlbScheduleResponse = serde_json::from_str(
            r#"{
                "dates": [{
                    "date": "2024-07-04",
                    "games": [{
                        "gamePk": 745804,
                        "gameDate": "2024-07-04T23:05:00Z",
                        "status": {"detailedState": "In Progress"},
                        "teams": {
                            "home": {"team": {"name": "New York Yankees"}, "score": 3},
                            "away": {"team": {"name": "Boston Red Sox"}, "score": 2}
                        },
                        "venue": {"name": "Yankee Stadium"},
                        "link": "/api/v1.1/game/745804/feed/live"
                    }, {
                        "gamePk": 745805,
                        "gameDate": "2024-07-04T20:10:00Z",
                        "status": {"detailedState": "Scheduled"},
                        "teams": {"home": {"team": {"name": "Cubs"}}, "away": {}}
                    }]
                }]
            }"#,
        )
        .unwrap();

        let events = map_mlb_schedule(payload);
        assert_eq!(events.len(), 2);

        let live = &events[0];
        assert_eq!(live.external_id, "745804");
        assert_eq!(live.status, GameStatus::Live);
        assert_eq!(live.home_team, "New York Yankees");
        assert_eq!(live.away_team, "Boston Red Sox");
        assert_eq!((live.home_score, live.away_score), (3, 2));
        assert_eq!(
            live.link.as_deref(),
            Some("https://www.mlb.com/api/v1.1/game/745804/feed/live")
        );

        let scheduled = &events[1];
        assert_eq!(scheduled.status, GameStatus::Scheduled);
        assert_eq!(scheduled.home_team, "Cubs");
        assert_eq!(scheduled.away_team, "");
        assert_eq!((scheduled.home_score, scheduled.away_score), (0, 0));
    }

    #[test]
    fn nfl_competitors_are_assigned_by_home_away_marker() {
        // Away listed first; assignment follows the marker, not position.
        let payload: NflEventsResponse = serde_json::from_str(
            r#"{
                "events": [{
                    "id": "401547404",
                    "date": "2024-01-15T01:15Z",
                    "competitions": [{
                        "competitors": [
                            {
                                "homeAway": "away",
                                "team": {"displayName": "Green Bay Packers"},
                                "score": {"value": 48.0}
                            },
                            {
                                "homeAway": "home",
                                "team": {"displayName": "Dallas Cowboys"},
                                "score": {"value": 32.0}
                            }
                        ],
                        "status": {"type": {"name": "STATUS_FINAL"}},
                        "venue": {"fullName": "AT&T Stadium"}
                    }],
                    "links": [{"href": "https://www.espn.com/nfl/game/_/gameId/401547404"}]
                }]
            }"#,
        )
        .unwrap();

        let events = map_nfl_events(payload);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.home_team, "Dallas Cowboys");
        assert_eq!(event.away_team, "Green Bay Packers");
        assert_eq!((event.home_score, event.away_score), (32, 48));
        assert_eq!(event.status, GameStatus::Final);
        assert_eq!(event.venue.as_deref(), Some("AT&T Stadium"));
        // Minute-precision ESPN timestamp still parses.
        assert_eq!(
            event.start_time,
            Utc.with_ymd_and_hms(2024, 1, 15, 1, 15, 0).single().unwrap()
        );
        assert_eq!(
            event.link.as_deref(),
            Some("https://www.espn.com/nfl/game/_/gameId/401547404")
        );
    }

    #[test]
    fn nfl_events_without_competitions_still_map() {
        let payload: NflEventsResponse = serde_json::from_str(
            r#"{"events": [{"id": "1", "date": "2024-01-15T18:00:00Z"}]}"#,
        )
        .unwrap();
        let events = map_nfl_events(payload);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, GameStatus::Scheduled);
        assert_eq!(events[0].home_team, "");
        assert_eq!((events[0].home_score, events[0].away_score), (0, 0));
    }

    #[test]
    fn sources_cover_every_league_once() {
        let sources = all_sources();
        let mut leagues: Vec<_> = sources.iter().map(|s| s.league()).collect();
        leagues.sort_by_key(|l| l.as_str());
        leagues.dedup();
        assert_eq!(leagues.len(), League::ALL.len());
        for league in League::ALL {
            assert_eq!(source_for_league(league).league(), league);
        }
    }
}
