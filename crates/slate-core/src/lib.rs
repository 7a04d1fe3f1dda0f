//! Core domain model for the daily sports slate: canonical events,
//! status/time normalization, and timezone day-window resolution.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "slate-core";

/// Default timezone for North American sports when a request omits one.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// The fixed set of supported leagues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum League {
    #[serde(rename = "NHL")]
    Nhl,
    #[serde(rename = "NBA")]
    Nba,
    #[serde(rename = "MLB")]
    Mlb,
    #[serde(rename = "NFL")]
    Nfl,
}

impl League {
    pub const ALL: [League; 4] = [League::Nhl, League::Nba, League::Mlb, League::Nfl];

    pub fn as_str(self) -> &'static str {
        match self {
            League::Nhl => "NHL",
            League::Nba => "NBA",
            League::Mlb => "MLB",
            League::Nfl => "NFL",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for League {
    type Err = UnknownLeague;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NHL" => Ok(League::Nhl),
            "NBA" => Ok(League::Nba),
            "MLB" => Ok(League::Mlb),
            "NFL" => Ok(League::Nfl),
            _ => Err(UnknownLeague(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLeague(pub String);

impl fmt::Display for UnknownLeague {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown league {:?}", self.0)
    }
}

impl std::error::Error for UnknownLeague {}

/// Coarse game state shared by all providers. Provider vocabularies are
/// lossily reduced to this three-value enum; anything unrecognized is
/// `Scheduled`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Scheduled,
    Live,
    Final,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::Live => "live",
            GameStatus::Final => "final",
        }
    }
}

impl FromStr for GameStatus {
    type Err = std::convert::Infallible;

    /// Total: unknown strings fall back to `Scheduled`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "live" => GameStatus::Live,
            "final" => GameStatus::Final,
            _ => GameStatus::Scheduled,
        })
    }
}

/// Canonical cross-provider game representation. Created per fetch and
/// discarded after caching or persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "id")]
    pub external_id: String,
    pub league: League,
    pub status: GameStatus,
    pub start_time: DateTime<Utc>,
    /// The provider's raw start-time string, kept verbatim for debugging
    /// upstream quirks.
    #[serde(rename = "startTimeUTC")]
    pub raw_start_time: Option<String>,
    pub venue: Option<String>,
    pub venue_timezone: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
    pub link: Option<String>,
}

impl Event {
    /// Zero-padded, UTC-normalized ISO-8601 start instant. All events format
    /// through this, so plain string comparison sorts chronologically.
    pub fn start_iso(&self) -> String {
        self.start_time.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Sort a merged multi-provider list ascending by UTC start instant.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| a.start_iso().cmp(&b.start_iso()));
}

pub mod status {
    //! Per-provider status vocabulary reduction. Every function is total:
    //! unrecognized input maps to `Scheduled`.

    use super::*;

    /// NHL `gameState`: `FUT`, `PRE`, `LIVE`, `CRIT`, `FINAL`, `OFF`, ...
    pub fn normalize_nhl(state: &str) -> GameStatus {
        let upper = state.to_ascii_uppercase();
        if upper.contains("FINAL") {
            return GameStatus::Final;
        }
        if matches!(upper.as_str(), "LIVE" | "IN_PROGRESS" | "IN PROGRESS") {
            return GameStatus::Live;
        }
        GameStatus::Scheduled
    }

    static NBA_CLOCK: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\d{1,2}:\d{2} [1-4][A-Z]?|Q[1-4]|OT").expect("valid clock pattern")
    });

    /// NBA `gameStatusText` is free text: `"7:30 pm ET"`, `"Q3 4:12"`,
    /// `"Final"`, `"Final/OT"`. A quarter/clock fragment means live.
    pub fn normalize_nba(text: &str) -> GameStatus {
        if text.to_ascii_uppercase().contains("FINAL") {
            return GameStatus::Final;
        }
        if NBA_CLOCK.is_match(text) {
            return GameStatus::Live;
        }
        GameStatus::Scheduled
    }

    /// MLB `status.detailedState` free-text phrase: `"In Progress"`,
    /// `"Final"`, `"Scheduled"`, `"Pre-Game"`, `"Delayed"`, ...
    pub fn normalize_mlb(state: &str) -> GameStatus {
        let upper = state.to_ascii_uppercase();
        if upper.contains("FINAL") {
            return GameStatus::Final;
        }
        if matches!(upper.as_str(), "IN PROGRESS" | "LIVE") {
            return GameStatus::Live;
        }
        GameStatus::Scheduled
    }

    /// ESPN `status.type.name`: `STATUS_SCHEDULED`, `STATUS_IN_PROGRESS`,
    /// `STATUS_FINAL`.
    pub fn normalize_espn(name: &str) -> GameStatus {
        let upper = name.to_ascii_uppercase();
        if matches!(upper.as_str(), "STATUS_FINAL" | "FINAL") {
            return GameStatus::Final;
        }
        if matches!(upper.as_str(), "STATUS_IN_PROGRESS" | "IN_PROGRESS" | "LIVE") {
            return GameStatus::Live;
        }
        GameStatus::Scheduled
    }
}

pub mod time {
    //! Lenient timestamp parsing plus the NBA Eastern-time reinterpretation.

    use super::*;

    /// Parse a provider timestamp into a true UTC instant. Returns `None` on
    /// absence or parse failure; the "substitute the current instant" policy
    /// is applied at each call site, never here.
    pub fn parse_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        // Minute-precision variants (ESPN) and bare naive datetimes, taken
        // as already-UTC wall clock.
        for format in ["%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }
        None
    }

    /// The NBA scoreboard labels `gameEt` with a `Z` suffix, but the value is
    /// Eastern wall-clock time. Strip the spurious suffix, reinterpret in
    /// `America/New_York`, and convert to true UTC. Ambiguous fall-back local
    /// times resolve to the earliest candidate.
    pub fn eastern_to_utc(raw: &str) -> Option<DateTime<Utc>> {
        let trimmed = raw.trim();
        let naive_text = strip_offset_suffix(trimmed);
        let naive = NaiveDateTime::parse_from_str(naive_text, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(naive_text, "%Y-%m-%dT%H:%M"))
            .ok()?;
        match chrono_tz::America::New_York.from_local_datetime(&naive) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                Some(dt.with_timezone(&Utc))
            }
            LocalResult::None => None,
        }
    }

    /// Drop a trailing `Z` or `+HH:MM`/`-HH:MM` marker, keeping the naive
    /// wall-clock text. The marker is spurious on this feed either way.
    fn strip_offset_suffix(raw: &str) -> &str {
        if let Some(stripped) = raw.strip_suffix('Z') {
            return stripped;
        }
        if raw.len() > 6 && raw.is_char_boundary(raw.len() - 6) {
            let (head, tail) = raw.split_at(raw.len() - 6);
            let bytes = tail.as_bytes();
            if (bytes[0] == b'+' || bytes[0] == b'-')
                && bytes[3] == b':'
                && tail[1..3].bytes().chain(tail[4..].bytes()).all(|b| b.is_ascii_digit())
            {
                return head;
            }
        }
        raw
    }
}

/// The half-open UTC interval `[local midnight, next local midnight)` for a
/// calendar date in a given timezone. Membership in this interval is the only
/// correct way to decide whether an instant is "today" in that zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub local_date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn for_date(local_date: NaiveDate, tz: Tz) -> Self {
        let start = local_midnight_utc(local_date, tz);
        let end = local_midnight_utc(local_date + Duration::days(1), tz);
        Self { local_date, start, end }
    }

    pub fn today(tz: Tz) -> Self {
        Self::for_date(Utc::now().with_timezone(&tz).date_naive(), tz)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// Local calendar date of an instant in this window's timezone scheme;
    /// used by adapters to match provider rows against the requested date.
    pub fn local_date_of(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
        instant.with_timezone(&tz).date_naive()
    }
}

fn local_midnight_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let mut candidate = date.and_time(NaiveTime::MIN);
    // A DST spring-forward can skip local midnight; walk forward to the first
    // hour that exists.
    for _ in 0..4 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                return dt.with_timezone(&Utc);
            }
            LocalResult::None => candidate += Duration::hours(1),
        }
    }
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::{Los_Angeles, New_York};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
    }

    fn event_at(league: League, id: &str, start: DateTime<Utc>) -> Event {
        Event {
            external_id: id.to_string(),
            league,
            status: GameStatus::Scheduled,
            start_time: start,
            raw_start_time: None,
            venue: None,
            venue_timezone: None,
            home_team: "Home".to_string(),
            away_team: "Away".to_string(),
            home_score: 0,
            away_score: 0,
            link: None,
        }
    }

    #[test]
    fn status_normalization_is_total() {
        for input in ["", "garbage", "POSTPONED", "??", "Suspended: Rain"] {
            assert_eq!(status::normalize_nhl(input), GameStatus::Scheduled);
            assert_eq!(status::normalize_nba(input), GameStatus::Scheduled);
            assert_eq!(status::normalize_mlb(input), GameStatus::Scheduled);
            assert_eq!(status::normalize_espn(input), GameStatus::Scheduled);
        }
    }

    #[test]
    fn mlb_status_examples() {
        assert_eq!(status::normalize_mlb("In Progress"), GameStatus::Live);
        assert_eq!(status::normalize_mlb("Final"), GameStatus::Final);
        assert_eq!(status::normalize_mlb("Final: Tied"), GameStatus::Final);
        assert_eq!(status::normalize_mlb("Scheduled"), GameStatus::Scheduled);
        assert_eq!(status::normalize_mlb("Pre-Game"), GameStatus::Scheduled);
    }

    #[test]
    fn nba_clock_text_means_live() {
        assert_eq!(status::normalize_nba("Q3 4:12"), GameStatus::Live);
        assert_eq!(status::normalize_nba("4:12 3Q"), GameStatus::Live);
        assert_eq!(status::normalize_nba("OT"), GameStatus::Live);
        assert_eq!(status::normalize_nba("Final/OT"), GameStatus::Final);
        assert_eq!(status::normalize_nba("7:30 pm ET"), GameStatus::Scheduled);
    }

    #[test]
    fn nhl_and_espn_vocabularies() {
        assert_eq!(status::normalize_nhl("FINAL"), GameStatus::Final);
        assert_eq!(status::normalize_nhl("OFF_FINAL"), GameStatus::Final);
        assert_eq!(status::normalize_nhl("LIVE"), GameStatus::Live);
        assert_eq!(status::normalize_nhl("FUT"), GameStatus::Scheduled);
        assert_eq!(status::normalize_espn("STATUS_FINAL"), GameStatus::Final);
        assert_eq!(status::normalize_espn("STATUS_IN_PROGRESS"), GameStatus::Live);
        assert_eq!(status::normalize_espn("STATUS_SCHEDULED"), GameStatus::Scheduled);
    }

    #[test]
    fn parse_instant_is_lenient_about_precision() {
        assert_eq!(
            time::parse_instant(Some("2024-01-15T19:30:00Z")),
            Some(utc(2024, 1, 15, 19, 30))
        );
        assert_eq!(
            time::parse_instant(Some("2024-01-15T19:30Z")),
            Some(utc(2024, 1, 15, 19, 30))
        );
        assert_eq!(
            time::parse_instant(Some("2024-01-15T19:30:00")),
            Some(utc(2024, 1, 15, 19, 30))
        );
        assert_eq!(
            time::parse_instant(Some("2024-01-15T14:30:00-05:00")),
            Some(utc(2024, 1, 15, 19, 30))
        );
    }

    #[test]
    fn parse_instant_signals_absence_explicitly() {
        assert_eq!(time::parse_instant(None), None);
        assert_eq!(time::parse_instant(Some("")), None);
        assert_eq!(time::parse_instant(Some("not a timestamp")), None);
    }

    #[test]
    fn eastern_reinterpretation_in_winter() {
        // 7:30 PM Eastern on Jan 15 is 00:30 UTC the next day (EST, UTC-5).
        assert_eq!(
            time::eastern_to_utc("2024-01-15T19:30:00Z"),
            Some(utc(2024, 1, 16, 0, 30))
        );
    }

    #[test]
    fn eastern_reinterpretation_in_summer() {
        // EDT is UTC-4.
        assert_eq!(
            time::eastern_to_utc("2024-07-15T19:30:00Z"),
            Some(utc(2024, 7, 15, 23, 30))
        );
    }

    #[test]
    fn eastern_reinterpretation_ignores_numeric_offsets_too() {
        // Whatever the marker claims, the wall clock is Eastern.
        assert_eq!(
            time::eastern_to_utc("2024-01-15T19:30:00+00:00"),
            Some(utc(2024, 1, 16, 0, 30))
        );
        assert_eq!(
            time::eastern_to_utc("2024-01-15T19:30:00-05:00"),
            Some(utc(2024, 1, 16, 0, 30))
        );
    }

    #[test]
    fn day_window_is_half_open_local_midnight_to_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let window = DayWindow::for_date(date, New_York);
        assert_eq!(window.start, utc(2024, 1, 15, 5, 0));
        assert_eq!(window.end, utc(2024, 1, 16, 5, 0));
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));
    }

    #[test]
    fn late_pacific_game_is_tomorrow_in_eastern() {
        // 11:30 PM Pacific on Jan 15 = 07:30 UTC Jan 16.
        let start = utc(2024, 1, 16, 7, 30);
        let jan15 = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let jan16 = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();

        assert!(DayWindow::for_date(jan15, Los_Angeles).contains(start));
        assert!(!DayWindow::for_date(jan16, Los_Angeles).contains(start));
        assert!(DayWindow::for_date(jan16, New_York).contains(start));
        assert!(!DayWindow::for_date(jan15, New_York).contains(start));
    }

    #[test]
    fn window_membership_is_exclusive_across_dates() {
        let tz = New_York;
        let start = utc(2024, 3, 10, 16, 0);
        let mut matches = 0;
        for day in 8..=12 {
            let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
            if DayWindow::for_date(date, tz).contains(start) {
                matches += 1;
            }
        }
        assert_eq!(matches, 1);
    }

    #[test]
    fn merged_events_sort_ascending_by_iso_instant() {
        let mut events = vec![
            event_at(League::Nfl, "n1", utc(2024, 1, 15, 23, 0)),
            event_at(League::Nhl, "h1", utc(2024, 1, 15, 18, 0)),
            event_at(League::Mlb, "m1", utc(2024, 1, 16, 2, 30)),
            event_at(League::Nba, "b1", utc(2024, 1, 15, 18, 0)),
        ];
        sort_events(&mut events);
        let ids: Vec<_> = events.iter().map(|e| e.external_id.as_str()).collect();
        assert_eq!(ids[3], "m1");
        assert_eq!(&ids[..2], &["h1", "b1"] as &[&str]);
        let isos: Vec<_> = events.iter().map(Event::start_iso).collect();
        let mut sorted = isos.clone();
        sorted.sort();
        assert_eq!(isos, sorted);
    }

    #[test]
    fn league_and_status_round_trip_their_wire_forms() {
        assert_eq!("NHL".parse::<League>().unwrap(), League::Nhl);
        assert_eq!("nfl".parse::<League>().unwrap(), League::Nfl);
        assert!("XFL".parse::<League>().is_err());
        assert_eq!("final".parse::<GameStatus>().unwrap(), GameStatus::Final);
        assert_eq!("bogus".parse::<GameStatus>().unwrap(), GameStatus::Scheduled);
    }
}
