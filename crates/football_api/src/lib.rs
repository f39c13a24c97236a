/// AnalfaBet — football-data.org client
///
/// Pulls fixtures and results for one competition (default BSA, Brasileirão
/// Série A) from the football-data.org v4 API.
///   - `GET /competitions/{code}/matches[?season=YYYY]` — whole catalog
///   - `GET /matches/{id}`                             — single match refresh
///
/// Free tier allows 10 requests/minute, so every request waits on a
/// `governor` limiter first.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use logger::{now_iso, ApiStatusEvent, EventLogger};
use scoring_engine::MatchStatus;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_BASE_URL: &str = "https://api.football-data.org/v4";

// ── football-data v4 wire types ──────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct FdMatchList {
    #[serde(default)]
    matches: Vec<FdMatch>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FdMatch {
    id: i64,
    utc_date: String,
    status: String,
    matchday: Option<u32>,
    season: Option<FdSeason>,
    home_team: FdTeam,
    away_team: FdTeam,
    score: Option<FdScore>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FdSeason {
    start_date: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FdTeam {
    name: Option<String>,
    short_name: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FdScore {
    full_time: Option<FdScoreLine>,
}

#[derive(Deserialize, Debug)]
struct FdScoreLine {
    home: Option<i64>,
    away: Option<i64>,
}

// ── Normalized match ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamMatch {
    pub id: i64,
    pub home_team: String,
    pub away_team: String,
    pub match_date: DateTime<Utc>,
    pub status: MatchStatus,
    /// Raw football-data status ("TIMED", "IN_PLAY", ...).
    pub upstream_status: String,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub round: u32,
    pub season: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogOutcome {
    Fetched(Vec<UpstreamMatch>),
    /// 429 — stop making requests this cycle.
    RateLimited,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(UpstreamMatch),
    /// 404 — the fixture no longer exists upstream.
    NotFound,
    /// 429 — stop making requests this cycle.
    RateLimited,
}

/// Maps a football-data status onto the five statuses the app knows.
pub fn map_status(upstream: &str) -> MatchStatus {
    match upstream {
        "SCHEDULED" | "TIMED" => MatchStatus::Scheduled,
        "IN_PLAY" | "PAUSED" | "LIVE" => MatchStatus::Live,
        "FINISHED" | "AWARDED" => MatchStatus::Finished,
        "POSTPONED" | "SUSPENDED" => MatchStatus::Postponed,
        "CANCELLED" => MatchStatus::Cancelled,
        other => {
            debug!("unknown upstream status {other:?}, treating as scheduled");
            MatchStatus::Scheduled
        }
    }
}

/// Display names used across the app for Série A clubs.
const TEAM_ALIASES: &[(&str, &str)] = &[
    ("SE Palmeiras", "Palmeiras"),
    ("Botafogo FR", "Botafogo"),
    ("CR Flamengo", "Flamengo"),
    ("Fluminense FC", "Fluminense"),
    ("Grêmio FBPA", "Grêmio"),
    ("São Paulo FC", "São Paulo"),
    ("CA Mineiro", "Atlético-MG"),
    ("Atlético Mineiro", "Atlético-MG"),
    ("SC Recife", "Sport"),
    ("Sport Recife", "Sport"),
    ("SC Internacional", "Internacional"),
    ("Cruzeiro EC", "Cruzeiro"),
    ("SC Corinthians Paulista", "Corinthians"),
    ("Santos FC", "Santos"),
    ("EC Bahia", "Bahia"),
    ("CR Vasco da Gama", "Vasco"),
    ("Mirassol FC", "Mirassol"),
    ("EC Juventude", "Juventude"),
    ("Ceará SC", "Ceará"),
    ("Fortaleza EC", "Fortaleza"),
    ("RB Bragantino", "Bragantino"),
    ("Red Bull Bragantino", "Bragantino"),
    ("EC Vitória", "Vitória"),
];

/// Upstream mixes composed and decomposed accents ("Grêmio").
fn nfc(name: &str) -> String {
    name.trim().nfc().collect()
}

fn alias_of(name: &str) -> Option<&'static str> {
    TEAM_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}

pub fn canonical_team_name(name: &str) -> String {
    let name = nfc(name);
    alias_of(&name).map(str::to_string).unwrap_or(name)
}

fn team_name(team: &FdTeam) -> String {
    let full = nfc(team.name.as_deref().unwrap_or(""));
    if let Some(canonical) = alias_of(&full) {
        return canonical.to_string();
    }
    match team.short_name.as_deref().map(str::trim) {
        Some(short) if !short.is_empty() => canonical_team_name(short),
        _ if !full.is_empty() => full,
        _ => "?".to_string(),
    }
}

fn season_label(season: Option<&FdSeason>, match_date: DateTime<Utc>) -> String {
    season
        .and_then(|s| s.start_date.as_deref())
        .and_then(|d| d.get(..4))
        .map(str::to_string)
        .unwrap_or_else(|| match_date.format("%Y").to_string())
}

fn normalize(m: FdMatch) -> Option<UpstreamMatch> {
    let Some(round) = m.matchday.filter(|r| *r > 0) else {
        debug!("match {} has no matchday, skipping", m.id);
        return None;
    };
    let match_date = match DateTime::parse_from_rfc3339(&m.utc_date) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            warn!("match {} has bad utcDate {:?}: {}", m.id, m.utc_date, e);
            return None;
        }
    };
    let full_time = m.score.as_ref().and_then(|s| s.full_time.as_ref());

    Some(UpstreamMatch {
        id: m.id,
        home_team: team_name(&m.home_team),
        away_team: team_name(&m.away_team),
        match_date,
        status: map_status(&m.status),
        home_score: full_time.and_then(|ft| ft.home),
        away_score: full_time.and_then(|ft| ft.away),
        round,
        season: season_label(m.season.as_ref(), match_date),
        upstream_status: m.status,
    })
}

pub fn parse_matches_json(raw: &str) -> Result<Vec<UpstreamMatch>> {
    let list: FdMatchList = serde_json::from_str(raw).context("football-data matches JSON")?;
    Ok(list.matches.into_iter().filter_map(normalize).collect())
}

/// Single-match payload; the match may be nested under `"match"`.
pub fn parse_match_json(raw: &str) -> Result<UpstreamMatch> {
    let value: serde_json::Value = serde_json::from_str(raw).context("football-data match JSON")?;
    let inner = value.get("match").cloned().unwrap_or(value);
    let m: FdMatch = serde_json::from_value(inner).context("football-data match shape")?;
    let id = m.id;
    normalize(m).ok_or_else(|| anyhow!("match {id} is missing matchday or date"))
}

// ── Client ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FootballApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub competition: String,
    pub season: Option<u32>,
    pub requests_per_minute: u32,
}

impl Default for FootballApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            competition: "BSA".to_string(),
            season: None,
            requests_per_minute: 10,
        }
    }
}

pub struct FootballApi {
    client: reqwest::Client,
    cfg: FootballApiConfig,
    limiter: DefaultDirectRateLimiter,
    logger: EventLogger,
}

impl FootballApi {
    pub fn new(cfg: FootballApiConfig, log_dir: impl Into<std::path::PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("analfabet-sync/0.1")
            .timeout(Duration::from_secs(15))
            .build()
            .context("build http client")?;

        let per_minute = NonZeroU32::new(cfg.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        if cfg.api_key.is_none() {
            warn!("FOOTBALL_DATA_API_KEY not set, football-data requests will likely be rejected");
        }

        Ok(Self {
            client,
            cfg,
            limiter,
            logger: EventLogger::new(log_dir),
        })
    }

    pub fn competition(&self) -> &str {
        &self.cfg.competition
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url).header("Accept", "application/json");
        if let Some(ref key) = self.cfg.api_key {
            req = req.header("X-Auth-Token", key);
        }
        req
    }

    /// Whole competition catalog for the configured season.
    pub async fn fetch_matches(&self) -> Result<CatalogOutcome> {
        let mut url = format!(
            "{}/competitions/{}/matches",
            self.cfg.base_url.trim_end_matches('/'),
            self.cfg.competition
        );
        if let Some(season) = self.cfg.season {
            url.push_str(&format!("?season={season}"));
        }

        self.limiter.until_ready().await;
        let resp = self.request(&url).send().await.context("football-data request failed")?;
        let status = resp.status();
        let raw = resp.text().await.context("football-data body read failed")?;

        if status.as_u16() == 429 {
            warn!("football-data rate limit hit while fetching the catalog");
            self.log_api_status("competition_matches", false, Some(429), "rate limited", 0);
            return Ok(CatalogOutcome::RateLimited);
        }
        if !status.is_success() {
            self.log_api_status("competition_matches", false, Some(status.as_u16()), &raw, 0);
            return Err(anyhow!(
                "football-data HTTP {status}: {}",
                raw.chars().take(200).collect::<String>()
            ));
        }

        let matches = parse_matches_json(&raw)?;
        info!(
            competition = %self.cfg.competition,
            "fetched {} matches from football-data",
            matches.len()
        );
        self.log_api_status("competition_matches", true, Some(status.as_u16()), "ok", matches.len());
        Ok(CatalogOutcome::Fetched(matches))
    }

    pub async fn fetch_match(&self, id: i64) -> Result<FetchOutcome> {
        let url = format!("{}/matches/{}", self.cfg.base_url.trim_end_matches('/'), id);

        self.limiter.until_ready().await;
        let resp = self.request(&url).send().await.context("football-data request failed")?;
        let status = resp.status();
        let raw = resp.text().await.context("football-data body read failed")?;

        match status.as_u16() {
            404 => {
                warn!("match {id} not found upstream");
                self.log_api_status("match", false, Some(404), &format!("match {id} not found"), 0);
                Ok(FetchOutcome::NotFound)
            }
            429 => {
                warn!("football-data rate limit hit while fetching match {id}");
                self.log_api_status("match", false, Some(429), "rate limited", 0);
                Ok(FetchOutcome::RateLimited)
            }
            _ if !status.is_success() => {
                self.log_api_status("match", false, Some(status.as_u16()), &raw, 0);
                Err(anyhow!(
                    "football-data HTTP {status} for match {id}: {}",
                    raw.chars().take(200).collect::<String>()
                ))
            }
            _ => {
                let m = parse_match_json(&raw)?;
                self.log_api_status("match", true, Some(status.as_u16()), "ok", 1);
                Ok(FetchOutcome::Found(m))
            }
        }
    }

    fn log_api_status(&self, scope: &str, ok: bool, status_code: Option<u16>, msg: &str, items: usize) {
        let event = ApiStatusEvent {
            ts: now_iso(),
            event: "API_STATUS",
            source: "football-data".to_string(),
            scope: scope.to_string(),
            ok,
            status_code,
            message: msg.chars().take(200).collect(),
            items_logged: items,
        };
        if let Err(e) = self.logger.log(&event) {
            warn!("Log write failed: {e}");
        }
    }
}
