//! JSON routes served by `analfabet-api`.
//!
//! Routing is synchronous over a `&mut Store` so the server can run it on the
//! blocking pool and tests can drive it against an in-memory database.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use logger::EventLogger;
use round_selector::determine_default_round_at;
use scoring_engine::{MatchStatus, ScoringRules};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::error::ApiError;
use crate::store::{winners, BetPlacement, Store, UserCreation};
use crate::sync::log_rescore;

/// Rounds in a Série A season.
pub const MAX_ROUND: u32 = 38;
/// Upper bound accepted for a manually entered goal count.
pub const MAX_MANUAL_GOALS: i64 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: String,
}

impl HttpRequest {
    /// Parses a complete request (head plus body). `None` on a broken request line.
    pub fn parse(raw: &str) -> Option<Self> {
        let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
        let mut parts = head.lines().next()?.split_whitespace();
        let method = parts.next()?.to_ascii_uppercase();
        let target = parts.next()?;

        let (path, qs) = target.split_once('?').unwrap_or((target, ""));
        let path = match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        };
        let query = qs
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|p| {
                let (k, v) = p.split_once('=').unwrap_or((p, ""));
                (percent_decode(k), percent_decode(v))
            })
            .collect();

        Some(Self {
            method,
            path: path.to_string(),
            query,
            body: body.to_string(),
        })
    }
}

/// Form-style query decoding: `%XX` escapes and `+` as space. Malformed
/// escapes or non-UTF-8 results leave the component as sent.
fn percent_decode(component: &str) -> String {
    let bytes = component.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).and_then(|h| std::str::from_utf8(h).ok());
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    }
                    None => return component.to_string(),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| component.to_string())
}

/// `Content-Length` of a request head, 0 when absent or unreadable.
pub fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: impl Serialize) -> Result<Self, ApiError> {
        Self::with_status(200, body)
    }

    fn created(body: impl Serialize) -> Result<Self, ApiError> {
        Self::with_status(201, body)
    }

    fn with_status(status: u16, body: impl Serialize) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body).map_err(anyhow::Error::from)?;
        Ok(Self { status, body })
    }

    pub fn render(&self) -> String {
        let body = serde_json::to_string(&self.body).unwrap_or_else(|_| "{}".to_string());
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            reason_phrase(self.status),
            body.len(),
            body
        )
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        _ => "Internal Server Error",
    }
}

/// Per-request inputs that do not live in the database.
#[derive(Clone)]
pub struct RouteContext {
    pub now: DateTime<Utc>,
    pub rules: ScoringRules,
    pub logger: Option<Arc<EventLogger>>,
}

/// Routes a request and turns any error into its JSON response.
pub fn respond(store: &mut Store, req: &HttpRequest, ctx: &RouteContext) -> ApiResponse {
    match route(store, req, ctx) {
        Ok(resp) => resp,
        Err(e) => {
            match &e {
                ApiError::Internal(inner) => error!("{} {} failed: {inner:#}", req.method, req.path),
                other => debug!("{} {} -> {}", req.method, req.path, other),
            }
            ApiResponse {
                status: e.status_code(),
                body: e.body(),
            }
        }
    }
}

pub fn route(store: &mut Store, req: &HttpRequest, ctx: &RouteContext) -> Result<ApiResponse, ApiError> {
    let segments: Vec<&str> = req.path.trim_start_matches('/').split('/').collect();
    let method = req.method.as_str();

    match segments.as_slice() {
        ["health"] => expect_method(method, "GET").and_then(|_| ApiResponse::ok(json!({ "status": "ok" }))),
        ["matches"] => {
            expect_method(method, "GET")?;
            list_matches(store, req, ctx)
        }
        ["rankings"] => {
            expect_method(method, "GET")?;
            rankings(store, req)
        }
        ["bets"] => match method {
            "GET" => user_bets(store, req),
            "POST" => place_bet(store, req, ctx),
            _ => Err(ApiError::MethodNotAllowed),
        },
        ["league-bets"] => {
            expect_method(method, "GET")?;
            league_bets(store, req, ctx)
        }
        ["users"] => {
            expect_method(method, "POST")?;
            create_user(store, req, ctx)
        }
        ["matches", id, "score"] => {
            expect_method(method, "POST")?;
            let id: i64 = id
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("Invalid match id {id:?}")))?;
            update_score(store, id, req, ctx)
        }
        _ => Err(ApiError::NotFound(format!("No route for {}", req.path))),
    }
}

fn expect_method(actual: &str, allowed: &str) -> Result<(), ApiError> {
    if actual == allowed {
        Ok(())
    } else {
        Err(ApiError::MethodNotAllowed)
    }
}

// ── Parameters ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundParam {
    Default,
    All,
    Round(u32),
}

fn round_param(req: &HttpRequest) -> Result<RoundParam, ApiError> {
    let Some(raw) = req.query.get("round") else {
        return Ok(RoundParam::Default);
    };
    if raw.eq_ignore_ascii_case("all") {
        return Ok(RoundParam::All);
    }
    match raw.parse::<u32>() {
        Ok(n) if (1..=MAX_ROUND).contains(&n) => Ok(RoundParam::Round(n)),
        _ => Err(ApiError::BadRequest(format!(
            "round must be between 1 and {MAX_ROUND} or \"all\", got {raw:?}"
        ))),
    }
}

fn default_round(store: &Store, now: DateTime<Utc>) -> Result<u32, ApiError> {
    Ok(determine_default_round_at(&store.match_summaries()?, now))
}

fn parse_body(req: &HttpRequest) -> Result<Value, ApiError> {
    serde_json::from_str(&req.body).map_err(|e| ApiError::BadRequest(format!("Malformed JSON body: {e}")))
}

fn int_field(body: &Value, key: &str) -> Result<i64, ApiError> {
    body.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::BadRequest(format!("{key} must be an integer")))
}

fn goals_field(body: &Value, key: &str, max: Option<i64>) -> Result<i64, ApiError> {
    let v = int_field(body, key)?;
    if v < 0 {
        return Err(ApiError::BadRequest(format!("{key} must not be negative")));
    }
    if let Some(max) = max {
        if v > max {
            return Err(ApiError::BadRequest(format!("{key} must be at most {max}")));
        }
    }
    Ok(v)
}

fn str_field<'a>(body: &'a Value, key: &str) -> Result<&'a str, ApiError> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{key} is required")))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

fn list_matches(store: &Store, req: &HttpRequest, ctx: &RouteContext) -> Result<ApiResponse, ApiError> {
    let determined_round = default_round(store, ctx.now)?;
    let (round, matches) = match round_param(req)? {
        RoundParam::Default => (Some(determined_round), store.matches(Some(determined_round))?),
        RoundParam::All => (None, store.matches(None)?),
        RoundParam::Round(n) => (Some(n), store.matches(Some(n))?),
    };
    ApiResponse::ok(json!({
        "round": round,
        "determined_round": determined_round,
        "matches": matches,
    }))
}

fn rankings(store: &Store, req: &HttpRequest) -> Result<ApiResponse, ApiError> {
    let round = match round_param(req)? {
        RoundParam::Round(n) => Some(n),
        RoundParam::Default | RoundParam::All => None,
    };
    let ranking = store.ranking(round)?;
    let winners = winners(&ranking);
    ApiResponse::ok(json!({
        "round": round,
        "ranking": ranking,
        "winners": winners,
    }))
}

fn user_bets(store: &Store, req: &HttpRequest) -> Result<ApiResponse, ApiError> {
    let user_id: i64 = req
        .query
        .get("user_id")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::BadRequest("user_id query parameter is required".to_string()))?;
    if store.user(user_id)?.is_none() {
        return Err(ApiError::NotFound(format!("User {user_id} not found")));
    }
    ApiResponse::ok(json!({ "user_id": user_id, "bets": store.bets_for_user(user_id)? }))
}

fn league_bets(store: &Store, req: &HttpRequest, ctx: &RouteContext) -> Result<ApiResponse, ApiError> {
    let round = match round_param(req)? {
        RoundParam::Default => Some(default_round(store, ctx.now)?),
        RoundParam::All => None,
        RoundParam::Round(n) => Some(n),
    };
    ApiResponse::ok(json!({ "round": round, "bets": store.league_bets(round)? }))
}

fn create_user(store: &mut Store, req: &HttpRequest, ctx: &RouteContext) -> Result<ApiResponse, ApiError> {
    let body = parse_body(req)?;
    let name = str_field(&body, "name")?;
    let email = str_field(&body, "email")?.to_ascii_lowercase();
    if !email.contains('@') {
        return Err(ApiError::BadRequest("email is not valid".to_string()));
    }

    match store.create_user(name, &email, ctx.now)? {
        UserCreation::Created(user) => {
            info!(user_id = user.id, "user registered");
            ApiResponse::created(user)
        }
        UserCreation::EmailTaken => Err(ApiError::Conflict(format!("Email {email} is already registered"))),
    }
}

fn place_bet(store: &mut Store, req: &HttpRequest, ctx: &RouteContext) -> Result<ApiResponse, ApiError> {
    let body = parse_body(req)?;
    let user_id = int_field(&body, "user_id")?;
    let match_id = int_field(&body, "match_id")?;
    let home = goals_field(&body, "home_score", None)?;
    let away = goals_field(&body, "away_score", None)?;

    match store.place_bet(user_id, match_id, home, away, ctx.now)? {
        BetPlacement::Saved(bet) => ApiResponse::created(bet),
        BetPlacement::UserNotFound => Err(ApiError::NotFound(format!("User {user_id} not found"))),
        BetPlacement::MatchNotFound => Err(ApiError::NotFound(format!("Match {match_id} not found"))),
        BetPlacement::BettingClosed(status) => Err(ApiError::Forbidden(format!(
            "Betting is closed for match {match_id} ({status})"
        ))),
        BetPlacement::KickoffPassed => Err(ApiError::Forbidden(format!(
            "Match {match_id} has already kicked off"
        ))),
    }
}

fn update_score(store: &mut Store, id: i64, req: &HttpRequest, ctx: &RouteContext) -> Result<ApiResponse, ApiError> {
    let body = parse_body(req)?;
    let home = goals_field(&body, "home_score", Some(MAX_MANUAL_GOALS))?;
    let away = goals_field(&body, "away_score", Some(MAX_MANUAL_GOALS))?;
    let status = str_field(&body, "status")?
        .parse::<MatchStatus>()
        .ok()
        .filter(|s| *s != MatchStatus::Cancelled)
        .ok_or_else(|| ApiError::BadRequest("status must be scheduled, live, finished or postponed".to_string()))?;

    let Some(updated) = store.update_match_result(id, home, away, status, ctx.now)? else {
        return Err(ApiError::NotFound(format!("Match {id} not found")));
    };
    info!(match_id = id, home, away, status = %status, "manual result update");

    let summary = store.rescore_match(id, &ctx.rules)?;
    if let (Some(logger), Some(summary)) = (ctx.logger.as_deref(), summary.as_ref()) {
        log_rescore(logger, summary, "manual");
    }

    ApiResponse::ok(json!({ "match": updated, "rescore": summary }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_query_and_body() {
        let raw = "POST /bets/?x=1&round=all HTTP/1.1\r\nHost: a\r\nContent-Length: 7\r\n\r\n{\"a\":1}";
        let req = HttpRequest::parse(raw).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/bets");
        assert_eq!(req.query.get("round").map(String::as_str), Some("all"));
        assert_eq!(req.body, "{\"a\":1}");
        assert_eq!(content_length(raw.split("\r\n\r\n").next().unwrap()), 7);

        assert!(HttpRequest::parse("").is_none());
        assert_eq!(HttpRequest::parse("GET / HTTP/1.1\r\n\r\n").unwrap().path, "/");
    }

    #[test]
    fn query_components_are_percent_decoded() {
        let req = HttpRequest::parse("GET /matches?round=%33&team=S%C3%A3o+Paulo HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.query.get("round").map(String::as_str), Some("3"));
        assert_eq!(req.query.get("team").map(String::as_str), Some("São Paulo"));

        let req = HttpRequest::parse("GET /matches?round=%3 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.query.get("round").map(String::as_str), Some("%3"));
    }

    #[test]
    fn renders_status_line_and_length() {
        let resp = ApiResponse {
            status: 409,
            body: json!({ "error": "taken" }),
        };
        let out = resp.render();
        assert!(out.starts_with("HTTP/1.1 409 Conflict\r\n"));
        assert!(out.contains("Content-Length: 17\r\n"));
        assert!(out.ends_with("{\"error\":\"taken\"}"));
    }

    #[test]
    fn round_param_bounds() {
        let with = |v: &str| HttpRequest {
            method: "GET".into(),
            path: "/matches".into(),
            query: HashMap::from([("round".to_string(), v.to_string())]),
            body: String::new(),
        };
        assert_eq!(round_param(&with("38")).unwrap(), RoundParam::Round(38));
        assert_eq!(round_param(&with("ALL")).unwrap(), RoundParam::All);
        assert!(round_param(&with("0")).is_err());
        assert!(round_param(&with("39")).is_err());
        assert!(round_param(&with("-1")).is_err());
    }
}
