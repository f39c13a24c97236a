use std::fs;
use std::path::PathBuf;

use analfabet::api::{respond, ApiResponse, HttpRequest, RouteContext};
use analfabet::store::Store;
use analfabet::sync::apply_upstream;
use chrono::{DateTime, TimeZone, Utc};
use football_api::{parse_matches_json, UpstreamMatch};
use scoring_engine::{MatchStatus, ScoringRules};
use serde_json::{json, Value};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn ctx(now: DateTime<Utc>) -> RouteContext {
    RouteContext {
        now,
        rules: ScoringRules::default(),
        logger: None,
    }
}

fn call(store: &mut Store, now: DateTime<Utc>, method: &str, target: &str, body: Value) -> ApiResponse {
    let body = if body.is_null() { String::new() } else { body.to_string() };
    let raw = format!("{method} {target} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}", body.len());
    let req = HttpRequest::parse(&raw).expect("request should parse");
    respond(store, &req, &ctx(now))
}

fn register(store: &mut Store, now: DateTime<Utc>, name: &str) -> i64 {
    let resp = call(store, now, "POST", "/users", json!({ "name": name, "email": format!("{name}@example.com") }));
    assert_eq!(resp.status, 201, "{:?}", resp.body);
    resp.body["id"].as_i64().expect("user id")
}

fn bet(store: &mut Store, now: DateTime<Utc>, user_id: i64, match_id: i64, home: i64, away: i64) -> ApiResponse {
    call(
        store,
        now,
        "POST",
        "/bets",
        json!({ "user_id": user_id, "match_id": match_id, "home_score": home, "away_score": away }),
    )
}

fn names(list: &Value) -> Vec<&str> {
    list.as_array()
        .expect("array")
        .iter()
        .map(|r| r["name"].as_str().expect("name"))
        .collect()
}

/// The fixture as it looked before the round kicked off.
fn before_kickoff(matches: &[UpstreamMatch]) -> Vec<UpstreamMatch> {
    matches
        .iter()
        .cloned()
        .map(|m| UpstreamMatch {
            status: MatchStatus::Scheduled,
            upstream_status: "TIMED".to_string(),
            home_score: None,
            away_score: None,
            ..m
        })
        .collect()
}

#[test]
fn fixture_normalizes_teams_statuses_and_rounds() {
    let matches = parse_matches_json(&read_fixture("bsa_round_16.json")).expect("fixture should parse");
    assert_eq!(matches.len(), 5);

    let vasco = matches.iter().find(|m| m.id == 537153).expect("Bahia x Vasco");
    assert_eq!(vasco.status, MatchStatus::Live);
    assert_eq!(vasco.away_team, "Vasco");

    let mineiro = matches.iter().find(|m| m.id == 537152).expect("Mineiro x São Paulo");
    assert_eq!(mineiro.home_team, "Atlético-MG");
    assert_eq!((mineiro.home_score, mineiro.away_score), (Some(1), Some(1)));

    assert_eq!(matches.iter().filter(|m| m.round == 16).count(), 4);
    assert!(matches.iter().all(|m| m.season == "2025"));
}

#[test]
fn round_sixteen_from_bets_to_winner() {
    let mut store = Store::open_in_memory().expect("in-memory db");
    let rules = ScoringRules::default();
    let upstream = parse_matches_json(&read_fixture("bsa_round_16.json")).expect("fixture should parse");

    let early = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
    for m in before_kickoff(&upstream) {
        apply_upstream(&mut store, &m, &rules, early).expect("seed match");
    }

    let ana = register(&mut store, early, "ana");
    let bia = register(&mut store, early, "bia");
    let caio = register(&mut store, early, "caio");

    for (user, match_id, home, away) in [
        (ana, 537151, 2, 0),
        (ana, 537152, 0, 0),
        (ana, 537154, 1, 0),
        (bia, 537151, 1, 0),
        (bia, 537152, 1, 1),
        (bia, 537154, 0, 0),
        (caio, 537151, 0, 1),
    ] {
        let resp = bet(&mut store, early, user, match_id, home, away);
        assert_eq!(resp.status, 201, "{:?}", resp.body);
    }

    // Results arrive from the sync job.
    let now = Utc.with_ymd_and_hms(2025, 7, 13, 22, 0, 0).unwrap();
    let mut rescored = 0;
    for m in &upstream {
        let applied = apply_upstream(&mut store, m, &rules, now).expect("apply result");
        rescored += applied.rescore.map_or(0, |s| s.bets);
    }
    // The late kickoff is unchanged upstream, so only two matches rescore.
    assert_eq!(rescored, 5);

    let matches = call(&mut store, now, "GET", "/matches", Value::Null);
    assert_eq!(matches.status, 200);
    assert_eq!(matches.body["determined_round"], 16);
    assert_eq!(matches.body["matches"].as_array().unwrap().len(), 4);
    assert_eq!(matches.body["matches"][0]["home_team"], "Palmeiras");

    let closed = bet(&mut store, now, caio, 537153, 0, 1);
    assert_eq!(closed.status, 403);

    let ranking = call(&mut store, now, "GET", "/rankings", Value::Null);
    assert_eq!(names(&ranking.body["ranking"]), ["ana", "bia", "caio"]);
    assert_eq!(ranking.body["ranking"][0]["total_points"], 4);
    assert_eq!(names(&ranking.body["winners"]), ["ana", "bia"]);

    // Manual result for the late kickoff settles the tie.
    let late = Utc.with_ymd_and_hms(2025, 7, 14, 2, 0, 0).unwrap();
    let score = call(
        &mut store,
        late,
        "POST",
        "/matches/537154/score",
        json!({ "home_score": 2, "away_score": 1, "status": "finished" }),
    );
    assert_eq!(score.status, 200, "{:?}", score.body);
    assert_eq!(score.body["rescore"]["bets"], 2);

    let ranking = call(&mut store, late, "GET", "/rankings?round=16", Value::Null);
    assert_eq!(ranking.body["round"], 16);
    assert_eq!(names(&ranking.body["winners"]), ["ana"]);
    assert_eq!(ranking.body["ranking"][0]["total_points"], 5);

    let next_round = call(&mut store, late, "GET", "/rankings?round=17", Value::Null);
    assert_eq!(next_round.body["winners"], json!([]));

    let league = call(&mut store, late, "GET", "/league-bets?round=16", Value::Null);
    assert_eq!(league.body["bets"].as_array().unwrap().len(), 7);

    let mine = call(&mut store, late, "GET", &format!("/bets?user_id={ana}"), Value::Null);
    let mine = mine.body["bets"].as_array().unwrap().clone();
    assert_eq!(mine.len(), 3);
    assert_eq!(mine[0]["match"]["id"], 537151);
    assert_eq!(mine[0]["verdict"], "exact");
}
