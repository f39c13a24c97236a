//! AnalfaBet — Scoring Engine
//!
//! Turns a user's predicted score and a match's actual score into points.
//! Pure functions only: no I/O, no shared state, safe to call from any thread.
//!
//! Rules (canonical 3/1):
//!   exact score            → `exact_points`, `is_exact = true`
//!   same outcome category  → `correct_outcome_points`
//!   anything else          → 0
//!
//! Unknown or non-numeric scores never raise; they score 0 with
//! `Verdict::Malformed` so the caller can tell them apart from a plain miss.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

// ── Match status ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub const ALL: [MatchStatus; 5] = [
        MatchStatus::Scheduled,
        MatchStatus::Live,
        MatchStatus::Finished,
        MatchStatus::Postponed,
        MatchStatus::Cancelled,
    ];

    /// Storage / wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, MatchStatus::Finished)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown match status {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for MatchStatus {
    type Err = UnknownStatus;

    /// Exact token match only ("finished", not "FINISHED").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatchStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRules {
    pub exact_points: u32,
    pub correct_outcome_points: u32,
    /// Permissive variant: also score matches that are still live.
    pub score_live: bool,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            exact_points: 3,
            correct_outcome_points: 1,
            score_live: false,
        }
    }
}

impl ScoringRules {
    /// 5/2 point table used by older seasons of the league.
    pub fn legacy() -> Self {
        Self {
            exact_points: 5,
            correct_outcome_points: 2,
            ..Self::default()
        }
    }

    pub fn is_scorable(&self, status: MatchStatus) -> bool {
        match status {
            MatchStatus::Finished => true,
            MatchStatus::Live => self.score_live,
            _ => false,
        }
    }
}

// ── Inputs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub home_score: i64,
    pub away_score: i64,
}

impl Prediction {
    pub fn new(home_score: i64, away_score: i64) -> Self {
        Self { home_score, away_score }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub status: MatchStatus,
}

impl MatchResult {
    pub fn finished(home_score: i64, away_score: i64) -> Self {
        Self {
            home_score: Some(home_score),
            away_score: Some(away_score),
            status: MatchStatus::Finished,
        }
    }

    pub fn pending(status: MatchStatus) -> Self {
        Self {
            home_score: None,
            away_score: None,
            status,
        }
    }
}

/// Loosely typed score as it may come out of storage or an upstream feed.
#[derive(Debug, Clone, PartialEq)]
pub enum RawScore {
    Int(i64),
    Float(f64),
    Text(String),
    Missing,
}

impl RawScore {
    /// `parseInt`-style coercion: leading integer of a trimmed string,
    /// truncated finite floats, `None` for anything else.
    pub fn coerce(&self) -> Option<i64> {
        match self {
            RawScore::Int(v) => Some(*v),
            RawScore::Float(f) => {
                if f.is_finite() && f.abs() < i64::MAX as f64 {
                    Some(f.trunc() as i64)
                } else {
                    None
                }
            }
            RawScore::Text(s) => leading_integer(s),
            RawScore::Missing => None,
        }
    }
}

fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let digits: &str = {
        let end = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        &rest[..end]
    };
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok().map(|v| v * sign)
}

impl From<i64> for RawScore {
    fn from(v: i64) -> Self {
        RawScore::Int(v)
    }
}

impl From<Option<i64>> for RawScore {
    fn from(v: Option<i64>) -> Self {
        v.map_or(RawScore::Missing, RawScore::Int)
    }
}

impl From<&str> for RawScore {
    fn from(v: &str) -> Self {
        RawScore::Text(v.to_string())
    }
}

impl From<&serde_json::Value> for RawScore {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => RawScore::Int(i),
                None => n.as_f64().map_or(RawScore::Missing, RawScore::Float),
            },
            serde_json::Value::String(s) => RawScore::Text(s.clone()),
            _ => RawScore::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub home_score: RawScore,
    pub away_score: RawScore,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMatchResult {
    pub home_score: RawScore,
    pub away_score: RawScore,
    pub status: MatchStatus,
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Home win / draw / away win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl Outcome {
    pub fn of(home: i64, away: i64) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Outcome::HomeWin,
            std::cmp::Ordering::Less => Outcome::AwayWin,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Exact,
    CorrectOutcome,
    Miss,
    /// Result not authoritative yet (scheduled, postponed, cancelled...).
    NotScorable,
    /// A score was unknown or not numeric.
    Malformed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Exact => "exact",
            Verdict::CorrectOutcome => "correct_outcome",
            Verdict::Miss => "miss",
            Verdict::NotScorable => "not_scorable",
            Verdict::Malformed => "malformed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub points: u32,
    pub is_exact: bool,
    pub verdict: Verdict,
}

impl ScoreOutcome {
    fn zero(verdict: Verdict) -> Self {
        Self {
            points: 0,
            is_exact: false,
            verdict,
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub fn score(prediction: &Prediction, result: &MatchResult, rules: &ScoringRules) -> ScoreOutcome {
    if !rules.is_scorable(result.status) {
        return ScoreOutcome::zero(Verdict::NotScorable);
    }

    let (Some(actual_home), Some(actual_away)) = (result.home_score, result.away_score) else {
        warn!(
            status = %result.status,
            "match is {} but its score is unknown, awarding no points",
            result.status
        );
        return ScoreOutcome::zero(Verdict::Malformed);
    };

    compare(
        prediction.home_score,
        prediction.away_score,
        actual_home,
        actual_away,
        rules,
    )
}

/// Same as [`score`] but for loosely typed stored values.
pub fn score_raw(
    prediction: &RawPrediction,
    result: &RawMatchResult,
    rules: &ScoringRules,
) -> ScoreOutcome {
    if !rules.is_scorable(result.status) {
        return ScoreOutcome::zero(Verdict::NotScorable);
    }

    let coerced = (
        prediction.home_score.coerce(),
        prediction.away_score.coerce(),
        result.home_score.coerce(),
        result.away_score.coerce(),
    );

    match coerced {
        (Some(ph), Some(pa), Some(ah), Some(aa)) => compare(ph, pa, ah, aa, rules),
        _ => {
            warn!(
                predicted = ?(&prediction.home_score, &prediction.away_score),
                actual = ?(&result.home_score, &result.away_score),
                "non-numeric score, awarding no points"
            );
            ScoreOutcome::zero(Verdict::Malformed)
        }
    }
}

fn compare(
    predicted_home: i64,
    predicted_away: i64,
    actual_home: i64,
    actual_away: i64,
    rules: &ScoringRules,
) -> ScoreOutcome {
    if predicted_home == actual_home && predicted_away == actual_away {
        return ScoreOutcome {
            points: rules.exact_points,
            is_exact: true,
            verdict: Verdict::Exact,
        };
    }

    if Outcome::of(predicted_home, predicted_away) == Outcome::of(actual_home, actual_away) {
        return ScoreOutcome {
            points: rules.correct_outcome_points,
            is_exact: false,
            verdict: Verdict::CorrectOutcome,
        };
    }

    ScoreOutcome::zero(Verdict::Miss)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ScoringRules {
        ScoringRules::default()
    }

    #[test]
    fn exact_score_gets_exact_points() {
        let out = score(&Prediction::new(2, 1), &MatchResult::finished(2, 1), &rules());
        assert_eq!(out.points, 3);
        assert!(out.is_exact);
        assert_eq!(out.verdict, Verdict::Exact);
    }

    #[test]
    fn exact_draw_is_exact_not_outcome() {
        let out = score(&Prediction::new(0, 0), &MatchResult::finished(0, 0), &rules());
        assert_eq!(out.verdict, Verdict::Exact);
        assert_eq!(out.points, 3);
    }

    #[test]
    fn correct_outcome_gets_outcome_points() {
        let home = score(&Prediction::new(3, 0), &MatchResult::finished(1, 0), &rules());
        assert_eq!((home.points, home.is_exact), (1, false));

        let draw = score(&Prediction::new(1, 1), &MatchResult::finished(2, 2), &rules());
        assert_eq!(draw.verdict, Verdict::CorrectOutcome);

        let away = score(&Prediction::new(0, 2), &MatchResult::finished(1, 4), &rules());
        assert_eq!(away.points, 1);
    }

    #[test]
    fn wrong_outcome_scores_zero() {
        let out = score(&Prediction::new(2, 0), &MatchResult::finished(0, 1), &rules());
        assert_eq!(out, ScoreOutcome { points: 0, is_exact: false, verdict: Verdict::Miss });

        let out = score(&Prediction::new(1, 1), &MatchResult::finished(2, 1), &rules());
        assert_eq!(out.verdict, Verdict::Miss);
    }

    #[test]
    fn unfinished_matches_are_not_scored() {
        for status in [
            MatchStatus::Scheduled,
            MatchStatus::Live,
            MatchStatus::Postponed,
            MatchStatus::Cancelled,
        ] {
            let result = MatchResult {
                home_score: Some(2),
                away_score: Some(1),
                status,
            };
            let out = score(&Prediction::new(2, 1), &result, &rules());
            assert_eq!(out.points, 0, "{status}");
            assert!(!out.is_exact);
            assert_eq!(out.verdict, Verdict::NotScorable);
        }
    }

    #[test]
    fn live_matches_scored_when_permissive() {
        let permissive = ScoringRules { score_live: true, ..ScoringRules::default() };
        let live = MatchResult {
            home_score: Some(1),
            away_score: Some(0),
            status: MatchStatus::Live,
        };
        assert_eq!(score(&Prediction::new(1, 0), &live, &permissive).points, 3);
        let postponed = MatchResult { status: MatchStatus::Postponed, ..live };
        assert_eq!(score(&Prediction::new(1, 0), &postponed, &permissive).points, 0);
    }

    #[test]
    fn finished_without_score_is_malformed() {
        let result = MatchResult::pending(MatchStatus::Finished);
        let out = score(&Prediction::new(1, 0), &result, &rules());
        assert_eq!(out.points, 0);
        assert_eq!(out.verdict, Verdict::Malformed);
    }

    #[test]
    fn legacy_table_uses_five_and_two() {
        let legacy = ScoringRules::legacy();
        assert_eq!(score(&Prediction::new(2, 1), &MatchResult::finished(2, 1), &legacy).points, 5);
        assert_eq!(score(&Prediction::new(3, 1), &MatchResult::finished(2, 1), &legacy).points, 2);
    }

    #[test]
    fn scoring_is_idempotent() {
        let p = Prediction::new(1, 2);
        let r = MatchResult::finished(0, 3);
        assert_eq!(score(&p, &r, &rules()), score(&p, &r, &rules()));
    }

    #[test]
    fn raw_scores_coerce_like_parse_int() {
        assert_eq!(RawScore::from("2").coerce(), Some(2));
        assert_eq!(RawScore::from("  3 goals").coerce(), Some(3));
        assert_eq!(RawScore::from("-1").coerce(), Some(-1));
        assert_eq!(RawScore::Float(2.9).coerce(), Some(2));
        assert_eq!(RawScore::from("abc").coerce(), None);
        assert_eq!(RawScore::from("").coerce(), None);
        assert_eq!(RawScore::Float(f64::NAN).coerce(), None);
        assert_eq!(RawScore::Missing.coerce(), None);
        assert_eq!(RawScore::from(&serde_json::json!(4)).coerce(), Some(4));
        assert_eq!(RawScore::from(&serde_json::json!(null)).coerce(), None);
    }

    #[test]
    fn raw_non_numeric_is_malformed_not_error() {
        let prediction = RawPrediction {
            home_score: RawScore::from("x"),
            away_score: RawScore::Int(1),
        };
        let result = RawMatchResult {
            home_score: RawScore::Int(1),
            away_score: RawScore::Int(1),
            status: MatchStatus::Finished,
        };
        let out = score_raw(&prediction, &result, &rules());
        assert_eq!(out.points, 0);
        assert_eq!(out.verdict, Verdict::Malformed);
    }

    #[test]
    fn raw_text_scores_still_score() {
        let prediction = RawPrediction {
            home_score: RawScore::from("2"),
            away_score: RawScore::from("2"),
        };
        let result = RawMatchResult {
            home_score: RawScore::Int(2),
            away_score: RawScore::Text("2".into()),
            status: MatchStatus::Finished,
        };
        assert!(score_raw(&prediction, &result, &rules()).is_exact);
    }

    #[test]
    fn raw_unfinished_short_circuits_before_coercion() {
        let prediction = RawPrediction {
            home_score: RawScore::Missing,
            away_score: RawScore::Missing,
        };
        let result = RawMatchResult {
            home_score: RawScore::Missing,
            away_score: RawScore::Missing,
            status: MatchStatus::Scheduled,
        };
        assert_eq!(score_raw(&prediction, &result, &rules()).verdict, Verdict::NotScorable);
    }

    #[test]
    fn status_tokens_are_exact() {
        assert_eq!("finished".parse::<MatchStatus>(), Ok(MatchStatus::Finished));
        assert!("FINISHED".parse::<MatchStatus>().is_err());
        assert!("done".parse::<MatchStatus>().is_err());
        for st in MatchStatus::ALL {
            assert_eq!(st.as_str().parse::<MatchStatus>(), Ok(st));
        }
    }
}
