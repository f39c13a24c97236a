//! AnalfaBet — Round Selector
//!
//! Picks the round a user sees when they did not ask for one:
//!   1. newest round that has started and is not wrapped up
//!   2. otherwise the soonest upcoming unfinished round
//!   3. otherwise the last known round
//! then moves one round ahead if the next round kicks off tomorrow.
//!
//! All date comparisons are made on UTC calendar dates.

use chrono::{DateTime, NaiveDate, Utc};
use scoring_engine::MatchStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Round returned when there is nothing to choose from.
pub const FALLBACK_ROUND: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub round: u32,
    pub match_date: DateTime<Utc>,
    pub status: MatchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    /// Earliest kickoff among the round's matches.
    pub start_date: DateTime<Utc>,
    /// Vacuously true for a round with no matches.
    pub all_finished: bool,
    pub match_count: usize,
}

impl RoundInfo {
    pub fn new(start_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            all_finished: true,
            match_count: 0,
        }
    }

    pub fn absorb(&mut self, m: &MatchSummary) {
        if m.match_date < self.start_date {
            self.start_date = m.match_date;
        }
        if m.status != MatchStatus::Finished {
            self.all_finished = false;
        }
        self.match_count += 1;
    }

    pub fn start_day(&self) -> NaiveDate {
        self.start_date.date_naive()
    }
}

pub fn group_rounds(matches: &[MatchSummary]) -> BTreeMap<u32, RoundInfo> {
    let mut rounds: BTreeMap<u32, RoundInfo> = BTreeMap::new();
    for m in matches {
        rounds
            .entry(m.round)
            .or_insert_with(|| RoundInfo::new(m.match_date))
            .absorb(m);
    }
    rounds
}

pub fn determine_default_round(matches: &[MatchSummary], today: NaiveDate) -> u32 {
    select_round(&group_rounds(matches), today)
}

/// [`determine_default_round`] with `now` reduced to its UTC date.
pub fn determine_default_round_at(matches: &[MatchSummary], now: DateTime<Utc>) -> u32 {
    determine_default_round(matches, now.date_naive())
}

pub fn select_round(rounds: &BTreeMap<u32, RoundInfo>, today: NaiveDate) -> u32 {
    let Some(&last_round) = rounds.keys().next_back() else {
        return FALLBACK_ROUND;
    };

    let mut active = Vec::new();
    let mut future_incomplete = Vec::new();
    for (&round, info) in rounds {
        if info.all_finished {
            continue;
        }
        if info.start_day() <= today {
            active.push(round);
        } else {
            future_incomplete.push(round);
        }
    }

    let selected = active
        .iter()
        .max()
        .or_else(|| future_incomplete.iter().min())
        .copied()
        .unwrap_or(last_round);

    look_ahead(rounds, selected, today)
}

fn look_ahead(rounds: &BTreeMap<u32, RoundInfo>, selected: u32, today: NaiveDate) -> u32 {
    let Some(next) = selected.checked_add(1) else {
        return selected;
    };
    let Some(tomorrow) = today.succ_opt() else {
        return selected;
    };
    match rounds.get(&next) {
        Some(info) if info.start_day() == tomorrow => next,
        _ => selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime, TimeZone};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 20).unwrap()
    }

    fn at(day_offset: i64, hour: u32) -> DateTime<Utc> {
        let day = today() + Duration::days(day_offset);
        Utc.from_utc_datetime(&day.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()))
    }

    fn m(round: u32, day_offset: i64, status: MatchStatus) -> MatchSummary {
        MatchSummary {
            round,
            match_date: at(day_offset, 19),
            status,
        }
    }

    #[test]
    fn empty_input_falls_back_to_round_one() {
        assert_eq!(determine_default_round(&[], today()), 1);
    }

    #[test]
    fn picks_the_single_active_round() {
        let matches = vec![
            m(1, -7, MatchStatus::Finished),
            m(1, -6, MatchStatus::Finished),
            m(2, 0, MatchStatus::Finished),
            m(2, 0, MatchStatus::Scheduled),
            m(3, 5, MatchStatus::Scheduled),
            m(3, 6, MatchStatus::Scheduled),
        ];
        assert_eq!(determine_default_round(&matches, today()), 2);
    }

    #[test]
    fn last_representable_day_has_no_look_ahead() {
        let matches = vec![m(1, -1, MatchStatus::Scheduled), m(1, 2, MatchStatus::Scheduled)];
        assert_eq!(determine_default_round(&matches, NaiveDate::MAX), 1);
    }

    #[test]
    fn all_finished_falls_back_to_last_round() {
        let matches = vec![m(1, -7, MatchStatus::Finished), m(1, -6, MatchStatus::Finished)];
        assert_eq!(determine_default_round(&matches, today()), 1);
    }

    #[test]
    fn next_round_starting_tomorrow_wins() {
        let matches = vec![
            m(1, -7, MatchStatus::Finished),
            m(2, 0, MatchStatus::Live),
            m(2, 0, MatchStatus::Scheduled),
            m(3, 1, MatchStatus::Scheduled),
            m(3, 2, MatchStatus::Scheduled),
        ];
        assert_eq!(determine_default_round(&matches, today()), 3);
    }

    #[test]
    fn newest_active_round_beats_stale_unfinished_one() {
        let matches = vec![
            m(4, -20, MatchStatus::Postponed),
            m(5, -9, MatchStatus::Finished),
            m(6, -2, MatchStatus::Scheduled),
            m(7, 4, MatchStatus::Scheduled),
        ];
        assert_eq!(determine_default_round(&matches, today()), 6);
    }

    #[test]
    fn soonest_future_round_when_nothing_active() {
        let matches = vec![
            m(1, -10, MatchStatus::Finished),
            m(3, 9, MatchStatus::Scheduled),
            m(2, 3, MatchStatus::Scheduled),
        ];
        assert_eq!(determine_default_round(&matches, today()), 2);
    }

    #[test]
    fn look_ahead_only_checks_the_next_round_date() {
        // Round 3 starts in two days, not tomorrow: stay on round 2.
        let matches = vec![
            m(1, -3, MatchStatus::Finished),
            m(2, 1, MatchStatus::Scheduled),
            m(3, 2, MatchStatus::Scheduled),
        ];
        assert_eq!(determine_default_round(&matches, today()), 2);

        // Next round's own status does not matter, only its start date.
        let matches = vec![m(2, 0, MatchStatus::Live), m(3, 1, MatchStatus::Finished)];
        assert_eq!(determine_default_round(&matches, today()), 3);
    }

    #[test]
    fn start_date_is_the_earliest_kickoff() {
        let matches = vec![
            m(1, 3, MatchStatus::Scheduled),
            m(1, 0, MatchStatus::Scheduled),
            m(1, 2, MatchStatus::Scheduled),
        ];
        let rounds = group_rounds(&matches);
        assert_eq!(rounds[&1].start_date, at(0, 19));
        assert_eq!(rounds[&1].match_count, 3);
        assert_eq!(determine_default_round(&matches, today()), 1);
    }

    #[test]
    fn time_of_day_is_ignored() {
        // Kickoff late tonight still counts as started today.
        let matches = vec![MatchSummary {
            round: 8,
            match_date: at(0, 23),
            status: MatchStatus::Scheduled,
        }];
        let rounds = group_rounds(&matches);
        assert_eq!(select_round(&rounds, today()), 8);
        let early = Utc.from_utc_datetime(&today().and_hms_opt(0, 0, 1).unwrap());
        assert_eq!(determine_default_round_at(&matches, early), 8);
    }

    #[test]
    fn live_and_postponed_are_not_finished() {
        let rounds = group_rounds(&[m(1, -1, MatchStatus::Finished), m(1, -1, MatchStatus::Live)]);
        assert!(!rounds[&1].all_finished);
        let rounds = group_rounds(&[m(1, -1, MatchStatus::Postponed)]);
        assert!(!rounds[&1].all_finished);
    }

    #[test]
    fn empty_round_counts_as_all_finished() {
        let info = RoundInfo::new(at(0, 12));
        assert!(info.all_finished);
        assert_eq!(info.match_count, 0);

        // An empty round that started today is not treated as active.
        let mut rounds = group_rounds(&[m(1, -5, MatchStatus::Scheduled)]);
        rounds.insert(2, RoundInfo::new(at(0, 12)));
        assert_eq!(select_round(&rounds, today()), 1);

        // With nothing else open it is only reachable through the last-round fallback.
        let mut rounds = group_rounds(&[m(1, -5, MatchStatus::Finished)]);
        rounds.insert(2, RoundInfo::new(at(0, 12)));
        assert_eq!(select_round(&rounds, today()), 2);
    }
}
