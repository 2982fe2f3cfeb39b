use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::history::CreatorHistory;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCreator {
    /// 1-based
    pub rank: usize,
    pub username: String,
    pub diamonds: f64,
    pub bonus: i64,
}

/// Per-day diamond rankings with the bonus each placed creator earns.
///
/// Built once per batch and shared read-only by every scoring call.
#[derive(Debug, Clone, Default)]
pub struct RankIndex {
    days: BTreeMap<NaiveDate, Vec<RankedCreator>>,
}

impl RankIndex {
    /// Ranks creators with positive diamonds on each date. Equal diamond
    /// counts are ordered by username so the result never depends on input
    /// order. Only the first `bonus_table.len()` places are kept.
    pub fn build<'a, I>(histories: I, bonus_table: &[i64]) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a CreatorHistory)>,
    {
        let histories: Vec<(&str, &CreatorHistory)> = histories.into_iter().collect();
        let dates: BTreeSet<NaiveDate> = histories
            .iter()
            .flat_map(|(_, h)| h.records().iter().map(|r| r.date))
            .collect();

        let mut days = BTreeMap::new();
        if bonus_table.is_empty() {
            return Self { days };
        }

        for date in dates {
            let mut earners: Vec<(&str, f64)> = histories
                .iter()
                .filter_map(|(username, h)| {
                    h.get(date)
                        .filter(|r| r.diamonds > 0.0)
                        .map(|r| (*username, r.diamonds))
                })
                .collect();
            if earners.is_empty() {
                continue;
            }

            earners.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.0.cmp(b.0))
            });

            let ranked = earners
                .into_iter()
                .zip(bonus_table)
                .enumerate()
                .map(|(i, ((username, diamonds), bonus))| RankedCreator {
                    rank: i + 1,
                    username: username.to_string(),
                    diamonds,
                    bonus: *bonus,
                })
                .collect();
            days.insert(date, ranked);
        }

        tracing::debug!(days = days.len(), "built daily rank index");
        Self { days }
    }

    /// Zero when the creator did not place that day.
    pub fn bonus(&self, date: NaiveDate, username: &str) -> i64 {
        self.days
            .get(&date)
            .and_then(|ranked| ranked.iter().find(|c| c.username == username))
            .map(|c| c.bonus)
            .unwrap_or(0)
    }

    pub fn standings(&self, date: NaiveDate) -> &[RankedCreator] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.keys().copied()
    }
}
