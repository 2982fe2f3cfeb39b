use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ScoringConfig;
use crate::history::{ActivitySummary, CreatorHistory};
use crate::points::{self, PointsBreakdown, Score};
use crate::rank::RankIndex;

/// Which records count towards a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "period", content = "since")]
pub enum Window {
    #[default]
    Lifetime,
    /// From the first day of the evaluation month
    Month,
    Since(NaiveDate),
}

impl Window {
    pub fn start(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Window::Lifetime => None,
            Window::Month => today.with_day(1),
            Window::Since(date) => Some(*date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based
    pub position: usize,
    pub username: String,
    pub streak: u32,
    pub points: PointsBreakdown,
    pub activity: ActivitySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub as_of: NaiveDate,
    pub window: Window,
    pub entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// Builds the rank index once and scores every creator against it.
    /// Ordered by total points, then username.
    pub fn compute(
        histories: &BTreeMap<String, CreatorHistory>,
        config: &ScoringConfig,
        today: NaiveDate,
        window: Window,
    ) -> Self {
        let rank_index = RankIndex::build(
            histories.iter().map(|(u, h)| (u.as_str(), h)),
            &config.rank_bonus,
        );
        let start = window.start(today);

        let mut scored: Vec<(&String, Score, ActivitySummary)> = histories
            .iter()
            .map(|(username, history)| {
                let score = points::score(username, history, &rank_index, today, start, config);
                let mut in_scope = history.until(today);
                if let Some(start) = start {
                    in_scope = in_scope.since(start);
                }
                (username, score, in_scope.summary(config.valid_day_hours))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.points
                .total
                .cmp(&a.1.points.total)
                .then_with(|| a.0.cmp(b.0))
        });

        let entries = scored
            .into_iter()
            .enumerate()
            .map(|(i, (username, score, activity))| LeaderboardEntry {
                position: i + 1,
                username: username.clone(),
                streak: score.streak,
                points: score.points,
                activity,
            })
            .collect::<Vec<_>>();

        tracing::debug!(creators = entries.len(), %today, ?window, "computed leaderboard");
        Self {
            as_of: today,
            window,
            entries,
        }
    }

    pub fn entry(&self, username: &str) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|e| e.username == username)
    }
}
