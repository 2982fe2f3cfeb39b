use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::history::{CreatorHistory, DailyRecord};
use crate::rank::RankIndex;
use crate::streak;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBreakdown {
    /// Total points
    pub total: i64,
    /// Points from daily diamond tiers
    pub diamonds: i64,
    /// Points from full hours live
    pub hours: i64,
    /// Flat bonus for valid days
    pub valid_days: i64,
    /// Points from daily diamond rankings
    pub rank_bonus: i64,
    /// One-off bonus for the current streak
    pub streak_bonus: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub streak: u32,
    pub points: PointsBreakdown,
}

/// Diamond points for a single day. Never accumulates across days.
///
/// All point arithmetic saturates at `i64::MAX`; the `as` casts already
/// saturate for out-of-range floats.
pub fn diamond_points(diamonds: f64, config: &ScoringConfig) -> i64 {
    if diamonds < config.diamond_threshold {
        return 0;
    }
    let steps = if config.diamond_step > 0.0 {
        ((diamonds - config.diamond_threshold) / config.diamond_step).floor() as i64
    } else {
        0
    };
    config
        .diamond_base_points
        .saturating_add(config.diamond_step_points.saturating_mul(steps))
}

pub fn hour_points(hours: f64, config: &ScoringConfig) -> i64 {
    config.hour_points.saturating_mul(hours.floor() as i64)
}

impl PointsBreakdown {
    pub fn add_day(&mut self, record: &DailyRecord, rank_bonus: i64, config: &ScoringConfig) {
        let diamonds = diamond_points(record.diamonds, config);
        let hours = hour_points(record.hours, config);
        let valid = if record.hours >= config.valid_day_hours {
            config.valid_day_points
        } else {
            0
        };

        self.diamonds = self.diamonds.saturating_add(diamonds);
        self.hours = self.hours.saturating_add(hours);
        self.valid_days = self.valid_days.saturating_add(valid);
        self.rank_bonus = self.rank_bonus.saturating_add(rank_bonus);
        self.total = [diamonds, hours, valid, rank_bonus]
            .into_iter()
            .fold(self.total, i64::saturating_add);
    }

    pub fn add_streak_bonus(&mut self, bonus: i64) {
        self.streak_bonus = self.streak_bonus.saturating_add(bonus);
        self.total = self.total.saturating_add(bonus);
    }
}

/// Scores one creator as of `today`.
///
/// Only records dated on or before `today`, and on or after `window_start`
/// when given, are counted. The streak is computed over the same records.
pub fn score(
    username: &str,
    history: &CreatorHistory,
    rank_index: &RankIndex,
    today: NaiveDate,
    window_start: Option<NaiveDate>,
    config: &ScoringConfig,
) -> Score {
    let mut in_scope = history.until(today);
    if let Some(start) = window_start {
        in_scope = in_scope.since(start);
    }

    let mut points = PointsBreakdown::default();
    for record in in_scope.records() {
        let bonus = rank_index.bonus(record.date, username);
        points.add_day(record, bonus, config);
    }

    let streak = streak::compute_streak(&in_scope, today, config.valid_day_hours);
    points.add_streak_bonus(streak::streak_bonus(streak, &config.streak_tiers));

    tracing::trace!(username, streak, total = points.total, "scored creator");
    Score { streak, points }
}
