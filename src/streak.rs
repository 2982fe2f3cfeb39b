use chrono::NaiveDate;

use crate::config::StreakTier;
use crate::history::{CreatorHistory, DailyRecord};

const SECONDS_PER_DAY: f64 = 86_400.0;
/// Accepted distance between consecutive streak days, in days
const MIN_GAP: f64 = 0.5;
const MAX_GAP: f64 = 1.5;

fn days_between(later: NaiveDate, earlier: NaiveDate) -> f64 {
    later.signed_duration_since(earlier).num_seconds() as f64 / SECONDS_PER_DAY
}

fn follows(later: NaiveDate, earlier: NaiveDate) -> bool {
    let gap = days_between(later, earlier);
    (MIN_GAP..=MAX_GAP).contains(&gap)
}

/// Length of the current run of valid days ending today or yesterday.
///
/// A record dated `today` that is below `min_hours` is treated as "not live
/// yet" and skipped, so an unfinished day neither breaks nor extends the run.
/// Records dated after `today` are ignored.
pub fn compute_streak(history: &CreatorHistory, today: NaiveDate, min_hours: f64) -> u32 {
    let mut entries: Vec<&DailyRecord> = history
        .records()
        .iter()
        .filter(|r| r.date <= today)
        .collect();
    entries.sort_by_key(|r| r.date);

    if entries
        .last()
        .is_some_and(|r| r.date == today && r.hours < min_hours)
    {
        entries.pop();
    }

    let Some((latest, earlier)) = entries.split_last() else {
        return 0;
    };
    if latest.hours < min_hours || days_between(today, latest.date) > MAX_GAP {
        return 0;
    }

    let mut streak = 1;
    let mut anchor = latest.date;
    for record in earlier.iter().rev() {
        if !follows(anchor, record.date) || record.hours < min_hours {
            break;
        }
        streak += 1;
        anchor = record.date;
    }
    streak
}

/// Bonus for the highest tier the streak reaches.
pub fn streak_bonus(streak: u32, tiers: &[StreakTier]) -> i64 {
    tiers
        .iter()
        .filter(|tier| streak >= tier.min_days)
        .max_by_key(|tier| tier.min_days)
        .map(|tier| tier.bonus)
        .unwrap_or(0)
}
