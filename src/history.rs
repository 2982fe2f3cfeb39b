//! Daily creator records and the normalization boundary.
//!
//! Stored history arrives loosely typed: `{date, daily?, hours?}` objects where
//! the numeric fields may be missing, `null`, strings, or garbage. Everything
//! past this module works with fully populated [`DailyRecord`]s.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const DIAMOND_KEYS: [&str; 3] = ["daily", "diamondsEarned", "diamonds"];
const HOUR_KEYS: [&str; 2] = ["hours", "hoursLive"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    /// Diamonds earned that day, never negative
    pub diamonds: f64,
    /// Hours live that day, never negative
    pub hours: f64,
}

impl DailyRecord {
    pub fn new(date: NaiveDate, diamonds: f64, hours: f64) -> Self {
        Self {
            date,
            diamonds: sanitize(diamonds),
            hours: sanitize(hours),
        }
    }

    /// Returns `None` when the record has no usable date.
    pub fn normalize(raw: &Value) -> Option<Self> {
        let Some(date) = raw.get("date").and_then(parse_date) else {
            tracing::debug!(record = %raw, "dropping record without a usable date");
            return None;
        };

        Some(Self::new(
            date,
            first_number(raw, &DIAMOND_KEYS),
            first_number(raw, &HOUR_KEYS),
        ))
    }

    /// The raw storage shape, as written back by the history store.
    pub fn to_raw(&self) -> Value {
        serde_json::json!({
            "date": self.date.format("%Y-%m-%d").to_string(),
            "daily": self.diamonds,
            "hours": self.hours,
        })
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn first_number(raw: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|key| raw.get(*key).filter(|v| !v.is_null()))
        .map(lenient_number)
        .unwrap_or(0.0)
}

fn lenient_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp, which is reduced to its UTC day.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

/// One creator's records, ascending by date with at most one record per day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatorHistory {
    records: Vec<DailyRecord>,
}

impl CreatorHistory {
    /// Later records for the same date replace earlier ones.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = DailyRecord>,
    {
        let mut by_date = BTreeMap::new();
        for record in records {
            by_date.insert(record.date, record);
        }
        Self {
            records: by_date.into_values().collect(),
        }
    }

    pub fn from_raw(raw: &[Value]) -> Self {
        Self::from_records(raw.iter().filter_map(DailyRecord::normalize))
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DailyRecord> {
        self.records
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    /// Imports `incoming` on top of the current records; incoming days win.
    pub fn merge<I>(&mut self, incoming: I)
    where
        I: IntoIterator<Item = DailyRecord>,
    {
        let merged = Self::from_records(self.records.iter().copied().chain(incoming));
        *self = merged;
    }

    pub fn since(&self, start: NaiveDate) -> Self {
        self.filtered(|r| r.date >= start)
    }

    pub fn until(&self, end: NaiveDate) -> Self {
        self.filtered(|r| r.date <= end)
    }

    fn filtered(&self, keep: impl Fn(&DailyRecord) -> bool) -> Self {
        Self {
            records: self.records.iter().copied().filter(keep).collect(),
        }
    }

    pub fn summary(&self, valid_day_hours: f64) -> ActivitySummary {
        self.records
            .iter()
            .fold(ActivitySummary::default(), |mut acc, r| {
                acc.days += 1;
                if r.hours >= valid_day_hours {
                    acc.valid_days += 1;
                }
                acc.diamonds += r.diamonds;
                acc.hours += r.hours;
                acc
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub days: u32,
    pub valid_days: u32,
    pub diamonds: f64,
    pub hours: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn normalize_coerces_bad_fields_to_zero() {
        let record = DailyRecord::normalize(&json!({
            "date": "2024-03-01",
            "daily": "abc",
            "hours": null,
        }))
        .unwrap();
        assert_eq!(record.date, day("2024-03-01"));
        assert_eq!(record.diamonds, 0.0);
        assert_eq!(record.hours, 0.0);

        let record =
            DailyRecord::normalize(&json!({"date": "2024-03-01", "daily": -50, "hours": [1]}))
                .unwrap();
        assert_eq!(record.diamonds, 0.0);
        assert_eq!(record.hours, 0.0);
    }

    #[test]
    fn normalize_accepts_numeric_strings_and_aliases() {
        let record = DailyRecord::normalize(&json!({
            "date": "2024-03-01",
            "diamondsEarned": " 2500 ",
            "hoursLive": 2.5,
        }))
        .unwrap();
        assert_eq!(record.diamonds, 2500.0);
        assert_eq!(record.hours, 2.5);
    }

    #[test]
    fn normalize_drops_unusable_dates() {
        assert!(DailyRecord::normalize(&json!({"daily": 1000})).is_none());
        assert!(DailyRecord::normalize(&json!({"date": "yesterday"})).is_none());
        assert!(DailyRecord::normalize(&json!({"date": 20240301})).is_none());
        assert!(DailyRecord::normalize(&json!("2024-03-01")).is_none());
    }

    #[test]
    fn rfc3339_dates_use_utc_day() {
        let record = DailyRecord::normalize(&json!({"date": "2024-03-01T23:30:00-02:00"})).unwrap();
        assert_eq!(record.date, day("2024-03-02"));
    }

    #[test]
    fn duplicate_dates_keep_last() {
        let history = CreatorHistory::from_raw(&[
            json!({"date": "2024-03-02", "daily": 10}),
            json!({"date": "2024-03-01", "daily": 20}),
            json!({"date": "2024-03-02", "daily": 30}),
            json!({"date": "bogus", "daily": 40}),
        ]);

        assert_eq!(history.len(), 2);
        assert_eq!(history.first_date(), Some(day("2024-03-01")));
        assert_eq!(history.get(day("2024-03-02")).unwrap().diamonds, 30.0);
    }

    #[test]
    fn merge_overwrites_same_day() {
        let mut history = CreatorHistory::from_records([
            DailyRecord::new(day("2024-03-01"), 100.0, 1.0),
            DailyRecord::new(day("2024-03-02"), 200.0, 2.0),
        ]);
        history.merge([
            DailyRecord::new(day("2024-03-02"), 999.0, 0.5),
            DailyRecord::new(day("2024-03-03"), 300.0, 3.0),
        ]);

        let diamonds: Vec<f64> = history.records().iter().map(|r| r.diamonds).collect();
        assert_eq!(diamonds, vec![100.0, 999.0, 300.0]);
    }

    #[test]
    fn window_filters_and_summary() {
        let history = CreatorHistory::from_records([
            DailyRecord::new(day("2024-03-01"), 100.0, 0.5),
            DailyRecord::new(day("2024-03-02"), 200.0, 2.0),
            DailyRecord::new(day("2024-03-03"), 300.0, 1.0),
        ]);

        let window = history.since(day("2024-03-02")).until(day("2024-03-02"));
        assert_eq!(window.len(), 1);

        let summary = history.summary(1.0);
        assert_eq!(summary.days, 3);
        assert_eq!(summary.valid_days, 2);
        assert_eq!(summary.diamonds, 600.0);
        assert_eq!(summary.hours, 3.5);
    }

    #[test]
    fn raw_shape_round_trips_through_normalize() {
        let record = DailyRecord::new(day("2024-03-05"), 1234.0, 1.5);
        assert_eq!(DailyRecord::normalize(&record.to_raw()), Some(record));
    }
}
