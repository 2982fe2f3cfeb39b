//! History storage: one flat JSON file per creator.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::history::{CreatorHistory, DailyRecord};

/// Read access to creator histories.
pub trait HistoryProvider: Send + Sync {
    /// Known creators, sorted.
    fn usernames(&self) -> Result<Vec<String>>;

    /// Empty history for creators with no records.
    fn history(&self, username: &str) -> Result<CreatorHistory>;

    /// Creators whose history cannot be read are logged and left out.
    fn histories(&self) -> Result<BTreeMap<String, CreatorHistory>> {
        let mut all = BTreeMap::new();
        for username in self.usernames()? {
            match self.history(&username) {
                Ok(history) => {
                    all.insert(username, history);
                }
                Err(e) => {
                    tracing::warn!(username, error = %e, "skipping unreadable history");
                }
            }
        }
        Ok(all)
    }

    fn contains(&self, username: &str) -> Result<bool> {
        Ok(self.usernames()?.iter().any(|u| u == username))
    }
}

pub fn validate_username(username: &str) -> Result<()> {
    let valid = !username.is_empty()
        && !username.starts_with('.')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidUsername(username.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Records in the payload
    pub received: usize,
    /// Records dropped for lack of a usable date
    pub dropped: usize,
    /// Days in the stored history after the import
    pub stored_days: usize,
}

#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
    dir: PathBuf,
    /// Held across every read-merge-write so concurrent imports never lose days.
    write_lock: Arc<Mutex<()>>,
}

impl JsonHistoryStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), "opened history store");
        Ok(Self {
            dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        // Guards no data, so poisoning is ignored.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, username: &str) -> Result<PathBuf> {
        validate_username(username)?;
        Ok(self.dir.join(format!("{username}.json")))
    }

    /// Normalizes `raw` and merges it into the stored history; imported days
    /// replace stored ones.
    pub fn import(&self, username: &str, raw: &[Value]) -> Result<ImportSummary> {
        let incoming: Vec<DailyRecord> = raw.iter().filter_map(DailyRecord::normalize).collect();
        let dropped = raw.len() - incoming.len();

        let history = {
            let _guard = self.lock_writes();
            let mut history = self.history(username)?;
            history.merge(incoming);
            self.write(username, &history)?;
            history
        };

        let summary = ImportSummary {
            received: raw.len(),
            dropped,
            stored_days: history.len(),
        };
        if dropped > 0 {
            tracing::warn!(username, dropped, "import dropped records without a usable date");
        }
        tracing::info!(username, ?summary, "imported history");
        Ok(summary)
    }

    pub fn save(&self, username: &str, history: &CreatorHistory) -> Result<()> {
        let _guard = self.lock_writes();
        self.write(username, history)
    }

    fn write(&self, username: &str, history: &CreatorHistory) -> Result<()> {
        let path = self.path_for(username)?;
        let raw: Vec<Value> = history.records().iter().map(DailyRecord::to_raw).collect();
        let content = serde_json::to_string_pretty(&raw)?;

        // Readers never observe a partially written file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Returns whether a history file existed.
    pub fn remove(&self, username: &str) -> Result<bool> {
        let path = self.path_for(username)?;
        let _guard = self.lock_writes();
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        tracing::info!(username, "removed history");
        Ok(true)
    }
}

impl HistoryProvider for JsonHistoryStore {
    fn usernames(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_username(stem).is_ok() {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn history(&self, username: &str) -> Result<CreatorHistory> {
        let path = self.path_for(username)?;
        if !path.exists() {
            return Ok(CreatorHistory::default());
        }

        let content = fs::read_to_string(&path)?;
        let raw: Value = serde_json::from_str(&content)?;
        let Value::Array(records) = raw else {
            return Err(Error::InvalidHistory(format!(
                "{} does not hold a JSON array",
                path.display()
            )));
        };
        Ok(CreatorHistory::from_raw(&records))
    }
}

/// In-memory provider, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    histories: BTreeMap<String, CreatorHistory>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, username: impl Into<String>, history: CreatorHistory) {
        self.histories.insert(username.into(), history);
    }
}

impl FromIterator<(String, CreatorHistory)> for MemoryHistoryStore {
    fn from_iter<I: IntoIterator<Item = (String, CreatorHistory)>>(iter: I) -> Self {
        Self {
            histories: iter.into_iter().collect(),
        }
    }
}

impl HistoryProvider for MemoryHistoryStore {
    fn usernames(&self) -> Result<Vec<String>> {
        Ok(self.histories.keys().cloned().collect())
    }

    fn history(&self, username: &str) -> Result<CreatorHistory> {
        Ok(self.histories.get(username).cloned().unwrap_or_default())
    }

    fn histories(&self) -> Result<BTreeMap<String, CreatorHistory>> {
        Ok(self.histories.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usernames_reject_traversal() {
        assert!(validate_username("creator_01.live").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("../etc").is_err());
        assert!(validate_username("a/b").is_err());
        assert!(validate_username(".hidden").is_err());
    }

    #[test]
    fn import_merges_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::open(dir.path()).unwrap();

        let first = store
            .import(
                "alice",
                &[
                    json!({"date": "2024-08-01", "daily": 1200, "hours": 2}),
                    json!({"date": "2024-08-02", "daily": 300}),
                ],
            )
            .unwrap();
        assert_eq!(first.stored_days, 2);
        assert_eq!(first.dropped, 0);

        let second = store
            .import(
                "alice",
                &[
                    json!({"date": "2024-08-02", "daily": 5000, "hours": "3"}),
                    json!({"date": "not a date", "daily": 1}),
                ],
            )
            .unwrap();
        assert_eq!(
            second,
            ImportSummary {
                received: 2,
                dropped: 1,
                stored_days: 2
            }
        );

        let reopened = JsonHistoryStore::open(dir.path()).unwrap();
        let history = reopened.history("alice").unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 8, 2).unwrap();
        assert_eq!(history.get(day).unwrap().diamonds, 5000.0);
        assert_eq!(history.get(day).unwrap().hours, 3.0);
        assert_eq!(reopened.usernames().unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn missing_creator_has_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::open(dir.path()).unwrap();
        assert!(store.history("nobody").unwrap().is_empty());
        assert!(!store.contains("nobody").unwrap());
        assert!(!store.remove("nobody").unwrap());
    }

    #[test]
    fn non_array_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bob.json"), r#"{"date": "2024-08-01"}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let store = JsonHistoryStore::open(dir.path()).unwrap();

        assert_eq!(store.usernames().unwrap(), vec!["bob".to_string()]);
        assert!(matches!(
            store.history("bob"),
            Err(Error::InvalidHistory(_))
        ));
    }

    #[test]
    fn unreadable_histories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bob.json"), "[not json").unwrap();
        let store = JsonHistoryStore::open(dir.path()).unwrap();
        store
            .import("alice", &[json!({"date": "2024-08-01", "daily": 1000})])
            .unwrap();

        let histories = store.histories().unwrap();
        assert_eq!(histories.keys().map(String::as_str).collect::<Vec<_>>(), vec!["alice"]);
        assert_eq!(histories["alice"].len(), 1);
    }

    #[test]
    fn concurrent_imports_keep_every_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::open(dir.path()).unwrap();

        std::thread::scope(|scope| {
            for day in 1..=28 {
                let store = &store;
                scope.spawn(move || {
                    let record = json!({"date": format!("2024-02-{day:02}"), "daily": 100 * day});
                    store.import("alice", &[record]).unwrap();
                });
            }
        });

        let history = store.history("alice").unwrap();
        assert_eq!(history.len(), 28);
        assert!(!dir.path().join("alice.json.tmp").exists());
    }

    #[test]
    fn remove_deletes_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::open(dir.path()).unwrap();
        store
            .import("alice", &[json!({"date": "2024-08-01", "daily": 1000})])
            .unwrap();

        assert!(store.remove("alice").unwrap());
        assert!(store.usernames().unwrap().is_empty());
        assert!(!store.remove("alice").unwrap());
    }

    #[test]
    fn memory_store_lists_sorted() {
        let store: MemoryHistoryStore = [
            ("zed".to_string(), CreatorHistory::default()),
            ("amy".to_string(), CreatorHistory::default()),
        ]
        .into_iter()
        .collect();
        assert_eq!(store.usernames().unwrap(), vec!["amy", "zed"]);
        assert_eq!(store.histories().unwrap().len(), 2);
    }
}
