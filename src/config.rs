use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakTier {
    /// Minimum streak length (days) for this tier
    pub min_days: u32,
    /// Bonus awarded once when the tier is reached
    pub bonus: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Diamonds needed on a single day before diamond points are awarded
    pub diamond_threshold: f64,
    /// Points for crossing the threshold
    pub diamond_base_points: i64,
    /// Size of each additional diamond step beyond the threshold
    pub diamond_step: f64,
    /// Points per additional full step
    pub diamond_step_points: i64,
    /// Points per full hour live
    pub hour_points: i64,
    /// Hours live required for a day to count as valid
    pub valid_day_hours: f64,
    /// Flat bonus for a valid day
    pub valid_day_points: i64,
    /// Bonus per daily diamond rank, index 0 is first place
    pub rank_bonus: Vec<i64>,
    /// Streak bonus tiers, any order
    pub streak_tiers: Vec<StreakTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API server binds to
    pub host: String,
    /// Preferred port for the API server
    pub port: u16,
    /// How many ports above `port` to try when it is taken
    pub port_search: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one JSON history file per creator
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scoring: ScoringConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            diamond_threshold: 1000.0,
            diamond_base_points: 10,
            diamond_step: 1000.0,
            diamond_step_points: 2,
            hour_points: 3,
            valid_day_hours: 1.0,
            valid_day_points: 3,
            rank_bonus: vec![20, 15, 10, 5, 3],
            streak_tiers: vec![
                StreakTier { min_days: 30, bonus: 150 },
                StreakTier { min_days: 20, bonus: 100 },
                StreakTier { min_days: 10, bonus: 50 },
                StreakTier { min_days: 5, bonus: 25 },
                StreakTier { min_days: 3, bonus: 15 },
            ],
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            port_search: 30,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "creatorpoints", "creator-points")
}

impl StoreConfig {
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join("history"))
            .ok_or(Error::Path("data"))
    }
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads the config from the platform config dir, writing defaults on first run.
    pub fn load() -> Result<Self> {
        let path = Self::config_path().ok_or(Error::Path("config"))?;
        Self::load_or_init(&path)
    }

    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!(path = %path.display(), "wrote default config");
            return Ok(config);
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[scoring]
rank_bonus = [50, 40, 30, 20]

[server]
port = 9000
"#,
        )
        .unwrap();

        assert_eq!(config.scoring.rank_bonus, vec![50, 40, 30, 20]);
        assert_eq!(config.scoring.hour_points, 3);
        assert_eq!(config.scoring.streak_tiers.len(), 5);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.port_search, 30);
        assert!(config.store.data_dir.is_none());
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let first = Config::load_or_init(&path).unwrap();
        assert!(path.exists());
        let second = Config::load_from(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(second, Config::default());
    }

    #[test]
    fn explicit_data_dir_wins() {
        let store = StoreConfig {
            data_dir: Some(PathBuf::from("/tmp/creators")),
        };
        assert_eq!(
            store.resolve_data_dir().unwrap(),
            PathBuf::from("/tmp/creators")
        );
    }
}
