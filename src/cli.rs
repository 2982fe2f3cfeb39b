use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::leaderboard::Leaderboard;
use crate::store::{HistoryProvider, JsonHistoryStore};
use crate::web_server::ScoreQuery;

#[derive(Debug, Parser)]
#[command(version, about = "Incentive points and streaks for livestream creators")]
pub struct Cli {
    /// Config file, defaults to the platform config dir
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// History directory, overrides the config file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API
    Serve,
    /// Print the leaderboard as JSON
    Leaderboard(ScoreQuery),
    /// Print one creator's points as JSON
    Score {
        username: String,
        #[command(flatten)]
        query: ScoreQuery,
    },
    /// Merge a JSON array of daily records into a creator's history
    Import { username: String, file: PathBuf },
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        if let Some(dir) = &self.data_dir {
            config.store.data_dir = Some(dir.clone());
        }
        Ok(config)
    }

    pub async fn execute(self) -> Result<()> {
        let config = self.load_config()?;

        match self.command {
            Command::Serve => crate::serve(config).await,
            Command::Leaderboard(query) => {
                let board = leaderboard(&config, &query)?;
                print_json(&board)
            }
            Command::Score { username, query } => {
                let board = leaderboard(&config, &query)?;
                let entry = board
                    .entry(&username)
                    .ok_or_else(|| Error::UnknownCreator(username.clone()))?;
                print_json(entry)
            }
            Command::Import { username, file } => {
                let store = JsonHistoryStore::open(config.store.resolve_data_dir()?)?;
                let content = fs::read_to_string(&file)?;
                let Value::Array(records) = serde_json::from_str::<Value>(&content)? else {
                    return Err(Error::InvalidHistory(format!(
                        "{} does not hold a JSON array",
                        file.display()
                    )));
                };
                let summary = store.import(&username, &records)?;
                print_json(&summary)
            }
        }
    }
}

fn leaderboard(config: &Config, query: &ScoreQuery) -> Result<Leaderboard> {
    let (as_of, window) = query.resolve()?;
    let store = JsonHistoryStore::open(config.store.resolve_data_dir()?)?;
    let histories = store.histories()?;
    Ok(Leaderboard::compute(&histories, &config.scoring, as_of, window))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
