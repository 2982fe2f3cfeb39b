use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not determine {0} path")]
    Path(&'static str),

    #[error("invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("unknown creator: {0}")]
    UnknownCreator(String),

    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("unknown period {0:?}, expected lifetime or month")]
    InvalidPeriod(String),

    #[error("invalid history payload: {0}")]
    InvalidHistory(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
