use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::get,
};
use chrono::{NaiveDate, Utc};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{convert::Infallible, net::TcpListener, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{ScoringConfig, ServerConfig};
use crate::error::{Error, Result};
use crate::leaderboard::{Leaderboard, LeaderboardEntry, Window};
use crate::rank::{RankIndex, RankedCreator};
use crate::store::{HistoryProvider, ImportSummary, JsonHistoryStore, validate_username};
use crate::streak;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonHistoryStore>,
    pub scoring: Arc<ScoringConfig>,
    pub tx: broadcast::Sender<Leaderboard>,
}

impl AppState {
    pub fn new(store: JsonHistoryStore, scoring: ScoringConfig) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            store: Arc::new(store),
            scoring: Arc::new(scoring),
            tx,
        }
    }

    pub async fn leaderboard(&self, as_of: NaiveDate, window: Window) -> Result<Leaderboard> {
        let store = self.store.clone();
        let scoring = self.scoring.clone();
        blocking(move || {
            let histories = store.histories()?;
            Ok(Leaderboard::compute(&histories, &scoring, as_of, window))
        })
        .await
    }

    /// Pushes a fresh lifetime leaderboard to SSE subscribers. A failure here
    /// never fails the write that triggered it.
    async fn broadcast_leaderboard(&self) {
        match self.leaderboard(today(), Window::Lifetime).await {
            Ok(board) => {
                // No subscribers is fine
                let _ = self.tx.send(board);
            }
            Err(e) => tracing::warn!(error = %e, "could not refresh leaderboard for subscribers"),
        }
    }

    async fn require_creator(&self, username: String) -> Result<()> {
        validate_username(&username)?;
        let store = self.store.clone();
        blocking(move || {
            if store.contains(&username)? {
                Ok(())
            } else {
                Err(Error::UnknownCreator(username))
            }
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| Error::InvalidDate(s.to_string()))
}

#[derive(Debug, Default, Deserialize, clap::Args)]
pub struct ScoreQuery {
    /// Evaluation day (YYYY-MM-DD), defaults to today in UTC
    #[arg(long)]
    pub as_of: Option<String>,
    /// lifetime or month
    #[arg(long)]
    pub period: Option<String>,
    /// Only count days on or after this day (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,
}

impl ScoreQuery {
    /// `since` takes precedence over `period`.
    pub fn resolve(&self) -> Result<(NaiveDate, Window)> {
        let as_of = match &self.as_of {
            Some(s) => parse_day(s)?,
            None => today(),
        };
        let window = match (&self.since, self.period.as_deref()) {
            (Some(since), _) => Window::Since(parse_day(since)?),
            (None, None | Some("lifetime")) => Window::Lifetime,
            (None, Some("month")) => Window::Month,
            (None, Some(other)) => return Err(Error::InvalidPeriod(other.to_string())),
        };
        Ok((as_of, window))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidUsername(_) | Error::InvalidDate(_) | Error::InvalidPeriod(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::UnknownCreator(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/api/creators/:username/points", get(points_handler))
        .route("/api/creators/:username/streak", get(streak_handler))
        .route(
            "/api/creators/:username/history",
            axum::routing::post(import_handler).delete(remove_handler),
        )
        .route("/api/rankings/:date", get(rankings_handler))
        .route("/events", get(sse_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn leaderboard_handler(
    State(state): State<AppState>,
    Query(query): Query<ScoreQuery>,
) -> Result<Json<Leaderboard>> {
    let (as_of, window) = query.resolve()?;
    Ok(Json(state.leaderboard(as_of, window).await?))
}

async fn points_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<ScoreQuery>,
) -> Result<Json<LeaderboardEntry>> {
    let (as_of, window) = query.resolve()?;
    state.require_creator(username.clone()).await?;

    // Rank bonuses depend on every creator, so score the whole board.
    let board = state.leaderboard(as_of, window).await?;
    board
        .entry(&username)
        .cloned()
        .map(Json)
        .ok_or(Error::UnknownCreator(username))
}

#[derive(Debug, Serialize)]
struct StreakResponse {
    username: String,
    as_of: NaiveDate,
    streak: u32,
    bonus: i64,
}

async fn streak_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<ScoreQuery>,
) -> Result<Json<StreakResponse>> {
    let (as_of, window) = query.resolve()?;
    state.require_creator(username.clone()).await?;

    let store = state.store.clone();
    let scoring = state.scoring.clone();
    blocking(move || {
        let mut history = store.history(&username)?;
        if let Some(start) = window.start(as_of) {
            history = history.since(start);
        }
        let streak = streak::compute_streak(&history, as_of, scoring.valid_day_hours);
        Ok(Json(StreakResponse {
            bonus: streak::streak_bonus(streak, &scoring.streak_tiers),
            username,
            as_of,
            streak,
        }))
    })
    .await
}

async fn rankings_handler(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<Vec<RankedCreator>>> {
    let date = parse_day(&date)?;
    let store = state.store.clone();
    let scoring = state.scoring.clone();
    blocking(move || {
        let histories = store.histories()?;
        let index = RankIndex::build(
            histories.iter().map(|(u, h)| (u.as_str(), h)),
            &scoring.rank_bonus,
        );
        Ok(Json(index.standings(date).to_vec()))
    })
    .await
}

async fn import_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(records): Json<Vec<Value>>,
) -> Result<Json<ImportSummary>> {
    validate_username(&username)?;
    let store = state.store.clone();
    let summary = blocking(move || store.import(&username, &records)).await?;

    state.broadcast_leaderboard().await;
    Ok(Json(summary))
}

async fn remove_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode> {
    validate_username(&username)?;
    let store = state.store.clone();
    let name = username.clone();
    if !blocking(move || store.remove(&name)).await? {
        return Err(Error::UnknownCreator(username));
    }

    state.broadcast_leaderboard().await;
    Ok(StatusCode::NO_CONTENT)
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        result.ok().map(|board: Leaderboard| {
            Ok(Event::default()
                .event("leaderboard")
                .data(serde_json::to_string(&board).unwrap_or_default()))
        })
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

pub struct WebServer {
    host: String,
    port: u16,
    state: AppState,
}

impl WebServer {
    /// Picks the configured port, or the next free one within `port_search`.
    pub fn new(config: &ServerConfig, state: AppState) -> Option<Self> {
        let last = config.port.saturating_add(config.port_search);
        let port = (config.port..=last)
            .find(|&p| TcpListener::bind((config.host.as_str(), p)).is_ok())?;
        Some(Self {
            host: config.host.clone(),
            port,
            state,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Serves until ctrl-c.
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind((self.host.as_str(), self.port)).await?;
        tracing::info!(url = %self.url(), "api server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for shutdown signal");
                }
            })
            .await?;

        tracing::info!("api server stopped");
        Ok(())
    }
}
