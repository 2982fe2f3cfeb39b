pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod leaderboard;
pub mod points;
pub mod rank;
pub mod store;
pub mod streak;
pub mod web_server;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{Error, Result};

const DEFAULT_LOG_FILTER: &str = "creator_points_lib=info,creator_points=info,tower_http=debug";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Opens the history store from `config` and serves the API until ctrl-c.
pub async fn serve(config: config::Config) -> Result<()> {
    let store = store::JsonHistoryStore::open(config.store.resolve_data_dir()?)?;
    let state = web_server::AppState::new(store, config.scoring);

    let Some(server) = web_server::WebServer::new(&config.server, state) else {
        tracing::error!(
            host = %config.server.host,
            port = config.server.port,
            search = config.server.port_search,
            "no free port for api server"
        );
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "no free port for api server",
        )));
    };

    tracing::info!(url = %server.url(), "starting api server");
    server.serve().await
}
