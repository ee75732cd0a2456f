pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod notify;
pub mod recommend;
pub mod requests;
pub mod routes;
pub mod store;
pub mod users;
#[cfg(test)]
mod testing;

use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;

use agora_common::{Recommendation, SocialStats, UserId};
use axum::{Extension, Router};
use sled::Db;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::Config;
pub use error::{AppError, Result};

use cache::TtlCache;
use graph::SocialGraph;
use notify::Notifications;
use users::Users;

#[derive(Clone)]
pub struct State {
    pub config: Arc<Config>,
    pub users: Users,
    pub notifications: Notifications,
    pub graph: SocialGraph,
    pub recommendations: Arc<TtlCache<(UserId, usize), Vec<Recommendation>>>,
    pub stats: Arc<TtlCache<UserId, SocialStats>>,
}

impl State {
    pub fn open(config: Config) -> Result<Self> {
        let db = sled::open(&config.db_path)?;
        Self::with_db(&db, config)
    }

    /// Backed by a throwaway database that is removed on drop.
    pub fn temporary(config: Config) -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(&db, config)
    }

    fn with_db(db: &Db, config: Config) -> Result<Self> {
        let users = Users::new(db)?;
        let notifications = Notifications::new(db)?;
        let graph = SocialGraph::new(db, Arc::new(users.clone()), Arc::new(notifications.clone()))?;
        Ok(Self {
            recommendations: Arc::new(TtlCache::new(config.cache_ttl)),
            stats: Arc::new(TtlCache::new(config.cache_ttl)),
            config: Arc::new(config),
            users,
            notifications,
            graph,
        })
    }
}

pub fn app(state: State) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

pub async fn serve(listener: TcpListener, state: State, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
    info!("listening on {}", listener.local_addr()?);
    axum::Server::from_tcp(listener)?
        .serve(app(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("server stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
