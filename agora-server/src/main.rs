use std::env;
use std::net::{SocketAddr, TcpListener};

use agora_server::{serve, shutdown_signal, Config, State};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = Config::load()?;
    if let Some(port) = env::args().nth(1) {
        config.port = port.parse().with_context(|| format!("invalid port argument {port:?}"))?;
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = State::open(config).context("opening database")?;
    let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
    serve(listener, state, shutdown_signal()).await
}
