//! # A Minimal Redis-Compatible RESP2 Key/Value Server

use respkv::config::Config;
use respkv::constants::{DEFAULT_MAX_CONNECTIONS, ExitCode};
use respkv::errors::ApplicationError;
use respkv::keyspace::Keyspace;
use respkv::server::Server;
use log::{error, info};
use std::process::exit;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();
    info!("starting the server...");

    if let Err(err) = run().await {
        error!("{err}");
        eprintln!("{err}");
        let code = match err {
            ApplicationError::Config(_) => ExitCode::ConfigError,
            _ => ExitCode::BindError,
        };
        exit(code as i32);
    }
}

async fn run() -> Result<(), ApplicationError> {
    let config = Config::from_env()?;
    let addr = config.socket_addr()?;

    let keyspace = Arc::new(Keyspace::new());
    let server = Server::bind(addr, DEFAULT_MAX_CONNECTIONS, keyspace).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("CTRL+C received, shutting down...");
            shutdown.notify_one();
        }
    });

    server.run().await?;
    Ok(())
}
