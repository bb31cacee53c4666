mod config;

use std::env;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use parameter_server::{Registry, service};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use worker::{RemoteClient, WorkerProxy};

use crate::config::RelayConfig;

const KEY: &str = "w";
const DIM: usize = 8;
const STEPS_PER_SCHEDULE: usize = 10;

const USAGE: &str = "usage: relay serve <config.json> | relay worker <rank> <steps>";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["serve", path] => serve(path).await,
        ["worker", rank, steps] => {
            let rank = rank.parse().context("rank must be a non negative integer")?;
            let steps = steps.parse().context("steps must be a non negative integer")?;
            train(rank, steps).await
        }
        _ => bail!(USAGE),
    }
}

/// Starts the configured store and exposes it until interrupted.
async fn serve(path: &str) -> Result<()> {
    let config = RelayConfig::load(path)?;
    let registry = Registry::new();
    let handle = registry.get_or_create(&config.store, config.resources)?;

    let addr = config::listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(store = handle.name(); "listening at {addr}");

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(service::serve(listener, handle, shutdown.clone()));

    signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    shutdown.cancel();

    server.await?;
    Ok(())
}

/// Fits `w` to a fixed target by minimizing `|w - target|^2` against a remote store.
async fn train(rank: comms::Rank, steps: usize) -> Result<()> {
    let addr = config::listen_addr();
    let client = RemoteClient::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;

    let mut proxy = WorkerProxy::new(client, rank).await?;
    info!(rank = rank, lr = proxy.learning_rate(); "connected to {addr}");

    let target: Vec<f32> = (0..DIM).map(|i| i as f32).collect();
    let mut weights = vec![0.; DIM];

    for step in 1..=steps {
        let gradient: Vec<_> = weights
            .iter()
            .zip(&target)
            .map(|(w, t)| 2. * (w - t))
            .collect();

        (weights, _) = proxy.apply(KEY, &weights, &gradient).await?;

        if step % STEPS_PER_SCHEDULE == 0 {
            proxy.step_schedule().await?;

            let loss: f32 = weights.iter().zip(&target).map(|(w, t)| (w - t).powi(2)).sum();
            info!(rank = rank, step = step, lr = proxy.learning_rate(); "loss {loss:.6}");
        }
    }

    if let Err(e) = proxy.into_inner().disconnect().await {
        warn!("failed to disconnect cleanly: {e}");
    }

    Ok(())
}
