//! viral-radar: polls problem and video feeds, delivers the best new matches.
//!
//! `once` runs a single cycle (for cron), `run` loops until Ctrl-C, `serve` also exposes
//! the HTTP control surface.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use viral_radar::api::{create_router, AppState};
use viral_radar::metrics::Metrics;
use viral_radar::{init_tracing, RadarConfig, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "viral-radar", version, about)]
struct Cli {
    /// Config file (TOML).
    #[arg(long, global = true, env = "RADAR_CONFIG", default_value = viral_radar::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one cycle and print its report as JSON.
    Once,
    /// Run cycles on the configured interval until Ctrl-C.
    Run,
    /// Scheduler plus HTTP API (/health, /cycles, /cycles/last, /metrics).
    Serve {
        #[arg(long, env = "RADAR_ADDR", default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = RadarConfig::load(&cli.config)?;

    match cli.command {
        Command::Once => {
            let mut pipeline = cfg.build_pipeline().await?;
            let report = pipeline.run_cycle(&Shutdown::never()).await;
            // Errors are part of the report; exit code stays 0.
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Run => {
            let pipeline = cfg.build_pipeline().await?.into_shared();
            let (trigger, shutdown) = Shutdown::new();
            tokio::spawn(trigger.fire_on(tokio::signal::ctrl_c()));
            let summary = cfg.scheduler().run(&pipeline, shutdown, |_| {}).await;
            tracing::info!(cycles = summary.cycles, failed = summary.failed_cycles, "bye");
        }
        Command::Serve { addr } => {
            let metrics = Metrics::install(cfg.scheduler.interval_secs)?;
            let pipeline = cfg.build_pipeline().await?.into_shared();
            let (trigger, shutdown) = Shutdown::new();

            let state = AppState::new(pipeline.clone(), shutdown.clone());
            let router = create_router(state.clone(), &metrics);

            let scheduler = cfg.scheduler();
            let sched_shutdown = shutdown.clone();
            let sched = tokio::spawn(async move {
                scheduler
                    .run(&pipeline, sched_shutdown, |r| state.record(r))
                    .await
            });

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            tracing::info!(%addr, "listening");

            let mut http_shutdown = shutdown.clone();
            tokio::spawn(trigger.fire_on(tokio::signal::ctrl_c()));
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { http_shutdown.wait().await })
                .await
                .context("http server")?;

            let summary = sched.await.context("scheduler task")?;
            tracing::info!(cycles = summary.cycles, failed = summary.failed_cycles, "bye");
        }
    }
    Ok(())
}
