mod config;
mod scenario;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use config::ServerConfig;

#[derive(Parser)]
#[command(name = "rally-server")]
#[command(about = "Headless rally: one authority and N replicas over a simulated network")]
struct Args {
    #[arg(short, long, help = "JSON config file; flags below override it")]
    config: Option<PathBuf>,

    #[arg(long, help = "Authoritative broadcast rate in Hz")]
    sync_rate: Option<f32>,

    #[arg(short, long, help = "Simulation tick rate in Hz")]
    tick_rate: Option<f32>,

    #[arg(short, long, help = "Number of replicas")]
    replicas: Option<usize>,

    #[arg(long, help = "Simulated duration in seconds")]
    seconds: Option<f64>,

    #[arg(long, help = "Packet loss percentage (0-100)")]
    loss_percent: Option<f32>,

    #[arg(long, help = "Minimum latency in ms")]
    min_latency: Option<u32>,

    #[arg(long, help = "Maximum latency in ms")]
    max_latency: Option<u32>,

    #[arg(long, help = "Jitter in ms")]
    jitter: Option<u32>,

    #[arg(long, help = "Seed for the network and the scripted rally")]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(rate) = self.sync_rate {
            config.rally.sync.sync_rate_hz = rate;
        }
        if let Some(rate) = self.tick_rate {
            config.rally.sync.tick_rate_hz = rate;
        }
        if let Some(replicas) = self.replicas {
            config.replicas = replicas;
        }
        if let Some(seconds) = self.seconds {
            config.seconds = seconds;
        }
        if let Some(loss) = self.loss_percent {
            config.link.loss_percent = loss;
        }
        if let Some(ms) = self.min_latency {
            config.link.min_latency_ms = ms;
        }
        if let Some(ms) = self.max_latency {
            config.link.max_latency_ms = ms;
        }
        if let Some(ms) = self.jitter {
            config.link.jitter_ms = ms;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    config.rally.validate().context("invalid configuration")?;

    log::info!(
        "rally-server: {} replicas, {:.1}s at {} Hz, link {:?}",
        config.replicas,
        config.seconds,
        config.rally.sync.tick_rate_hz,
        config.link
    );

    let report = scenario::run(&config);

    log::info!(
        "finished: {} matches completed, final phase {:?}, score {}-{}",
        report.matches_completed,
        report.final_state.phase,
        report.final_state.score_a,
        report.final_state.score_b
    );
    log::info!("authority: {}", report.authority_stats);
    for (peer, stats) in &report.replica_stats {
        log::info!("replica {}: {}", peer, stats);
    }
    log::info!(
        "network: sent {}, delivered {}, dropped {}",
        report.network.sent,
        report.network.delivered,
        report.network.dropped
    );

    Ok(())
}
