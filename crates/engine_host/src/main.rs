//! # engine_host binary
//!
//! Loads the configured guest slots, starts a source watcher for each, and
//! drives the runtime at the configured tick rate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::runtime::Handle as TokioHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use engine_host::{HostConfig, ManifestCompiler, ReloadHost, SlotConfig, SourceWatcher, TickLoop, kill_switch};

#[derive(Parser)]
#[command(name = "engine_host", about = "Run guest worlds and hot-reload them on change")]
struct Args {
    /// Path to a JSON host configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// World manifest to load as an extra slot named "main"
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Stop after this many ticks (0 = run forever)
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Target ticks per second
    #[arg(long)]
    tick_rate: Option<f64>,

    /// Do not watch sources for changes
    #[arg(long)]
    no_watch: bool,
}

impl Args {
    fn host_config(&self) -> Result<HostConfig> {
        let mut config = match &self.config {
            Some(path) => HostConfig::load(path)?,
            None => HostConfig::default(),
        };
        if let Some(manifest) = &self.manifest {
            config = config.with_slot(SlotConfig::new("main", manifest));
        }
        if let Some(ticks) = self.ticks {
            config = config.with_max_ticks(ticks);
        }
        if let Some(rate) = self.tick_rate {
            config = config.with_tick_rate(rate);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("engine_host=info".parse()?)
                .add_directive("engine_runtime=info".parse()?),
        )
        .init();
    kill_switch::install();

    let args = Args::parse();
    let config = args.host_config()?;
    if config.slots.is_empty() {
        anyhow::bail!("nothing to run: pass --manifest or a config with slots");
    }

    info!(slots = config.slots.len(), tick_rate = config.tick_rate, "engine host starting");

    let tokio = TokioHandle::current();
    let mut host = ReloadHost::new(tokio.clone());
    let mut watchers = Vec::new();

    for slot in &config.slots {
        let id = host.add_slot(&slot.name, Arc::new(ManifestCompiler::from_slot(slot)))?;
        if let Err(err) = host.initialize(id) {
            error!(slot = %slot.name, error = %err, "initial load failed, waiting for a fix");
        }
        if !args.no_watch {
            let mut watcher = SourceWatcher::new(slot.watch_path());
            if let Err(err) = watcher.scan() {
                error!(slot = %slot.name, error = %err, "cannot watch sources");
                continue;
            }
            watchers.push(watcher.spawn(&tokio, config.watch_interval(), host.dirty_flag(id)?));
        }
    }

    let mut tick_loop = TickLoop::new(config.tick(), host);
    let result = tick_loop.run().await;

    for watcher in watchers {
        watcher.abort();
    }
    let host = tick_loop.into_host();
    info!(
        frames = host.runtime().frame(),
        hook_failures = host.runtime().hook_failures(),
        diagnostics = host.diagnostics().len(),
        "engine host shut down"
    );
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("engine_host").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_tick_rate_override_is_validated() {
        let config = parse(&["--manifest", "world.json", "--tick-rate", "30"])
            .host_config()
            .unwrap();
        assert_eq!(config.tick_rate, 30.0);
        assert_eq!(config.slots[0].name, "main");

        assert!(parse(&["--tick-rate", "0"]).host_config().is_err());
        assert!(parse(&["--tick-rate=-5"]).host_config().is_err());
        assert!(parse(&["--tick-rate", "NaN"]).host_config().is_err());
    }
}
