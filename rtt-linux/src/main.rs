// Wi-Fi RTT demo host: drives the ranging orchestrator against a simulated Aware/RTT platform.

mod config;
mod console;
mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rtt_core::{Orchestrator, Platform, Role};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    let mut role = None;
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("rtt-linux {}", VERSION);
                return Ok(());
            }
            "--role" | "-r" => {
                let value = args.next().context("--role needs publisher or subscriber")?;
                role = Some(value.parse::<Role>()?);
            }
            "--config" | "-c" => {
                let value = args.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(value));
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }

    let mut cfg = config::load(config_path.as_deref())?;
    if let Some(r) = role {
        cfg.role = r;
    }
    init_logging(&cfg.log_level);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cfg))
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

async fn run(cfg: config::Config) -> anyhow::Result<()> {
    let aware = Arc::new(sim::SimAware::new(cfg.sim.clone()));
    let availability = aware.availability();
    let platform = Platform {
        discovery: aware,
        ranging: Arc::new(sim::SimRtt::new(cfg.sim.clone())),
        permissions: Arc::new(sim::SimPermissions::new(cfg.sim.permissions_granted)),
        status: Arc::new(console::LogSink),
    };
    let (handle, join) = Orchestrator::spawn(platform, cfg.orchestrator());
    info!(version = VERSION, role = %cfg.role, service = %cfg.service_name, "rtt-linux running");

    if cfg.role == Role::None {
        warn!("no role configured; pass --role publisher|subscriber or set WIFIRTT_ROLE");
    } else {
        handle.start_flow(cfg.role);
    }

    let flapper = (cfg.sim.availability_flap_secs > 0).then(|| {
        tokio::spawn(sim::flap_availability(
            availability,
            Duration::from_secs(cfg.sim.availability_flap_secs),
            handle.clone(),
            cfg.role,
        ))
    });

    shutdown_signal().await?;
    info!("shutting down");
    if let Some(task) = flapper {
        task.abort();
    }
    handle.shutdown();
    join.await?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
