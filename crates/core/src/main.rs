use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chargecap_core::config::LimiterCfg;
use chargecap_core::ctl::CtlServer;
use chargecap_core::limiter::Limiter;
use chargecap_core::power::{SysfsChargingSwitch, SysfsPowerRegistry};
use chargecap_core::shutdown::ShutdownGuard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .init();

    // Config file: first CLI arg, else CHARGECAP_CONFIG, else defaults
    // plus environment overrides only.
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CHARGECAP_CONFIG").ok())
        .map(PathBuf::from);
    let cfg = Arc::new(LimiterCfg::load(config_path.as_deref())?);
    tracing::info!(
        battery = %cfg.battery_name,
        usb = %cfg.usb_name,
        lower = cfg.lower_threshold,
        upper = cfg.upper_threshold,
        enabled = cfg.enabled,
        "chargecapd starting"
    );

    let registry = Arc::new(SysfsPowerRegistry::new(&cfg.sysfs_root));
    let switch = Arc::new(SysfsChargingSwitch::new(&cfg.sysfs_root));
    let limiter = Arc::new(Limiter::new(cfg.clone(), registry, switch));

    if cfg.enabled != 0 {
        limiter.set_enabled(cfg.enabled).await;
    }

    let shutdown = ShutdownGuard::new();
    shutdown.spawn_signal_listener();

    let server = CtlServer::bind(&cfg.socket_path)?;
    server.serve(limiter.clone(), shutdown.token()).await;

    // Whatever the loop last did, leave the battery charging on exit.
    limiter.stop().await;
    tracing::info!("chargecapd stopped");
    Ok(())
}
