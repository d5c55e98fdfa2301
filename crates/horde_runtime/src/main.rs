//! Horde Runtime
//!
//! Headless crowd demo: boots the neighbor grid from a JSON settings file
//! (or defaults) and runs a fixed number of frames.
//!
//! Usage: `horde [settings.json]`. Log level comes from `RUST_LOG`.

mod demo;
mod settings;

use anyhow::Result;
use settings::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Horde v{}", horde_core::VERSION);

    let settings = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading settings");
            Settings::load(&path)?
        }
        None => Settings::default(),
    };

    let mut demo = demo::Demo::new(settings)?;
    let report = demo.run()?;
    tracing::info!(?report, "run finished");
    Ok(())
}
