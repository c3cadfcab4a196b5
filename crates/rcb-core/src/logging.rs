use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for a bot process.
///
/// `RUST_LOG` always wins; otherwise `verbose` switches our crates to `debug`.
pub fn init(service_name: &str, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,rcb={level},rcb_core={level},rcb_telegram={level},rcb_transmission={level},rcb_systemctl={level},rcb_store={level},rcb_http={level},{service}={level}",
            service = service_name.replace('-', "_"),
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::External(format!("failed to install tracing subscriber: {e}")))
}
