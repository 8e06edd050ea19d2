// SPDX-License-Identifier: GPL-3.0-only
use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with configuration
///
/// `RUST_LOG` wins over the configured level; `verbose` raises the configured
/// level to debug (1) or trace (2+).
pub fn setup_logging(log_level: &str, verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => log_level,
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_ansi(true)
                .with_target(false)
        )
        .try_init()?;

    Ok(())
}
