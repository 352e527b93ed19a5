//! Tracing setup
//!
//! Logs go to stderr: stdout carries the MCP protocol in stdio mode.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the gateway
///
/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` (default `info`) applies
/// to every target. `LOG_FORMAT=text` switches from the default JSON lines
/// to human-readable output.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)?,
        _ => {
            let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            EnvFilter::try_new(level.to_ascii_lowercase())?
        }
    };

    let registry = tracing_subscriber::registry().with(filter);

    if use_json(std::env::var("LOG_FORMAT").ok().as_deref()) {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }

    Ok(())
}

fn use_json(format: Option<&str>) -> bool {
    !format.is_some_and(|f| f.eq_ignore_ascii_case("text") || f.eq_ignore_ascii_case("pretty"))
}
