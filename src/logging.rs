use std::env;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` selects levels (default
/// `info`), `LOG_JSON=true` switches to one JSON object per line.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,reqwest=info,alloy_transport_http=info"));
    let json = env::var("LOG_JSON")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::registry().with(filter);
    if json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stdout).with_target(false))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stdout).with_target(false))
            .init();
    }
}
