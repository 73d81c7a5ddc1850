//! Tracing setup: no tokio-console, no extra per-crate directives beyond
//! what this crate and its direct RPC/HTTP dependencies emit.

use tracing::metadata::LevelFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

const RUST_LOG_ENV: &str = "RUST_LOG";

/// Initializes the global tracing subscriber. `json` switches the formatter
/// between human-readable ansi output and newline-delimited JSON.
pub fn init_tracing(level: LevelFilter, json: bool) -> anyhow::Result<()> {
    let mut filter = EnvFilter::new("")
        .add_directive(Directive::from(level))
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if let Some(env) = std::env::var_os(RUST_LOG_ENV).and_then(|s| s.into_string().ok()) {
        for directive in env.split(',') {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("ignoring invalid log directive `{directive}`: {e}"),
            }
        }
    }

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_ansi(true)
            .init();
    }

    Ok(())
}
