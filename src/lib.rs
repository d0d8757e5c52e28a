//! Weatherdesk library
//!
//! Fetches weather forecasts from the Visual Crossing timeline API through a
//! request throttle and a Redis or local-file response cache. The binary in
//! `main.rs` is a thin front end over [`worker::FetchHandle`].

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod gateway;
pub mod settings;
pub mod throttle;
pub mod worker;

pub use cache::{open_cache, CacheStatus, CacheStore};
pub use config::Config;
pub use data::{DateRange, ResponseRecord, ResponseStatus, UnitGroup};
pub use gateway::WeatherGateway;
pub use settings::Settings;
pub use worker::{FetchHandle, FetchResult};

/// Initializes logging to stderr
///
/// `RUST_LOG` wins when set; otherwise logs at `info`, or `debug` when
/// `verbose` is true.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
