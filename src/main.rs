//! weatherdesk - Print weather forecasts from the command line
//!
//! Fetches a forecast through the throttled, cached gateway and prints one
//! line per day.

use std::process::ExitCode;

use clap::Parser;

use weatherdesk::cli::{Cli, FetchRequest};
use weatherdesk::data::WeatherClient;
use weatherdesk::{init_tracing, open_cache, Config, FetchHandle, FetchResult, WeatherGateway};

/// Fields printed for every forecast day
const DAY_FIELDS: [&str; 3] = ["temp", "tempmin", "tempmax"];

/// Renders a fetch result as printable lines
fn render_forecast(result: &FetchResult) -> Vec<String> {
    let record = &result.record;
    let unit = result.settings.degree_unit();
    let mut lines = Vec::new();

    lines.push(record.address().unwrap_or("Unknown location").to_string());
    if let Some(last_update) = record.last_update() {
        lines.push(format!("Last update: {}", last_update));
    }

    for day in 0..record.day_count() {
        let temps = DAY_FIELDS
            .iter()
            .map(|field| record.day_value(day, field).unwrap_or_else(|| "-".to_string()))
            .collect::<Vec<_>>()
            .join("/");
        lines.push(format!(
            "{}  {}°{}  {}",
            record.day_value(day, "datetime").unwrap_or_default(),
            temps,
            unit,
            record.day_value(day, "conditions").unwrap_or_default()
        ));
    }

    lines
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let request = match FetchRequest::from_cli(&cli) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    let cache = open_cache(config.cache.redis_url.as_deref(), &config.cache_file());
    let gateway = WeatherGateway::new(
        WeatherClient::new()?,
        config.request_config(),
        config.settings(),
    )
    .with_cache(cache);

    let handle = FetchHandle::spawn(gateway);
    if let Some(units) = request.units {
        handle.set_units(units).await;
    }
    if let Some(lang) = request.lang {
        handle.set_lang(lang).await;
    }

    let result = handle.fetch(request.location, request.range).await;
    handle.shutdown().await;

    let Some(result) = result else {
        return Err("fetch worker stopped before replying".into());
    };

    if !result.record.is_ok() || result.record.is_empty() {
        match result.status_code {
            Some(code) => eprintln!("error: no forecast available (HTTP {})", code),
            None => eprintln!("error: no forecast available"),
        }
        return Ok(ExitCode::FAILURE);
    }

    for line in render_forecast(&result) {
        println!("{}", line);
    }
    Ok(ExitCode::SUCCESS)
}
