//! Command-line interface parsing for weatherdesk
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! a [`FetchRequest`] for the worker.

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

use crate::data::{DateRange, UnitGroup};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified unit system is not recognized
    #[error("Invalid units: '{0}'. Valid units: us, uk, metric, base")]
    InvalidUnits(String),

    /// The date range is empty or has empty segments
    #[error("Invalid date range: '{0}'. Use e.g. next3days, 2024-01-01 or 2024-01-01/2024-01-07")]
    InvalidRange(String),
}

/// weatherdesk - Weather forecasts with request throttling and caching
#[derive(Parser, Debug)]
#[command(name = "weatherdesk")]
#[command(about = "Weather forecasts with request throttling and response caching")]
#[command(version)]
pub struct Cli {
    /// Place to get the forecast for
    ///
    /// Examples:
    ///   weatherdesk Paris
    ///   weatherdesk New York --range next3days
    ///   weatherdesk London --units uk --lang fr
    #[arg(required = true, num_args = 1.., value_name = "LOCATION")]
    pub location: Vec<String>,

    /// Date range: "next<N>days", a date, or "<start>/<end>"
    #[arg(long, short, default_value = "next1days", value_name = "RANGE")]
    pub range: String,

    /// Unit system, remembered for later runs
    ///
    /// Valid units: us, uk, metric, base
    #[arg(long, short, value_name = "UNITS")]
    pub units: Option<String>,

    /// Response language tag, remembered for later runs
    #[arg(long, short, value_name = "LANG")]
    pub lang: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short)]
    pub verbose: bool,
}

/// A validated forecast request built from CLI arguments
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Location words joined with single spaces
    pub location: String,
    pub range: DateRange,
    /// Unit system to switch to before fetching
    pub units: Option<UnitGroup>,
    /// Language to switch to before fetching
    pub lang: Option<String>,
}

/// Parses a unit system argument
pub fn parse_units_arg(s: &str) -> Result<UnitGroup, CliError> {
    s.parse()
        .map_err(|_| CliError::InvalidUnits(s.to_string()))
}

/// Parses a date range argument
pub fn parse_range_arg(s: &str) -> Result<DateRange, CliError> {
    let range = DateRange::from(s);
    if range.as_str().split('/').any(|segment| segment.trim().is_empty()) {
        return Err(CliError::InvalidRange(s.to_string()));
    }
    Ok(range)
}

impl FetchRequest {
    /// Creates a FetchRequest from parsed CLI arguments
    ///
    /// Fails on unknown units or a malformed range.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let units = cli.units.as_deref().map(parse_units_arg).transpose()?;
        let lang = cli
            .lang
            .as_deref()
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .map(str::to_string);

        Ok(FetchRequest {
            location: cli.location.join(" "),
            range: parse_range_arg(&cli.range)?,
            units,
            lang,
        })
    }
}
