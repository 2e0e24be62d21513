use anyhow::{anyhow, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "info";
/// Per-pass refine events are only useful when asked for explicitly.
pub const DEFAULT_NOISE_FILTER: &str = "nlmsr_core::nlm=info,nlmsr_core::ring_buffer=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingInitOptions {
    pub verbose: u8,
    pub cli_log_filter: Option<String>,
    pub rust_log_env: Option<String>,
    pub default_log_filter: String,
    pub noise_filter: String,
    pub include_noise_filter_when_implicit: bool,
    pub ansi: bool,
}

impl Default for LoggingInitOptions {
    fn default() -> Self {
        Self {
            verbose: 0,
            cli_log_filter: None,
            rust_log_env: None,
            default_log_filter: DEFAULT_LOG_FILTER.to_string(),
            noise_filter: DEFAULT_NOISE_FILTER.to_string(),
            include_noise_filter_when_implicit: true,
            ansi: true,
        }
    }
}

impl LoggingInitOptions {
    /// Options seeded from the `RUST_LOG` environment variable.
    pub fn from_env() -> Self {
        Self {
            rust_log_env: std::env::var("RUST_LOG").ok(),
            ..Default::default()
        }
    }
}

/// Filter directive string for the console layer.
///
/// Priority: explicit filter, then verbosity (`1` debug, `2+` trace), then
/// `RUST_LOG`, then the default. The noise filter is prepended only when the
/// user did not pick a filter explicitly.
pub fn select_log_filter(options: &LoggingInitOptions) -> String {
    let user_filter = select_user_filter(options);
    let should_include_noise = options.include_noise_filter_when_implicit
        && options.cli_log_filter.is_none()
        && options.verbose == 0;

    merge_noise_filter(
        options.noise_filter.as_str(),
        user_filter.as_str(),
        should_include_noise,
    )
}

fn select_user_filter(options: &LoggingInitOptions) -> String {
    if let Some(filter) = options.cli_log_filter.as_deref() {
        filter.to_string()
    } else if options.verbose >= 2 {
        "trace".to_string()
    } else if options.verbose == 1 {
        "debug".to_string()
    } else if let Some(filter) = options.rust_log_env.as_deref() {
        filter.to_string()
    } else {
        options.default_log_filter.clone()
    }
}

fn merge_noise_filter(noise_filter: &str, user_filter: &str, include_noise_filter: bool) -> String {
    if include_noise_filter && !noise_filter.trim().is_empty() {
        format!("{noise_filter},{user_filter}")
    } else {
        user_filter.to_string()
    }
}

/// Parses `filter`, falling back to [`DEFAULT_LOG_FILTER`] when it is invalid.
pub fn parse_env_filter_with_fallback(filter: &str) -> EnvFilter {
    EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!("Invalid log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'.");
        EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

/// Installs a stderr `fmt` subscriber as the global default.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(options: &LoggingInitOptions) -> Result<()> {
    let filter = select_log_filter(options);
    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(options.ansi)
            .with_filter(parse_env_filter_with_fallback(&filter)),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|error| anyhow!("failed to initialize tracing subscriber: {error}"))
}
