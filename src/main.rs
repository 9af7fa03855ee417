use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use steamgate::{logging, HttpMethod, Interface, RequestParams, Settings, SteamGateway};

/// Call one Steam Web API endpoint through the quota-aware gateway.
#[derive(Debug, Parser)]
#[command(name = "steamgate", version, about)]
struct Cli {
    /// Interface name, e.g. ISteamChartsService
    interface: Interface,

    /// Endpoint name, e.g. GetMostPlayedGames
    endpoint: String,

    /// API version (defaults to the configured one)
    #[arg(long = "api-version")]
    api_version: Option<u32>,

    #[arg(long, default_value = "get")]
    method: HttpMethod,

    /// Extra query parameter, repeatable: --param appid=730
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Settings file (TOML); defaults to ./steamgate.toml when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the quota counters after the call
    #[arg(long)]
    show_quota: bool,

    /// Also write logs to a daily rotated file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.log_dir.as_deref())
        .context("opening log directory")?;

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("loading settings")?;
    tracing::debug!("Loaded settings: {settings:?}");

    let mut params = RequestParams::new().method(cli.method);
    for raw in &cli.params {
        let Some((key, value)) = raw.split_once('=') else {
            bail!("invalid --param {raw:?}: expected KEY=VALUE");
        };
        params = params.param(key.trim(), value.trim());
    }

    let gateway = SteamGateway::new(&settings).context("starting gateway")?;
    let result = match cli.api_version {
        Some(version) => gateway.call_versioned(cli.interface, &cli.endpoint, version, params),
        None => gateway.call(cli.interface, &cli.endpoint, params),
    };
    let payload = result.with_context(|| format!("{} {}", cli.interface, cli.endpoint))?;

    println!("{}", serde_json::to_string_pretty(&payload)?);

    if cli.show_quota {
        let quota = gateway.quota();
        eprintln!(
            "quota: {}/{} today ({}), {}/{} in burst window",
            quota.daily_count,
            quota.daily_limit,
            quota.day,
            quota.burst_in_window,
            quota.burst_limit
        );
    }

    if let Err(e) = gateway.shutdown() {
        tracing::warn!("{e}");
    }
    Ok(())
}
