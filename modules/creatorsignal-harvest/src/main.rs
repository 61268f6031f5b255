use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use creatorsignal_common::{Config, HarvestOptions, Sort, TimeWindow};
use creatorsignal_harvest::Harvester;

/// Harvest and rank the most active creators of one community.
#[derive(Parser, Debug)]
#[command(name = "harvest", version)]
struct Cli {
    /// Community name, with or without the `r/` prefix.
    resource: String,

    /// Listing order: hot, new or top.
    #[arg(long, default_value = "hot")]
    sort: Sort,

    /// Time window: hour, day, week, month, year or all.
    #[arg(long, default_value = "week")]
    time_window: TimeWindow,

    /// Maximum creators to return.
    #[arg(long)]
    limit: Option<usize>,

    /// Skip the cache read (the result is still cached).
    #[arg(long)]
    force_refresh: bool,

    /// Attach per-creator profiles.
    #[arg(long)]
    include_profiles: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("creatorsignal=info".parse()?)
                .add_directive("reddit_client=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.log_redacted();

    let harvester = Harvester::from_config(&config)?;

    let mut options = HarvestOptions::default()
        .sort(cli.sort)
        .time_window(cli.time_window)
        .force_refresh(cli.force_refresh)
        .include_profiles(cli.include_profiles);
    if let Some(limit) = cli.limit {
        options = options.limit(limit);
    }

    info!(resource = cli.resource.as_str(), "Harvest starting");
    let response = harvester.harvest_response(&cli.resource, options).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.ok {
        std::process::exit(1);
    }
    Ok(())
}
