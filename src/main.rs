// SPDX-License-Identifier: GPL-3.0-only
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use gem_mirror::logging::setup_logging;
use gem_mirror::{BatchReport, Config, HttpTransport, Mirror, MirrorConfig, Progress, ProgressFn, RunOptions};

#[derive(Parser)]
#[command(name = "gem-mirror", version, about = "Mirror a RubyGems repository")]
struct Cli {
    /// Config file (defaults to $GEM_MIRROR_CONFIG, then gem-mirror.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch gems, gemspecs and base files
    Fetch {
        /// Do not re-fetch gemspecs that already exist
        #[arg(long)]
        skip_existing: bool,
    },
    /// Fetch and prune gems only
    FetchGems,
    /// Fetch gemspecs for every local gem
    FetchSpecs {
        /// Do not re-fetch gemspecs that already exist
        #[arg(long)]
        skip_existing: bool,
    },
    /// Fetch the fixed index files only
    FetchBaseFiles,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(Some(path.as_path()), |key| std::env::var(key).ok())?,
        None => Config::load()?,
    };
    setup_logging(&config.log_level, cli.verbose)?;
    config.validate()?;

    info!("Starting gem-mirror v{}", env!("CARGO_PKG_VERSION"));

    for mirror_config in &config.mirrors {
        sync_one(mirror_config, &cli.command).await?;
    }

    info!("All mirrors processed");
    Ok(())
}

async fn sync_one(config: &MirrorConfig, command: &Command) -> anyhow::Result<()> {
    info!(source = %config.source, destination = %config.destination.display(), "Mirroring");

    let transport = Arc::new(HttpTransport::new(config.timeout(), config.retries)?);
    let mut mirror = Mirror::new(config.clone(), transport);
    let on_progress = log_progress();

    match command {
        Command::Fetch { skip_existing } => {
            let mut options = RunOptions::from_config(config);
            options.skip_existing_specs |= *skip_existing;
            let summary = mirror.run(options, on_progress).await?;
            info!(
                total_gems = summary.catalog_size,
                to_fetch = summary.to_fetch,
                to_delete = summary.to_delete,
                "Summary"
            );
            report("gems fetched", &summary.fetched);
            report("gems deleted", &summary.deleted);
            if let Some(specs) = &summary.specs {
                report("gemspecs", specs);
            }
            if let Some(base_files) = &summary.base_files {
                report("base files", base_files);
            }
        }
        Command::FetchGems => {
            let summary = mirror.run(RunOptions::gems_only(), on_progress).await?;
            info!(total_gems = summary.catalog_size, "Summary");
            report("gems fetched", &summary.fetched);
            report("gems deleted", &summary.deleted);
        }
        Command::FetchSpecs { skip_existing } => {
            let local = mirror.local_artifacts().await?;
            let specs = mirror
                .fetch_specs(
                    &local,
                    config.parallelism(),
                    *skip_existing || config.skip_existing_specs,
                    on_progress,
                )
                .await;
            report("gemspecs", &specs);
        }
        Command::FetchBaseFiles => {
            let base_files = mirror.fetch_base_files(on_progress).await;
            report("base files", &base_files);
        }
    }
    Ok(())
}

/// Log every item at debug and a heartbeat every 500 items
fn log_progress() -> ProgressFn {
    Arc::new(|progress: Progress<'_>| {
        debug!(
            phase = ?progress.phase,
            item = %progress.item,
            ok = progress.ok,
            "{}/{}",
            progress.completed,
            progress.total
        );
        if progress.completed % 500 == 0 || progress.completed == progress.total {
            info!(phase = ?progress.phase, "Done: {}/{}", progress.completed, progress.total);
        }
    })
}

fn report(what: &str, batch: &BatchReport) {
    info!(succeeded = batch.succeeded, failed = batch.failed, "{}", what);
    for item in &batch.failures {
        warn!(item = %item.label, error = %item.error, "Failed");
    }
}
