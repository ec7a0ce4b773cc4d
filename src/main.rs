//! Allocation file tool: validate an allocation file, print the resolved
//! configuration, and optionally keep watching it for changes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fairshare_alloc::reload::AllocationFileLoader;
use fairshare_alloc::settings::{
    LoaderSettings, DEFAULT_POLL_INTERVAL, DEFAULT_RELOAD_DEBOUNCE,
};

#[derive(Debug, Parser)]
#[command(name = "fairshare-alloc", about = "Load and watch a fair-share allocation file")]
struct Args {
    /// Allocation file to load. Without it, the bundled empty document is
    /// used.
    file: Option<PathBuf>,

    /// Keep running and reload the file when it changes.
    #[arg(long)]
    watch: bool,

    /// Poll period in seconds while watching.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    poll_secs: u64,

    /// Quiet period a modification must sit before it is read, in seconds.
    #[arg(long, default_value_t = DEFAULT_RELOAD_DEBOUNCE.as_secs())]
    debounce_secs: u64,

    /// Forbid placement rules from creating queues the file never declared.
    #[arg(long)]
    no_undeclared_pools: bool,

    /// Disable the per-user queue step of the implicit placement chain.
    #[arg(long)]
    no_user_as_default_queue: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fairshare_alloc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let settings = LoaderSettings {
        allocation_file: args.file,
        poll_interval: Duration::from_secs(args.poll_secs),
        reload_debounce: Duration::from_secs(args.debounce_secs),
        allow_undeclared_pools: !args.no_undeclared_pools,
        user_as_default_queue: !args.no_user_as_default_queue,
    };

    let loader = Arc::new(AllocationFileLoader::new(settings));
    let snapshot = loader.reload_allocations()?;
    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);

    if args.watch {
        loader.set_reload_listener(|snapshot| match serde_json::to_string_pretty(snapshot.as_ref())
        {
            Ok(rendered) => println!("{rendered}"),
            Err(error) => tracing::error!(%error, "Failed to render snapshot"),
        });
        let handle = loader.spawn();
        tracing::info!("Watching for changes; Ctrl-C to exit");

        tokio::signal::ctrl_c().await?;
        loader.stop();
        handle.await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
