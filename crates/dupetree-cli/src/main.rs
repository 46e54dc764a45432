use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;

fn main() -> Result<()> {
    let cli = args::Cli::parse();
    init_tracing(cli.verbose);

    if cli.hash_worker {
        dupetree_core::worker::serve(std::io::stdin().lock(), std::io::stdout().lock())?;
        return Ok(());
    }

    let cfg = cli.to_config()?;
    let result = dupetree_core::run::scan(&cli.paths, &cfg)?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

/// Debug traces go to stderr; stdout carries only the JSON result.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
