use anyhow::{bail, Context, Result};
use clap::Parser;

use fwatch::{cli::Cli, EventPipeline, FwatchConfig, NotifySource};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();

    let config_path = cli.get_config_path();
    let mut config = FwatchConfig::load(&config_path).context("Failed to load config")?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);

    if let Err(err) = config.validate() {
        bail!("Invalid config {}: {}", config_path.display(), err);
    }

    if !config.watch_dir.is_dir() {
        bail!("Watch directory does not exist: {}", config.watch_dir.display());
    }

    if config.create_dirs {
        config.ensure_destination_dirs();
    }

    let pipeline = EventPipeline::from_config(&config);
    tracing::info!(
        "fwatch started - watching: {} ({} extensions routed)",
        config.watch_dir.display(),
        pipeline.rules().len()
    );

    let mut source = NotifySource::new();
    pipeline
        .watch(&mut source, &config.watch_dir, |disposition| {
            if let Some(line) = cli.render(disposition) {
                println!("{}", line);
            }
        })
        .await
        .context("Failed to watch directory")?;

    Ok(())
}
