use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use dog_cli::cli::Cli;
use dog_cli::config::ParamsFile;
use dog_cli::config::Settings;
use dog_cli::engine::NativeLauncher;
use dog_cli::logging;
use dog_cli::resolve::resolve;
use log::error;
use log::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    logging::init(&settings).context("failed to install logger")?;

    let result = execute(&cli, &settings);
    if let Err(e) = &result {
        error!("{e:#}");
    }
    result
}

fn execute(cli: &Cli, settings: &Settings) -> Result<()> {
    info!("Parsing arguments...");
    cli.log_arguments();

    let mut raw = cli.raw_args();
    if let Some(path) = cli.params() {
        raw = ParamsFile::load(path)?.apply_to(raw);
    }

    let invocation = resolve(raw)?;
    info!(
        "{} over {} files from {}",
        invocation.operation.name(),
        invocation.work_list.len(),
        invocation.input_dir.display()
    );

    let outputs = dog_cli::run(&invocation, settings, &NativeLauncher)
        .with_context(|| format!("{} failed", invocation.operation.name()))?;

    info!("Complete! {} images written to {}", outputs.len(), invocation.out_dir.display());
    Ok(())
}
