mod cli;
mod controller;
mod input;
mod paths;
mod run;
mod settings;

use anyhow::{anyhow, Context, Result};
use cli::{Command, ConfigAction};
use describe::DescribeOutcome;
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let paths = AppPaths::discover(cli.run.config.as_deref())?;
    tracing::debug!(
        config_dir = %paths.config_dir().display(),
        config_file = %paths.config_file().display(),
        "resolved colorshift paths"
    );

    match cli.command {
        Some(Command::Config(config_cmd)) => {
            handle_config_command(&paths, &cli.run, config_cmd.action)
        }
        Some(Command::Describe(args)) => {
            let config = settings::resolve(&paths, &cli.run)?;
            let outcome = run::describe_image(&args.image, &config, cli.run.mute)?;
            report_outcome(&outcome)
        }
        None => {
            let config = settings::resolve(&paths, &cli.run)?;
            run::run(&cli.run, &config)
        }
    }
}

fn handle_config_command(
    paths: &AppPaths,
    args: &cli::RunArgs,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Where => {
            let exists = paths.config_file().exists();
            println!("Configuration file:");
            println!("  path:   {}", paths.config_file().display());
            let status = if exists {
                "present"
            } else {
                "missing (defaults in use)"
            };
            println!("  status: {status}");
        }
        ConfigAction::Print => {
            let config = settings::resolve(paths, args)?;
            let rendered = config
                .to_toml_string()
                .context("failed to render configuration")?;
            print!("{rendered}");
        }
    }
    Ok(())
}

fn report_outcome(outcome: &DescribeOutcome) -> Result<()> {
    match outcome {
        DescribeOutcome::Spoken { attempts } => {
            println!("Description played after {attempts} attempt(s).");
            Ok(())
        }
        DescribeOutcome::Fallback { cause } => {
            println!("Description unavailable; fallback tone played.");
            Err(anyhow!("description failed: {cause}"))
        }
        DescribeOutcome::Cancelled { attempts } => {
            Err(anyhow!("description cancelled after {attempts} attempt(s)"))
        }
    }
}
