mod cli;
mod core;
mod execution;
mod runner;

use anyhow::{Context, Result};
use cli::commands::{BuildCommand, ConfigsCommand, PipelineCommand, TypesCommand};
use cli::output::*;
use cli::{Cli, Command};
use crate::core::{ConfigGroup, ConfigGroupSpec, ReleaseContext, TypeRegistry};
use execution::{load_registry, render_pipeline, BuildRequest, ConfigRelease, ContainerBuilder, ReleaseEvent};
use runner::HostRunner;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    TypeRegistry::builtin().context("Built-in container type maps are inconsistent")?;

    let runner = HostRunner::default();

    // Dropping the workflow future on Ctrl-C runs its cleanup
    let outcome = tokio::select! {
        result = run(&cli, &runner) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(result) => result,
        None => {
            warn!("Interrupted");
            eprintln!("\n{} {}", CROSS, style("Interrupted").red());
            std::process::exit(130);
        }
    }
}

async fn run(cli: &Cli, runner: &HostRunner) -> Result<()> {
    match &cli.command {
        Command::Build(cmd) => build_container(cmd, cli, runner).await,
        Command::Pipeline(cmd) => print_pipeline(cmd),
        Command::Configs(cmd) => release_configs(cmd, cli, runner).await,
        Command::Types(cmd) => list_types(cmd),
    }
}

async fn release_context(cli: &Cli, runner: &HostRunner) -> Result<ReleaseContext> {
    match &cli.git_root {
        Some(root) => Ok(ReleaseContext::new(root)),
        None => ReleaseContext::discover(runner)
            .await
            .context("Failed to locate the repository root, pass --git-root"),
    }
}

/// Exit with status 1 on invalid argument combinations
fn validate_or_exit(request: &BuildRequest) {
    if let Err(e) = request.validate() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn build_container(cmd: &BuildCommand, cli: &Cli, runner: &HostRunner) -> Result<()> {
    let request = cmd.to_request();
    validate_or_exit(&request);

    let registry = load_registry(request.map.as_deref(), request.bucket.is_some())
        .context("Failed to load container type maps")?;
    let context = release_context(cli, runner).await?;

    let mode = if request.local { "locally" } else { "with cloud build" };
    println!(
        "{} Building {} {}",
        ROCKET,
        style(&request.type_key).bold(),
        mode
    );

    ContainerBuilder::new(runner, &context)
        .build(&registry, &request)
        .await?;

    println!(
        "{} {} built {}",
        CHECK,
        style(&request.type_key).bold(),
        style("successfully").green()
    );
    Ok(())
}

fn print_pipeline(cmd: &PipelineCommand) -> Result<()> {
    let request = cmd.to_request();
    validate_or_exit(&request);

    let registry = load_registry(request.map.as_deref(), request.bucket.is_some())
        .context("Failed to load container type maps")?;
    let pipeline = render_pipeline(&registry, &request)?;

    match &cmd.output {
        Some(path) => {
            pipeline.write_to(path)?;
            println!("{} Pipeline written to {}", CHECK, style(path.display()).bold());
        }
        None => print!("{}", pipeline.to_yaml().context("Failed to serialize pipeline")?),
    }
    Ok(())
}

async fn release_configs(cmd: &ConfigsCommand, cli: &Cli, runner: &HostRunner) -> Result<()> {
    let context = release_context(cli, runner).await?;

    let specs = match &cmd.groups {
        Some(path) => ConfigGroupSpec::load(path)?,
        None => ConfigGroupSpec::builtin(),
    };
    let groups = ConfigGroup::from_specs(&specs, context.git_root(), &cmd.bazel_version)?;

    let total = groups.iter().map(|g| g.configs.len()).sum();
    let progress = create_progress_bar(total);

    let mut release = ConfigRelease::new(runner, &context, cmd.bazel_version.as_str())
        .with_buildifier(cmd.buildifier.clone())
        .with_manifest(cmd.manifest.clone());

    let bar = progress.clone();
    release.add_event_handler(move |event| {
        bar.println(format_release_event(event));
        if let ReleaseEvent::ConfigsExtracted { config_type, .. } = event {
            bar.set_message(config_type.clone());
            bar.inc(1);
        }
    });

    let result = release.run(&groups).await;
    progress.finish_and_clear();
    result
}

fn list_types(cmd: &TypesCommand) -> Result<()> {
    let registry = load_registry(cmd.map.as_deref(), false).context("Failed to load container type maps")?;
    let entries = registry.entries(registry.maps().tarballs.is_some())?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{} Container types:", INFO);
    for entry in &entries {
        println!("{}", format_type_entry(entry));
    }
    Ok(())
}
