use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use stepline::cli::commands::{RunCommand, RunsCommand, ShowCommand, ValidateCommand};
use stepline::cli::output::*;
use stepline::cli::{Cli, Command};
use stepline::core::{Pipeline, RunStatus, TypeRegistry};
use stepline::execution::{BlueprintCatalog, OperationRegistry, PipelineRunner, RunApi, RunInput, RunnerSettings};
use stepline::notify::{EventSink, CONSOLE_CHANNEL};
use stepline::operations::{register_builtins, BUILTIN_STEPS};
use stepline::storage::FsRunStorage;
use tokio::sync::mpsc;
use tracing::{error, Level};
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

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, cli.verbose).await?,
        Command::Validate(cmd) => validate(cmd)?,
        Command::Runs(cmd) => list_runs(cmd).await?,
        Command::Show(cmd) => show_run(cmd).await?,
    }

    Ok(())
}

fn load_catalog(steps: Option<&str>) -> Result<BlueprintCatalog> {
    let types = TypeRegistry::with_builtins();
    let mut operations = OperationRegistry::new();
    register_builtins(&mut operations);

    let catalog = match steps {
        Some(path) => BlueprintCatalog::from_file(path, &types, &operations)
            .with_context(|| format!("Failed to load step catalog {}", path))?,
        None => BlueprintCatalog::from_yaml(BUILTIN_STEPS, &types, &operations)
            .context("Failed to load built-in steps")?,
    };
    Ok(catalog)
}

fn runs_dir(dir: Option<&PathBuf>) -> PathBuf {
    dir.cloned()
        .unwrap_or_else(|| RunnerSettings::default().runs_dir)
}

async fn run_pipeline(cmd: &RunCommand, verbose: bool) -> Result<()> {
    let catalog = load_catalog(cmd.steps.as_deref())?;
    let pipeline = Pipeline::from_file(&cmd.pipeline).context("Failed to load pipeline")?;
    pipeline.validate()?;

    println!("{} Loaded pipeline: {}", INFO, style(&pipeline.name).bold());

    let problems = catalog.validate(&pipeline);
    if !problems.is_empty() {
        println!("{} Pipeline is not ready to run:", CROSS);
        for problem in &problems {
            println!("  {}", style(problem).red());
        }
        std::process::exit(1);
    }

    let input = match &cmd.input {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read input {}", path))?;
            if cmd.text {
                RunInput::Text(text)
            } else {
                RunInput::Csv(text)
            }
        }
        None => RunInput::None,
    };

    let settings = RunnerSettings {
        min_log_level: cmd.log_level.into(),
        runs_dir: runs_dir(cmd.runs_dir.as_ref()),
        max_runs: cmd.max_runs,
        worker_threads: cmd.threads,
    };
    let runner = PipelineRunner::from_settings(&settings);

    // Step messages are shown through the progress display instead
    if !verbose {
        runner.logs().channels().remove_channel(CONSOLE_CHANNEL);
    }
    let (sender, mut receiver) = mpsc::unbounded_channel();
    runner.add_event_sink(EventSink::Sender(sender));

    let step_names: Vec<String> = catalog
        .resolve(&pipeline)?
        .iter()
        .map(|(blueprint, _)| blueprint.name.clone())
        .collect();
    let pipeline_name = pipeline.name.clone();

    let api = RunApi::new(Arc::new(catalog), Arc::new(runner));
    let handle = api.start_run(pipeline, input)?;
    println!("{} Started run {}", ROCKET, style(handle.run_id()).dim());

    let progress = RunProgress::new(step_names);
    let display = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            progress.handle(&event);
        }
        progress.finish();
    });

    let cancelled = handle.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("{} Cancelling...", WARN);
            cancelled.store(true, Ordering::SeqCst);
        }
    });

    let report = handle.wait().await;
    drop(api);
    let _ = display.await;

    match report.status() {
        RunStatus::Completed => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline_name).bold(),
                style("successfully").green()
            );
            println!(
                "{} Results stored in {}",
                INFO,
                style(settings.runs_dir.join(report.run_id()).display()).dim()
            );
            Ok(())
        }
        status => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&pipeline_name).bold(),
                format_status(status)
            );
            if let Some(step) = report.failed_step {
                error!("Run {} stopped at step {}", report.run_id(), step + 1);
            }
            std::process::exit(1);
        }
    }
}

fn validate(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating steps...", INFO);

    let catalog = match load_catalog(cmd.steps.as_deref()) {
        Ok(catalog) => catalog,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };
    println!("{} {} step(s) loaded", CHECK, style(catalog.len()).cyan());
    for blueprint in catalog.blueprints() {
        println!(
            "  {} ({})",
            style(&blueprint.name).bold(),
            style(&blueprint.step_id).dim()
        );
    }

    if cmd.json {
        let steps: Vec<_> = catalog.blueprints().map(|b| b.to_transfer()).collect();
        println!("\n{}", serde_json::to_string_pretty(&steps)?);
    }

    if let Some(path) = &cmd.pipeline {
        let pipeline = Pipeline::from_file(path).context("Failed to load pipeline")?;
        pipeline.validate()?;
        let problems = catalog.validate(&pipeline);
        if !problems.is_empty() {
            println!("{} Pipeline {} is not ready:", CROSS, style(&pipeline.name).bold());
            for problem in &problems {
                println!("  {}", style(problem).red());
            }
            std::process::exit(1);
        }
        println!(
            "{} Pipeline {} is valid ({} steps)",
            CHECK,
            style(&pipeline.name).bold(),
            style(pipeline.steps.len()).cyan()
        );
    }

    Ok(())
}

async fn list_runs(cmd: &RunsCommand) -> Result<()> {
    let storage = FsRunStorage::new(runs_dir(cmd.runs_dir.as_ref()), usize::MAX);
    let runs = storage.list_runs().await?;

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{} No stored runs in {}", INFO, storage.dir().display());
        return Ok(());
    }

    println!("{} Stored runs (newest first):", INFO);
    for run in &runs {
        println!("  {}", format_run_summary(run));
    }
    Ok(())
}

async fn show_run(cmd: &ShowCommand) -> Result<()> {
    let storage = FsRunStorage::new(runs_dir(cmd.runs_dir.as_ref()), usize::MAX);
    let pipeline = storage.load_pipeline(&cmd.run_id).await?;

    println!("{} Run {}", INFO, style(&cmd.run_id).cyan());
    println!("  Pipeline: {} ({})", style(&pipeline.name).bold(), pipeline.id);
    for (i, step) in pipeline.steps.iter().enumerate() {
        println!("  {}. {} [{}]", i + 1, step.step_id, style(&step.unique_id).dim());
    }

    let visualizations = storage.load_visualizations(&cmd.run_id).await?;
    if !visualizations.is_empty() {
        println!("\n  {}", style("Visualizations:").bold());
        for (index, visualization) in &visualizations {
            println!("  step {}: {}", index + 1, describe_visualization(visualization));
        }
    }

    match storage.result_preview(&cmd.run_id, cmd.rows).await? {
        Some(table) => {
            println!("\n  {} (first {} rows)", style("Result:").bold(), table.len());
            print!("{}", format_table(&table));
        }
        None => println!("\n{} The run stored no result", WARN),
    }
    Ok(())
}
