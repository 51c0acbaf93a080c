use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use dated_fetch::app::{BatchFetcher, RunOptions, plan};
use dated_fetch::config::{Config, ConfigLoader};
use dated_fetch::domain::{BatchResult, FetchStatus, parse_date};
use dated_fetch::error::BatchError;
use dated_fetch::http::HttpFetcher;
use dated_fetch::output::{ConsoleProgress, JsonOutput, OutputMode};
use dated_fetch::store::{DirectorySink, StorageSink};

#[derive(Parser)]
#[command(name = "dated-fetch")]
#[command(about = "Download a dated series of remote files into a local directory")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch every missing file in the series")]
    Fetch(FetchArgs),
    #[command(about = "Print the dates, URLs and storage keys without fetching")]
    Plan(SeriesArgs),
}

#[derive(Args, Clone, Default)]
struct SeriesArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long, value_parser = parse_date)]
    start_date: Option<NaiveDate>,

    #[arg(long)]
    step_days: Option<u32>,

    #[arg(long)]
    count: Option<usize>,

    #[arg(long)]
    url_template: Option<String>,

    #[arg(long)]
    key_template: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long)]
    max_parallel: Option<usize>,
}

impl SeriesArgs {
    fn overrides(&self) -> Config {
        Config {
            start_date: self.start_date,
            step_days: self.step_days,
            count: self.count,
            remote_url_template: self.url_template.clone(),
            storage_key_template: self.key_template.clone(),
            output_dir: self.output_dir.as_deref().map(Utf8PathBuf::from),
            fetch_timeout_secs: self.timeout_secs,
            max_parallel: self.max_parallel,
        }
    }
}

#[derive(Args, Clone, Default)]
struct FetchArgs {
    #[command(flatten)]
    series: SeriesArgs,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<BatchError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &BatchError) -> u8 {
    match error {
        BatchError::Template { .. }
        | BatchError::InvalidDateSpec(_)
        | BatchError::InvalidDate(_)
        | BatchError::ConfigRead(_)
        | BatchError::ConfigParse(_)
        | BatchError::InvalidConfig(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command.unwrap_or(Commands::Fetch(FetchArgs::default())) {
        Commands::Fetch(args) => run_fetch(args, output_mode),
        Commands::Plan(args) => run_plan(args, output_mode),
    }
}

fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let resolved = ConfigLoader::resolve(args.series.config.as_deref(), args.series.overrides())?;

    let sink = DirectorySink::new(resolved.output_dir.clone());
    if !args.dry_run {
        sink.ensure()?;
    }
    let fetcher = HttpFetcher::new(resolved.fetch_timeout)?;
    let batch = BatchFetcher::new(fetcher, sink);
    let options = RunOptions {
        max_parallel: resolved.max_parallel,
        fetch_timeout: resolved.fetch_timeout,
        force: args.force,
        dry_run: args.dry_run,
    };

    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = batch.run(
                &resolved.date_spec,
                &resolved.templates,
                &options,
                &JsonOutput,
            )?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let result = batch.run(
                &resolved.date_spec,
                &resolved.templates,
                &options,
                &ConsoleProgress,
            )?;
            print_fetch_summary(&result, &resolved.output_dir);
            result
        }
    };

    if result.has_failures() {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_plan(args: SeriesArgs, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let resolved = ConfigLoader::resolve(args.config.as_deref(), args.overrides())?;
    let tasks = plan(&resolved.date_spec, &resolved.templates);

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_plan(&tasks).into_diagnostic()?,
        OutputMode::Interactive => {
            for task in &tasks {
                println!(
                    "{}  {}  ->  {}/{}",
                    task.date, task.remote_locator, resolved.output_dir, task.storage_key
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_fetch_summary(result: &BatchResult, output_dir: &Utf8Path) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}dated-fetch summary ({output_dir}){reset}");
    println!(
        "{green}fetched: {}{reset}",
        result.count(FetchStatus::Fetched)
    );
    println!(
        "{yellow}skipped: {}{reset}",
        result.count(FetchStatus::Skipped)
    );
    let pending = result.count(FetchStatus::Pending);
    if pending > 0 {
        println!("{cyan}would fetch: {pending}{reset}");
    }
    println!("{red}failed: {}{reset}", result.count(FetchStatus::Failed));

    for outcome in result.failures() {
        println!(
            "{red}  {} {}: {}{reset}",
            outcome.task.date,
            outcome.task.remote_locator,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    if result.cancelled {
        println!("{yellow}batch cancelled before all tasks ran{reset}");
    }
}
