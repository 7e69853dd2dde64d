//! Natega-Sweep main entry point
//!
//! This is the command-line interface for the Natega-Sweep result fetcher.

use anyhow::{bail, Context};
use clap::Parser;
use natega_sweep::config::{load_config_with_hash, validate, Config};
use natega_sweep::harvest::default_workers_for_range;
use natega_sweep::output::{print_statistics, StatsSnapshot};
use natega_sweep::state::now_unix_seconds;
use natega_sweep::storage::{CheckpointStore, JsonCheckpointStore};
use natega_sweep::{Dispatcher, ExtractedRecord, FieldName, Outcome, RangeRequest, RunOutcome, SystemMode};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Natega-Sweep: a resumable bulk fetcher for exam result pages
///
/// Natega-Sweep posts seating numbers to a rotating set of mirror hosts,
/// extracts each student's result and appends it to a CSV file, keeping a
/// checkpoint so an interrupted sweep picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "natega-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A resumable bulk fetcher for exam result pages", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Look up a single seating number
    #[arg(short, long, value_name = "ID", conflicts_with_all = ["range", "resume"])]
    number: Option<u64>,

    /// Sweep an inclusive range of seating numbers
    #[arg(long, num_args = 2, value_names = ["START", "END"], conflicts_with = "resume")]
    range: Option<Vec<u64>>,

    /// Resume the sweep recorded in the checkpoint
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// End of the resumed range (default: resume point + 100)
    #[arg(long, value_name = "END", requires = "resume")]
    end: Option<u64>,

    /// Result system to query: 0 = both, 1 = modern, 2 = legacy
    #[arg(short, long, value_name = "MODE", value_parser = parse_mode)]
    system: Option<SystemMode>,

    /// Number of workers (clamped to 10..=30)
    #[arg(short, long, value_name = "N")]
    threads: Option<usize>,

    /// Ignore and clear a previous checkpoint
    #[arg(long)]
    fresh: bool,

    /// Start the interactive menu (default when no operation is given)
    #[arg(short, long)]
    interactive: bool,

    /// Print the checkpoint's statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "number", "range", "resume"])]
    stats: bool,

    /// Print the effective configuration and exit
    #[arg(long, conflicts_with_all = ["stats", "number", "range", "resume"])]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn parse_mode(value: &str) -> Result<SystemMode, String> {
    let code: u8 = value
        .parse()
        .map_err(|_| format!("expected 0, 1 or 2, got {:?}", value))?;
    SystemMode::try_from(code)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }
    if cli.stats {
        handle_stats(&config);
        return Ok(());
    }

    let dispatcher = Dispatcher::from_config(&config).context("failed to start dispatcher")?;
    install_interrupt_handler(dispatcher.cancellation_token());

    if cli.fresh {
        tracing::info!("Starting fresh (ignoring previous checkpoint)");
    }

    if let Some(id) = cli.number {
        handle_single(&dispatcher, id).await?;
    } else if let Some(bounds) = &cli.range {
        let (start, end) = (bounds[0], bounds[1]);
        let threads = cli
            .threads
            .unwrap_or_else(|| default_workers_for_range(start, end));
        let mut request = RangeRequest::new(start, end)
            .threads(threads)
            .resume(!cli.fresh);
        if let Some(mode) = cli.system {
            request = request.mode(mode);
        }
        handle_range(&dispatcher, request).await?;
    } else if cli.resume {
        let Some(checkpoint) = dispatcher.checkpoint() else {
            bail!("no checkpoint to resume from");
        };
        let start = checkpoint.last_processed_id + 1;
        let end = cli.end.unwrap_or(checkpoint.last_processed_id + 100);
        let mut request = RangeRequest::new(start, end).resume(true);
        if let Some(threads) = cli.threads {
            request = request.threads(threads);
        }
        if let Some(mode) = cli.system {
            request = request.mode(mode);
        }
        handle_range(&dispatcher, request).await?;
    } else {
        if !cli.interactive {
            tracing::debug!("No operation given, starting interactive menu");
        }
        if let Some(mode) = cli.system {
            dispatcher.set_mode(mode)?;
        }
        run_menu(&dispatcher, cli.threads, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("natega_sweep=info,warn"),
            1 => EnvFilter::new("natega_sweep=debug,info"),
            2 => EnvFilter::new("natega_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file, or validated built-in defaults
fn load(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        None => {
            let config = Config::default();
            validate(&config)?;
            Ok(config)
        }
    }
}

/// First Ctrl+C pauses gracefully, a second one exits at once
fn install_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupted, finishing in-flight requests (Ctrl+C again to quit now)");
        token.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Forced exit");
            std::process::exit(130);
        }
    });
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Natega-Sweep Dry Run ===\n");

    println!("Sweep Configuration:");
    println!("  Threads: {}", config.sweep.threads);
    println!("  System: {}", config.sweep.mode);
    println!("  Request timeout: {}ms", config.sweep.request_timeout_ms);
    println!("  Dequeue timeout: {}ms", config.sweep.dequeue_timeout_ms);
    println!(
        "  Delay between requests: {}-{}ms",
        config.sweep.min_delay_ms, config.sweep.max_delay_ms
    );
    println!(
        "  Accept invalid certificates: {}",
        config.sweep.accept_invalid_certs
    );

    println!("\nOutput:");
    println!("  Results: {}", config.output.results_path);
    println!("  Checkpoint: {}", config.output.checkpoint_path);

    println!("\nEndpoints ({}):", config.endpoints.len());
    for entry in &config.endpoints {
        println!(
            "  - {}://{}{}{}",
            entry.scheme, entry.host, config.sweep.endpoint_path, entry.referer_query
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the checkpoint
fn handle_stats(config: &Config) {
    println!("Checkpoint: {}\n", config.output.checkpoint_path);

    let store = JsonCheckpointStore::new(&config.output.checkpoint_path);
    match store.load() {
        Some(state) => print_statistics(&StatsSnapshot::from_state(&state, now_unix_seconds())),
        None => println!("No checkpoint found"),
    }
}

async fn handle_single(dispatcher: &Dispatcher, id: u64) -> anyhow::Result<()> {
    match dispatcher.run_single(id).await? {
        Outcome::Success(record) => print_record(&record),
        Outcome::Challenge => println!("CAPTCHA returned for {}", id),
        Outcome::HardFailure(e) => println!("No result for {}: {}", id, e),
    }
    Ok(())
}

async fn handle_range(dispatcher: &Dispatcher, request: RangeRequest) -> anyhow::Result<()> {
    let outcome = dispatcher.run_range(request).await?;
    print_statistics(outcome.stats());

    match outcome {
        RunOutcome::Completed(_) => println!("✓ Range complete"),
        RunOutcome::Paused(stats) => println!(
            "Paused at {}. Use --resume to continue.",
            stats.last_processed_id
        ),
    }
    Ok(())
}

fn print_record(record: &ExtractedRecord) {
    for field in FieldName::ALL {
        if let Some(value) = record.get(field) {
            println!("  {}: {}", field, value);
        }
    }
}

type Input = Lines<BufReader<Stdin>>;

/// Prints a prompt and waits for one line, or `None` on EOF or interrupt
async fn prompt(input: &mut Input, token: &CancellationToken, message: &str) -> Option<String> {
    print!("{}", message);
    let _ = std::io::stdout().flush();

    tokio::select! {
        _ = token.cancelled() => None,
        line = input.next_line() => line.ok().flatten().map(|l| l.trim().to_string()),
    }
}

async fn prompt_number(input: &mut Input, token: &CancellationToken, message: &str) -> Option<u64> {
    let line = prompt(input, token, message).await?;
    match line.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            println!("Not a number: {:?}", line);
            None
        }
    }
}

/// Interactive menu loop
async fn run_menu(
    dispatcher: &Dispatcher,
    threads: Option<usize>,
    fresh: bool,
) -> anyhow::Result<()> {
    let token = dispatcher.cancellation_token();
    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();

    dispatcher.prepare()?;

    while !token.is_cancelled() {
        println!("\n=== Natega-Sweep ({}) ===", dispatcher.mode());
        println!("1. Look up a seating number");
        println!("2. Sweep a range");
        println!("3. Resume last sweep");
        println!("4. Toggle system");
        println!("5. Show statistics");
        println!("6. Exit");

        let Some(choice) = prompt(&mut input, &token, "> ").await else {
            break;
        };

        match choice.as_str() {
            "1" => {
                if let Some(id) = prompt_number(&mut input, &token, "Seating number: ").await {
                    handle_single(dispatcher, id).await?;
                }
            }
            "2" => {
                let Some(start) = prompt_number(&mut input, &token, "Start: ").await else {
                    continue;
                };
                let Some(end) = prompt_number(&mut input, &token, "End: ").await else {
                    continue;
                };
                let request = RangeRequest::new(start, end)
                    .threads(threads.unwrap_or_else(|| default_workers_for_range(start, end)))
                    .resume(!fresh);
                if let Err(e) = handle_range(dispatcher, request).await {
                    println!("{:#}", e);
                }
            }
            "3" => {
                let Some(checkpoint) = dispatcher.checkpoint() else {
                    println!("No checkpoint to resume from");
                    continue;
                };
                let default_end = checkpoint.last_processed_id + 100;
                let message = format!("End [{}]: ", default_end);
                let Some(line) = prompt(&mut input, &token, &message).await else {
                    continue;
                };
                let end = if line.is_empty() {
                    default_end
                } else {
                    match line.parse() {
                        Ok(end) => end,
                        Err(_) => {
                            println!("Not a number: {:?}", line);
                            continue;
                        }
                    }
                };
                let mut request = RangeRequest::new(checkpoint.last_processed_id + 1, end);
                if let Some(threads) = threads {
                    request = request.threads(threads);
                }
                if let Err(e) = handle_range(dispatcher, request).await {
                    println!("{:#}", e);
                }
            }
            "4" => {
                let mode = dispatcher.toggle_mode()?;
                println!("Now querying {}", mode);
            }
            "5" => print_statistics(&dispatcher.stats().snapshot()),
            "6" | "q" | "exit" => break,
            other => println!("Unknown option {:?}", other),
        }
    }

    Ok(())
}
